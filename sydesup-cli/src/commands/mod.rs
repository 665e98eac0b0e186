//! CLI command implementations.

pub mod create;
pub mod unpack;

pub use create::CreateArgs;
pub use unpack::UnpackArgs;

/// Print warnings collected by the library.
pub fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
}

//! CLI command implementations.

pub mod add;
pub mod delete;
pub mod inspect;
pub mod list;
pub mod sync;

/// Result type shared by the commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

//! Subcommand implementations.

pub mod derive;
pub mod salt;
pub mod sign;
pub mod verify;

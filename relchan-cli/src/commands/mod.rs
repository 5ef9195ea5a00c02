//! Subcommand implementations

pub mod chat;
pub mod encode;
pub mod scan;
pub mod soak;
pub mod verify;

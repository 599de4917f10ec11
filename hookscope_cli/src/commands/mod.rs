//! CLI command handlers

pub mod claim;
pub mod register;
pub mod server;
pub mod session;
pub mod watch;

//! Core traits for the provisioning system
//!
//! This module defines the abstract interfaces to the outside world.
//!
//! - [`DnsLookup`]: Query TXT and A records
//! - [`CommandExecutor`]: Run external programs with a timeout and cancellation

pub mod command;
pub mod dns_lookup;

pub use command::{CommandExecutor, CommandOutput, CommandSpec};
pub use dns_lookup::DnsLookup;

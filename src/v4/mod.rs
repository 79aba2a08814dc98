//! DHCPv4 protocol implementation
//!
//! This module contains the DHCPv4-specific implementation including:
//! - Message encoding and decoding
//! - The option code table
//! - Client message construction

pub mod message;
pub mod options;

#[cfg(test)]
mod tests;

pub use message::{build_discover, build_inform, build_request, Message, Opcode};
pub use options::{MessageType, OptionCode};

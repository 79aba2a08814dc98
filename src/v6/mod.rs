//! DHCPv6 message model
//!
//! Options use the wide (2-byte code, 2-byte length) layout of the shared
//! codec. Relay messages are not modelled.

pub mod message;
pub mod options;

pub use message::{build_request, build_solicit, Message};
pub use options::{MessageType, OptionCode};

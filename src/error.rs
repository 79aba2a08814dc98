use crate::network::SocketError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DhcpError {
    /// A declared length runs past the end of the available bytes, or a
    /// fixed-size field does not have the size its type requires.
    #[error("Malformed {context}: need {needed} bytes, {available} available")]
    MalformedLength {
        context: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Empty {0} where data is required")]
    ZeroLength(&'static str),

    #[error("Option code mismatch: expected {expected}, got {actual}")]
    CodeMismatch { expected: u16, actual: u16 },

    #[error("Invalid magic cookie {0:02x?}")]
    InvalidMagicCookie([u8; 4]),

    #[error("Option {code} value of {len} bytes exceeds the {max}-byte limit")]
    ValueTooLong { code: u16, len: usize, max: usize },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid MAC address '{0}'")]
    MacParse(String),

    #[error("Payload of {0} bytes does not fit in a single IPv4 datagram")]
    PayloadTooLarge(usize),

    #[error("Socket operation failed")]
    Socket(#[from] SocketError),

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("No matching reply after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Transaction cancelled")]
    Cancelled,

    #[error("Server {server:?} declined the request")]
    Nak { server: Option<std::net::Ipv4Addr> },

    #[error("State machine reached a critical failure: {0}")]
    Critical(String),
}

impl DhcpError {
    pub(crate) fn short(context: &'static str, needed: usize, available: usize) -> Self {
        Self::MalformedLength {
            context,
            needed,
            available,
        }
    }
}

pub type Result<T> = std::result::Result<T, DhcpError>;

//! Reserved system addresses
//!
//! These literals are shared by the router and every client build: they must
//! not change independently on either side.

use crate::{Arg, Error, Result};

/// Prefix of every reserved address
pub const SYS_PREFIX: &str = "/sys";

/// Subscribe the sender to `(address)`
pub const SUBSCRIBE_ADDRESS: &str = "/sys/subscribe";

/// Acknowledgment of a subscribe, carries the original address
pub const SUBSCRIBED_ADDRESS: &str = "/sys/subscribed";

/// Ask the router to resend the retained message at `(address)`
pub const RESEND_ADDRESS: &str = "/sys/resend";

/// Handshake status pushed by the router: `(status, payload)`
pub const CONNECTION_STATUS_ADDRESS: &str = "/sys/connection";

/// Error report sent back to the origin of a failed request: `(message)`
pub const ERROR_ADDRESS: &str = "/sys/error";

/// Inline blob to be stored on disk: `(address, blob, flag...)`
pub const FROM_BLOB_ADDRESS: &str = "/sys/blob/from";

/// Explicit file-backed send: `(address, path)`
pub const SEND_BLOB_ADDRESS: &str = "/sys/blob/send";

/// Request an immediate push of a stored blob: `(address, path)`
pub const GIMME_BLOB_ADDRESS: &str = "/sys/blob/gimme";

/// Last segment marking a user address as blob-carrying
pub const BLOB_SEGMENT: &str = "blob";

/// Outcome of the rhizome-level handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ConnectionStatus {
    /// Admitted, payload is the assigned identity
    Success = 0,
    /// Refused by admission control, payload is an error description
    Refused = 1,
}

impl ConnectionStatus {
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ConnectionStatus::Success),
            1 => Some(ConnectionStatus::Refused),
            _ => None,
        }
    }

    /// Build the argument list of a connection-status message
    pub fn to_args(self, payload: impl Into<String>) -> Vec<Arg> {
        vec![Arg::Int(self as i32), Arg::String(payload.into())]
    }

    /// Parse the argument list of a connection-status message
    pub fn from_args(args: &[Arg]) -> Result<(Self, String)> {
        let code = match args.first() {
            Some(Arg::Int(code)) => *code,
            Some(Arg::Float(code)) => *code as i32,
            other => {
                return Err(Error::InvalidStatus(format!(
                    "expected status code, got {}",
                    other.map_or("nothing", Arg::type_name)
                )))
            }
        };
        let status = ConnectionStatus::from_i32(code)
            .ok_or_else(|| Error::InvalidStatus(format!("unknown status code {}", code)))?;
        let payload = match args.get(1) {
            Some(Arg::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Ok((status, payload))
    }
}

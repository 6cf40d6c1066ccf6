use thiserror::Error;

/// Failure of a single outbound RPC. The caller treats every variant as
/// "peer unreachable this round".
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("peer {addr} unreachable: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("rpc to {addr} timed out")]
    Timeout { addr: String },

    #[error("peer {addr} answered with HTTP {status}")]
    Status { addr: String, status: u16 },

    #[error("malformed reply from {addr}: {reason}")]
    Decode { addr: String, reason: String },
}

impl TransportError {
    pub fn from_reqwest(addr: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                addr: addr.to_string(),
            }
        } else if err.is_decode() {
            TransportError::Decode {
                addr: addr.to_string(),
                reason: err.to_string(),
            }
        } else {
            TransportError::Unreachable {
                addr: addr.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

//! Error types for the embedded sync server.
//!
//! [`ServerError`] covers the ways [`TransportServer::start`] can fail.
//!
//! [`TransportServer::start`]: crate::TransportServer::start

use std::net::SocketAddr;

/// Errors that can occur while running the sync server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Another process already listens on the requested port.
    #[error("address {addr} already in use: {message}")]
    AddressInUse {
        /// The address that could not be bound.
        addr: SocketAddr,
        /// The underlying OS error message.
        message: String,
    },

    /// Binding the listening socket failed for another reason.
    #[error("bind error on {addr}: {message}")]
    Bind {
        /// The address that could not be bound.
        addr: SocketAddr,
        /// The underlying OS error message.
        message: String,
    },

    /// The configured host and port do not form a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl ServerError {
    /// Classify a bind failure for `addr`.
    pub fn from_bind(addr: SocketAddr, error: &std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::AddrInUse {
            Self::AddressInUse {
                addr,
                message: error.to_string(),
            }
        } else {
            Self::Bind {
                addr,
                message: error.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 8080))
    }

    #[test]
    fn bind_failures_are_classified_by_kind() {
        let in_use = std::io::Error::from(std::io::ErrorKind::AddrInUse);
        assert!(matches!(
            ServerError::from_bind(addr(), &in_use),
            ServerError::AddressInUse { .. }
        ));

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let error = ServerError::from_bind(addr(), &denied);
        assert!(matches!(error, ServerError::Bind { .. }));
        assert!(error.to_string().starts_with("bind error on 127.0.0.1:8080"));
    }
}

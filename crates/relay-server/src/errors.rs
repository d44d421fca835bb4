//! Server error types.

use std::io;

use thiserror::Error;

/// Failures starting or running the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The accept loop stopped with an error.
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:1".into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:1"));
        assert!(msg.contains("in use"));
    }

    #[test]
    fn serve_error_has_source() {
        let err = ServerError::Serve(io::Error::other("boom"));
        assert!(std::error::Error::source(&err).is_some());
    }
}

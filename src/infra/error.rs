use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr, source }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn bind_error_names_the_address() {
        let addr: SocketAddr = "127.0.0.1:3000".parse().expect("valid addr");
        let err = InfraError::bind(addr, io::Error::from(io::ErrorKind::AddrInUse));

        let message = err.to_string();
        assert!(message.starts_with("failed to bind 127.0.0.1:3000"));
        assert!(std::error::Error::source(&err).is_some());
    }
}

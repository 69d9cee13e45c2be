//! Error types for swarmget
//!
//! One error enum covers every layer: the bencode codec, metadata
//! interpretation, the peer wire protocol and the download engine.

use std::fmt;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, TorrentError>;

/// Comprehensive error type for torrent operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentError {
    /// Bencode grammar violation at a byte offset
    MalformedEncoding {
        message: String,
        offset: usize,
    },

    /// A required metadata or tracker field is absent or has the wrong type
    MissingField {
        field: String,
        message: String,
    },

    /// The piece digest table is inconsistent with the declared lengths
    InvalidPieceTable {
        message: String,
    },

    /// A flat buffer is not a whole number of fixed-size records
    InvalidLength {
        message: String,
        unit: usize,
        actual: usize,
    },

    /// Handshake could not be completed on this stream
    HandshakeFailed {
        message: String,
        peer: Option<String>,
    },

    /// A message id other than the expected one arrived
    UnexpectedMessage {
        expected: u8,
        actual: u8,
    },

    /// The transport ended before a framed read completed
    ConnectionClosed {
        message: String,
    },

    /// Malformed message payload or frame
    ProtocolError {
        message: String,
    },

    /// A reassembled piece does not match its expected digest
    IntegrityError {
        piece_index: u32,
        expected: [u8; 20],
        actual: [u8; 20],
    },

    /// A piece could not be obtained from any peer
    DownloadFailed {
        piece_index: u32,
        attempts: u32,
        message: String,
    },

    /// Network errors
    NetworkError {
        message: String,
        address: Option<String>,
    },

    /// Tracker announce errors
    TrackerError {
        message: String,
        url: Option<String>,
    },

    /// File I/O and sink errors
    StorageError {
        message: String,
        path: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },
}

impl TorrentError {
    /// Create a new MalformedEncoding error
    pub fn malformed(message: impl Into<String>, offset: usize) -> Self {
        TorrentError::MalformedEncoding {
            message: message.into(),
            offset,
        }
    }

    /// Create a MissingField error for an absent field
    pub fn missing_field(field: impl Into<String>) -> Self {
        TorrentError::MissingField {
            field: field.into(),
            message: "field is missing".to_string(),
        }
    }

    /// Create a MissingField error for a field of the wrong type
    pub fn wrong_type(field: impl Into<String>, expected: &str) -> Self {
        TorrentError::MissingField {
            field: field.into(),
            message: format!("expected {}", expected),
        }
    }

    /// Create a new InvalidPieceTable error
    pub fn invalid_piece_table(message: impl Into<String>) -> Self {
        TorrentError::InvalidPieceTable {
            message: message.into(),
        }
    }

    /// Create a new InvalidLength error
    pub fn invalid_length(message: impl Into<String>, unit: usize, actual: usize) -> Self {
        TorrentError::InvalidLength {
            message: message.into(),
            unit,
            actual,
        }
    }

    /// Create a new HandshakeFailed error
    pub fn handshake_failed(message: impl Into<String>) -> Self {
        TorrentError::HandshakeFailed {
            message: message.into(),
            peer: None,
        }
    }

    /// Create a new HandshakeFailed error with peer address
    pub fn handshake_failed_with_peer(message: impl Into<String>, peer: impl Into<String>) -> Self {
        TorrentError::HandshakeFailed {
            message: message.into(),
            peer: Some(peer.into()),
        }
    }

    /// Create a new UnexpectedMessage error
    pub fn unexpected_message(expected: u8, actual: u8) -> Self {
        TorrentError::UnexpectedMessage { expected, actual }
    }

    /// Create a new ConnectionClosed error
    pub fn connection_closed(message: impl Into<String>) -> Self {
        TorrentError::ConnectionClosed {
            message: message.into(),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
        }
    }

    /// Create a new IntegrityError
    pub fn integrity_error(piece_index: u32, expected: [u8; 20], actual: [u8; 20]) -> Self {
        TorrentError::IntegrityError {
            piece_index,
            expected,
            actual,
        }
    }

    /// Create a new DownloadFailed error
    pub fn download_failed(piece_index: u32, attempts: u32, message: impl Into<String>) -> Self {
        TorrentError::DownloadFailed {
            piece_index,
            attempts,
            message: message.into(),
        }
    }

    /// Create a new NetworkError
    pub fn network_error(message: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: None,
        }
    }

    /// Create a new NetworkError with address
    pub fn network_error_with_address(message: impl Into<String>, address: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
        }
    }

    /// Create a new TrackerError
    pub fn tracker_error(message: impl Into<String>) -> Self {
        TorrentError::TrackerError {
            message: message.into(),
            url: None,
        }
    }

    /// Create a new TrackerError with the tracker URL
    pub fn tracker_error_with_url(message: impl Into<String>, url: impl Into<String>) -> Self {
        TorrentError::TrackerError {
            message: message.into(),
            url: Some(url.into()),
        }
    }

    /// Create a new StorageError
    pub fn storage_error(message: impl Into<String>) -> Self {
        TorrentError::StorageError {
            message: message.into(),
            path: None,
        }
    }

    /// Create a new StorageError with path
    pub fn storage_error_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        TorrentError::StorageError {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            TorrentError::MalformedEncoding { message, .. }
            | TorrentError::MissingField { message, .. }
            | TorrentError::InvalidPieceTable { message }
            | TorrentError::InvalidLength { message, .. }
            | TorrentError::HandshakeFailed { message, .. }
            | TorrentError::ConnectionClosed { message }
            | TorrentError::ProtocolError { message }
            | TorrentError::DownloadFailed { message, .. }
            | TorrentError::NetworkError { message, .. }
            | TorrentError::TrackerError { message, .. }
            | TorrentError::StorageError { message, .. }
            | TorrentError::ConfigError { message, .. } => {
                *message = format!("{}: {}", ctx, message);
            }
            TorrentError::UnexpectedMessage { .. } | TorrentError::IntegrityError { .. } => {}
        }
        self
    }

    /// Whether the failure belongs to one peer connection, so the work can be
    /// handed to a different peer.
    pub fn is_peer_failure(&self) -> bool {
        matches!(
            self,
            TorrentError::HandshakeFailed { .. }
                | TorrentError::UnexpectedMessage { .. }
                | TorrentError::ConnectionClosed { .. }
                | TorrentError::ProtocolError { .. }
                | TorrentError::IntegrityError { .. }
                | TorrentError::NetworkError { .. }
        )
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::MalformedEncoding { message, offset } => {
                write!(f, "Malformed encoding at offset {}: {}", offset, message)
            }
            TorrentError::MissingField { field, message } => {
                write!(f, "Missing field '{}': {}", field, message)
            }
            TorrentError::InvalidPieceTable { message } => {
                write!(f, "Invalid piece table: {}", message)
            }
            TorrentError::InvalidLength { message, unit, actual } => {
                write!(f, "Invalid length: {} (length {} is not a multiple of {})", message, actual, unit)
            }
            TorrentError::HandshakeFailed { message, peer } => match peer {
                Some(p) => write!(f, "Handshake failed: {} (peer: {})", message, p),
                None => write!(f, "Handshake failed: {}", message),
            },
            TorrentError::UnexpectedMessage { expected, actual } => {
                write!(f, "Unexpected message: expected id {}, got id {}", expected, actual)
            }
            TorrentError::ConnectionClosed { message } => {
                write!(f, "Connection closed: {}", message)
            }
            TorrentError::ProtocolError { message } => {
                write!(f, "Protocol error: {}", message)
            }
            TorrentError::IntegrityError { piece_index, expected, actual } => {
                write!(
                    f,
                    "Integrity error: piece {} hash mismatch (expected {}, got {})",
                    piece_index,
                    hex::encode(expected),
                    hex::encode(actual)
                )
            }
            TorrentError::DownloadFailed { piece_index, attempts, message } => {
                write!(f, "Download failed: piece {} after {} attempts: {}", piece_index, attempts, message)
            }
            TorrentError::NetworkError { message, address } => match address {
                Some(a) => write!(f, "Network error: {} (address: {})", message, a),
                None => write!(f, "Network error: {}", message),
            },
            TorrentError::TrackerError { message, url } => match url {
                Some(u) => write!(f, "Tracker error: {} (url: {})", message, u),
                None => write!(f, "Tracker error: {}", message),
            },
            TorrentError::StorageError { message, path } => match path {
                Some(p) => write!(f, "Storage error: {} (path: {})", message, p),
                None => write!(f, "Storage error: {}", message),
            },
            TorrentError::ConfigError { message, field } => match field {
                Some(field_val) => write!(f, "Config error: {} (field: {})", message, field_val),
                None => write!(f, "Config error: {}", message),
            },
        }
    }
}

impl std::error::Error for TorrentError {}

// Implement From traits for common error types

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => TorrentError::connection_closed(err.to_string()),
            _ => TorrentError::network_error(err.to_string()),
        }
    }
}

impl From<std::net::AddrParseError> for TorrentError {
    fn from(err: std::net::AddrParseError) -> Self {
        TorrentError::config_error_with_field(format!("Failed to parse address: {}", err), "peer")
    }
}

impl From<url::ParseError> for TorrentError {
    fn from(err: url::ParseError) -> Self {
        TorrentError::tracker_error(format!("Invalid tracker URL: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for TorrentError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        TorrentError::network_error("Operation timed out")
    }
}

#[cfg(feature = "tracker")]
impl From<reqwest::Error> for TorrentError {
    fn from(err: reqwest::Error) -> Self {
        match err.url() {
            Some(url) => TorrentError::tracker_error_with_url(err.to_string(), url.as_str()),
            None => TorrentError::tracker_error(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_encoding_display() {
        let err = TorrentError::malformed("unterminated integer", 7);
        assert_eq!(err.to_string(), "Malformed encoding at offset 7: unterminated integer");
    }

    #[test]
    fn test_unexpected_message_display() {
        let err = TorrentError::unexpected_message(5, 7);
        assert!(err.to_string().contains("expected id 5"));
        assert!(err.to_string().contains("got id 7"));
    }

    #[test]
    fn test_handshake_failed_with_peer() {
        let err = TorrentError::handshake_failed_with_peer("short read", "127.0.0.1:6881");
        assert!(err.to_string().contains("Handshake failed"));
        assert!(err.to_string().contains("127.0.0.1:6881"));
    }

    #[test]
    fn test_integrity_error_shows_hex_digests() {
        let err = TorrentError::integrity_error(3, [0xab; 20], [0x01; 20]);
        let text = err.to_string();
        assert!(text.contains("piece 3"));
        assert!(text.contains(&"ab".repeat(20)));
    }

    #[test]
    fn test_with_context() {
        let err = TorrentError::protocol_error("bad payload").with_context("while reading piece");
        assert_eq!(err.to_string(), "Protocol error: while reading piece: bad payload");
    }

    #[test]
    fn test_from_io_error_eof_is_connection_closed() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "early eof");
        let err: TorrentError = io_err.into();
        assert!(matches!(err, TorrentError::ConnectionClosed { .. }));
    }

    #[test]
    fn test_from_io_error_other_is_network() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: TorrentError = io_err.into();
        assert!(matches!(err, TorrentError::NetworkError { .. }));
    }

    #[test]
    fn test_from_addr_parse_error() {
        let addr_err = "invalid:address".parse::<std::net::SocketAddr>().unwrap_err();
        let err: TorrentError = addr_err.into();
        assert!(matches!(err, TorrentError::ConfigError { .. }));
    }

    #[test]
    fn test_peer_failure_classification() {
        assert!(TorrentError::connection_closed("eof").is_peer_failure());
        assert!(TorrentError::integrity_error(0, [0; 20], [1; 20]).is_peer_failure());
        assert!(!TorrentError::config_error("bad").is_peer_failure());
        assert!(!TorrentError::storage_error("disk full").is_peer_failure());
    }
}

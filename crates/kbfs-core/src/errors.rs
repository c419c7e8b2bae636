//! Error types for tier and identity capabilities.

use thiserror::Error;

/// Result alias for tier operations.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Errors raised by a storage tier, either while it is being opened or while
/// it serves requests.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Backing storage could not be initialized
    #[error("storage initialization failed at {path}: {message}")]
    Init {
        /// Directory the tier tried to open
        path: String,
        /// Underlying cause
        message: String,
    },

    /// Reading from the backing store failed
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// Writing to the backing store failed
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Stored bytes could not be decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// The remote peer is currently unreachable
    #[error("server at {addr} unavailable: {message}")]
    Unavailable {
        /// Peer address
        addr: String,
        /// Last connection error
        message: String,
    },

    /// The remote peer answered with an error
    #[error("remote error: {0}")]
    Remote(String),

    /// The tier was asked for an arrangement it cannot provide
    #[error("misconfigured: {0}")]
    Misconfigured(String),

    /// A revision was written out of order
    #[error("revision conflict: expected {expected}, got {actual}")]
    RevisionConflict {
        /// Next revision the server accepts
        expected: u64,
        /// Revision the caller tried to write
        actual: u64,
    },
}

impl ServerError {
    /// Create an initialization error for `path`
    pub fn init(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Init {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an unavailable error for `addr`
    pub fn unavailable(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            addr: addr.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by [`crate::CryptoOps`] implementations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material is malformed
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signature bytes are malformed
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Signature did not verify against the claimed key
    #[error("signature verification failed")]
    VerificationFailed,

    /// Encryption failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption or authentication failed
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Encoding of sealed data failed
    #[error("codec error: {0}")]
    Codec(String),

    /// Crypto was delegated to a service that failed
    #[error("crypto service error: {0}")]
    Service(String),
}

/// Errors raised by [`crate::IdentityVerifier`] implementations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No user matches the assertion
    #[error("no user matches assertion {0}")]
    NoSuchUser(String),

    /// UID is not known to this verifier
    #[error("unknown uid {0}")]
    UnknownUid(String),

    /// The identity service failed
    #[error("identity service error: {0}")]
    Service(String),
}

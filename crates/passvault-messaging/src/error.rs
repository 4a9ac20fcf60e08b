use thiserror::Error;

/// Why a `connect()` attempt failed. The caller uses this to decide what to
/// tell the user (e.g. prompt them to start or re-enable the peer
/// application).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// The peer reported `disconnected` while we were still connecting;
    /// the desktop application is probably not running.
    #[error("The peer application is not running")]
    PeerNotRunning,
    /// The transport closed with an error; browser-side integration has
    /// been disabled.
    #[error("Integration with the peer application is disabled")]
    IntegrationDisabled,
    /// The connection went away without a more specific reason.
    #[error("The connection was closed")]
    Closed,
}

/// Errors surfaced by the channel session.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Crypto(#[from] passvault_crypto::CryptoError),
    #[error("Serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Transport write failed: {0}")]
    Transport(String),
    #[error("No shared secret has been established")]
    MissingSharedSecret,
    #[error("No key exchange is in progress")]
    NoKeyExchange,
    #[error("Timed out waiting for the peer to complete the key exchange")]
    HandshakeTimeout,
}

use passvault_crypto::{CryptoError, SymmetricCryptoKey};
use thiserror::Error;

use crate::{Dialog, OuterMessage, PeerMessage};

/// Events surfaced by the transport pipe.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// An inbound envelope from the peer.
    Message(PeerMessage),
    /// The pipe closed. `error` carries the platform's close reason when
    /// one was reported.
    Disconnected {
        #[allow(missing_docs)]
        error: Option<String>,
    },
}

/// A transport-level write failure. Treated as a silent disconnect by the
/// session.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Events are delivered through a buffered channel so none are lost between
/// subscription and the first receive.
pub type TransportReceiver = tokio::sync::mpsc::UnboundedReceiver<TransportEvent>;

/// The opaque bidirectional message pipe to the peer process.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Write one envelope to the pipe.
    async fn post_message(&self, message: OuterMessage) -> Result<(), TransportError>;

    /// Open the pipe (if needed) and subscribe to peer events. Only one
    /// receive loop drains the returned receiver.
    fn subscribe(&self) -> TransportReceiver;

    /// Tear the pipe down.
    fn disconnect(&self);
}

/// The dialog surface. Fire-and-forget: the session never waits for the
/// user to dismiss anything shown here.
pub trait ChannelUserInterface: Send + Sync {
    #[allow(missing_docs)]
    fn show_dialog(&self, dialog: Dialog);

    /// Show the key-exchange fingerprint phrase for out-of-band
    /// verification against the peer's display.
    fn show_fingerprint_dialog(&self, phrase: String);

    /// The vault was unlocked through the channel.
    fn notify_unlocked(&self);
}

/// Account state consumed by the session: identity stamping and the
/// unlock-key sink used by biometric unlock.
#[async_trait::async_trait]
pub trait AccountContext: Send + Sync {
    /// Active account id, stamped into outbound messages.
    async fn user_id(&self) -> Option<String>;

    /// Install the vault unlock key received from the peer.
    async fn set_user_key(&self, key: SymmetricCryptoKey) -> Result<(), CryptoError>;

    /// Validate the installed key by deriving the account's cryptographic
    /// fingerprint. Failure means the key belongs to a different user.
    async fn verify_user_key(&self) -> Result<(), CryptoError>;

    /// Remove the installed key again.
    async fn clear_user_key(&self);
}

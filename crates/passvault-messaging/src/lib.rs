//! Secure native-messaging channel between the extension and a trusted
//! local peer application.
//!
//! The channel pairs with the peer through an ephemeral RSA key exchange,
//! then moves all application traffic inside an authenticated symmetric
//! envelope. Message freshness and per-install addressing guard against
//! replayed and cross-install traffic. The transport pipe, the dialog
//! surface, and the account/unlock-key state are external collaborators.

mod dialog;
mod error;
mod message;
mod session;
mod traits;

pub use dialog::{Dialog, DialogSeverity};
pub use error::{ChannelError, ConnectError};
pub use message::{
    AppMessage, AppPayload, BiometricUnlockResponse, ControlMessage, Message, MessagePayload,
    OuterMessage, PeerMessage, ReceiveCommand, ReceiveMessage, SendCommand,
};
pub use session::{ChannelSession, ChannelSessionOptions, PeerMode, SessionState};
pub use traits::{
    AccountContext, ChannelUserInterface, Transport, TransportError, TransportEvent,
    TransportReceiver,
};

use passvault_crypto::EncString;
use serde::{Deserialize, Serialize};

/// Command carried by an outbound [`Message`]. A closed set, so adding a
/// command is a compile-time-checked change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SendCommand {
    /// Publish the ephemeral public key to start the key exchange.
    SetupEncryption,
    /// Ask the peer to perform a biometric unlock.
    BiometricUnlock,
}

/// An outbound message. `user_id` and `timestamp` are stamped by the
/// session before transmission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[allow(missing_docs)]
    pub command: SendCommand,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub user_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Base64 SPKI public key; only present on `SetupEncryption`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl Message {
    /// A bare command message; the session fills in the rest.
    pub fn new(command: SendCommand) -> Self {
        Message {
            command,
            user_id: None,
            timestamp: None,
            public_key: None,
        }
    }
}

/// The unit of exchange over the transport pipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OuterMessage {
    /// Stable per-install identifier, used by the peer to address replies
    /// when several installs share one machine.
    pub app_id: String,
    #[allow(missing_docs)]
    pub message: MessagePayload,
}

/// Plaintext during the handshake, ciphertext afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessagePayload {
    #[allow(missing_docs)]
    Encrypted(EncString),
    #[allow(missing_docs)]
    Plain(Message),
}

/// Everything the peer can send us. Control traffic is dispatched on the
/// `command` tag; anything without a command tag is application traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PeerMessage {
    #[allow(missing_docs)]
    Control(ControlMessage),
    #[allow(missing_docs)]
    App(AppMessage),
}

/// Connection and handshake control traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ControlMessage {
    /// The peer application is up and accepted the connection.
    Connected,
    /// The peer application is shutting the pipe down.
    Disconnected,
    /// The peer's reply to our published public key.
    #[serde(rename_all = "camelCase")]
    SetupEncryption {
        #[allow(missing_docs)]
        app_id: String,
        /// RSA-OAEP-SHA1 encrypted shared secret, base64.
        shared_secret: String,
    },
    /// The peer no longer trusts the established shared secret.
    #[serde(rename_all = "camelCase")]
    InvalidateEncryption {
        #[allow(missing_docs)]
        app_id: String,
    },
    /// The peer asks the user to confirm the key-exchange fingerprint.
    VerifyFingerprint,
    /// The unlock request was made for a different account.
    WrongUserId,
}

/// An application message addressed to one install.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppMessage {
    #[allow(missing_docs)]
    pub app_id: String,
    #[allow(missing_docs)]
    pub message: AppPayload,
}

/// Encrypted in the desktop-peer variant; plaintext when the peer shares
/// our process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AppPayload {
    #[allow(missing_docs)]
    Encrypted(EncString),
    #[allow(missing_docs)]
    Plain(ReceiveMessage),
}

/// A decrypted inbound application message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveMessage {
    #[allow(missing_docs)]
    pub command: ReceiveCommand,
    /// Milliseconds since the Unix epoch; checked for freshness before any
    /// dispatch happens.
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub response: Option<BiometricUnlockResponse>,
    /// Base64 unlock key returned by a successful biometric unlock.
    #[serde(rename = "keyB64", default, skip_serializing_if = "Option::is_none")]
    pub key_b64: Option<String>,
}

/// Application commands the peer can dispatch to us.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReceiveCommand {
    #[allow(missing_docs)]
    BiometricUnlock,
}

/// Status of a biometric unlock attempt on the peer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BiometricUnlockResponse {
    #[allow(missing_docs)]
    #[serde(rename = "unlocked")]
    Unlocked,
    #[allow(missing_docs)]
    #[serde(rename = "not enabled")]
    NotEnabled,
    #[allow(missing_docs)]
    #[serde(rename = "not supported")]
    NotSupported,
    #[allow(missing_docs)]
    #[serde(rename = "canceled")]
    Canceled,
}

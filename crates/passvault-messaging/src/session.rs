use std::{sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use passvault_crypto::{
    decrypt_rsa2048_oaep_sha1, derive_fingerprint, make_ephemeral_key_pair, EncString,
    SymmetricCryptoKey,
};
use rsa::RsaPrivateKey;
use tokio::sync::{oneshot, Mutex};

use crate::{
    AccountContext, AppPayload, BiometricUnlockResponse, ChannelError, ChannelUserInterface,
    ConnectError, ControlMessage, Dialog, Message, MessagePayload, OuterMessage, PeerMessage,
    ReceiveCommand, ReceiveMessage, SendCommand, Transport, TransportEvent, TransportReceiver,
};

/// Inbound messages older (or newer) than this are dropped as stale.
const MESSAGE_VALID_TIMEOUT_MS: i64 = 10 * 1000;

/// Which kind of peer this session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerMode {
    /// A separate desktop application. Traffic is encrypted and inbound
    /// messages are filtered by `app_id`.
    Desktop,
    /// A peer bundled into the same process (e.g. a browser-provided native
    /// component). Always present, plaintext traffic, implicitly trusted.
    Bundled,
}

/// Connection lifecycle of a [`ChannelSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    #[allow(missing_docs)]
    Disconnected,
    /// Pipe opened, waiting for the peer to accept.
    Connecting,
    /// Peer accepted; no shared secret yet.
    Connected,
    /// Shared secret established; application traffic flows encrypted.
    Secure,
}

/// Construction-time configuration of a session.
#[derive(Debug, Clone)]
pub struct ChannelSessionOptions {
    /// Stable per-install identifier.
    pub app_id: String,
    #[allow(missing_docs)]
    pub peer_mode: PeerMode,
    /// Bound on the wait for the peer's key-exchange reply. The protocol
    /// itself defines no timeout; embedders opt into one.
    pub handshake_timeout: Option<Duration>,
}

#[derive(Default)]
struct CryptoState {
    /// Ephemeral; lives for one handshake attempt.
    private_key: Option<RsaPrivateKey>,
    public_key: Option<Vec<u8>>,
    shared_secret: Option<SymmetricCryptoKey>,
    validating_fingerprint: bool,
}

/// One pairing/connection to the trusted peer.
///
/// Created once per process and shared as an [`Arc`]; `connect()` spawns
/// the receive loop that drives the handshake state machine. The shared
/// secret is volatile, in-memory only — a process restart forces a fresh
/// handshake.
pub struct ChannelSession<T, U, A>
where
    T: Transport + 'static,
    U: ChannelUserInterface + 'static,
    A: AccountContext + 'static,
{
    transport: T,
    user_interface: U,
    account: A,

    app_id: String,
    peer_mode: PeerMode,
    handshake_timeout: Option<Duration>,

    state: Mutex<SessionState>,
    crypto: Mutex<CryptoState>,
    pending_connect: Mutex<Option<oneshot::Sender<Result<(), ConnectError>>>>,
    pending_secure_setup: Mutex<Option<oneshot::Sender<()>>>,
    response_resolver: Mutex<Option<oneshot::Sender<ReceiveMessage>>>,
}

impl<T, U, A> ChannelSession<T, U, A>
where
    T: Transport + 'static,
    U: ChannelUserInterface + 'static,
    A: AccountContext + 'static,
{
    #[allow(missing_docs)]
    pub fn new(
        transport: T,
        user_interface: U,
        account: A,
        options: ChannelSessionOptions,
    ) -> Arc<Self> {
        Arc::new(ChannelSession {
            transport,
            user_interface,
            account,
            app_id: options.app_id,
            peer_mode: options.peer_mode,
            handshake_timeout: options.handshake_timeout,
            state: Mutex::new(SessionState::Disconnected),
            crypto: Mutex::new(CryptoState::default()),
            pending_connect: Mutex::new(None),
            pending_secure_setup: Mutex::new(None),
            response_resolver: Mutex::new(None),
        })
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// Open the pipe and wait for the peer to accept the connection.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ConnectError> {
        {
            let state = self.state.lock().await;
            if matches!(*state, SessionState::Connected | SessionState::Secure) {
                return Ok(());
            }
        }

        let receiver = self.transport.subscribe();
        *self.state.lock().await = SessionState::Connecting;

        let (tx, rx) = oneshot::channel();
        *self.pending_connect.lock().await = Some(tx);

        self.spawn_receive_loop(receiver);

        if self.peer_mode == PeerMode::Bundled {
            // The bundled peer is always available; there is no peer
            // process to wait for.
            *self.state.lock().await = SessionState::Connected;
            self.resolve_connect(Ok(())).await;
        }

        rx.await.map_err(|_| ConnectError::Closed)?
    }

    /// Stamp identity and freshness onto `message` and send it, encrypted
    /// when talking to a separate peer process. Lazily connects and runs
    /// the key exchange as needed.
    pub async fn send(self: &Arc<Self>, mut message: Message) -> Result<(), ChannelError> {
        self.ensure_connected().await?;

        message.user_id = self.account.user_id().await;
        message.timestamp = Some(Utc::now().timestamp_millis());

        let payload = match self.peer_mode {
            PeerMode::Bundled => MessagePayload::Plain(message),
            PeerMode::Desktop => MessagePayload::Encrypted(self.encrypt_message(&message).await?),
        };

        self.post_message(OuterMessage {
            app_id: self.app_id.clone(),
            message: payload,
        })
        .await
    }

    /// Wait for the next dispatched application message. Only the latest
    /// caller is resolved; an earlier pending call is abandoned.
    pub async fn get_response(&self) -> Result<ReceiveMessage, ChannelError> {
        let (tx, rx) = oneshot::channel();
        *self.response_resolver.lock().await = Some(tx);
        rx.await.map_err(|_| ChannelError::Connect(ConnectError::Closed))
    }

    fn spawn_receive_loop(self: &Arc<Self>, mut receiver: TransportReceiver) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let closed = matches!(event, TransportEvent::Disconnected { .. });
                session.handle_event(event).await;
                if closed {
                    break;
                }
            }
            log::debug!("native messaging receive loop finished");
        });
    }

    async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message(message) => self.handle_peer_message(message).await,
            TransportEvent::Disconnected { error } => self.handle_transport_closed(error).await,
        }
    }

    async fn handle_transport_closed(&self, error: Option<String>) {
        self.clear_crypto_state().await;
        *self.state.lock().await = SessionState::Disconnected;

        let reason = if error.is_some() {
            ConnectError::IntegrationDisabled
        } else {
            ConnectError::Closed
        };
        self.resolve_connect(Err(reason)).await;
    }

    async fn handle_peer_message(&self, message: PeerMessage) {
        match message {
            PeerMessage::Control(control) => self.handle_control(control).await,
            PeerMessage::App(envelope) => {
                if !self.accepts_app_id(&envelope.app_id) {
                    return;
                }
                self.handle_app_payload(envelope.message).await;
            }
        }
    }

    async fn handle_control(&self, control: ControlMessage) {
        match control {
            ControlMessage::Connected => {
                *self.state.lock().await = SessionState::Connected;
                self.resolve_connect(Ok(())).await;
            }
            ControlMessage::Disconnected => {
                let was_connecting = {
                    let mut state = self.state.lock().await;
                    let was_connecting = *state == SessionState::Connecting;
                    *state = SessionState::Disconnected;
                    was_connecting
                };
                self.transport.disconnect();
                if was_connecting {
                    self.resolve_connect(Err(ConnectError::PeerNotRunning)).await;
                }
            }
            ControlMessage::SetupEncryption {
                app_id,
                shared_secret,
            } => {
                // Replies addressed to another install are not ours to act
                // on.
                if !self.accepts_app_id(&app_id) {
                    return;
                }
                if let Err(error) = self.finish_key_exchange(&shared_secret).await {
                    log::error!("failed to establish shared secret: {error}");
                }
            }
            ControlMessage::InvalidateEncryption { app_id } => {
                if !self.accepts_app_id(&app_id) {
                    return;
                }
                self.clear_crypto_state().await;
                *self.state.lock().await = SessionState::Disconnected;
                self.user_interface.show_dialog(Dialog::invalid_encryption());
            }
            ControlMessage::VerifyFingerprint => {
                let public_key = {
                    let mut crypto = self.crypto.lock().await;
                    // A second prompt after the secret exists would be
                    // redundant; the exchange already completed.
                    if crypto.shared_secret.is_some() {
                        return;
                    }
                    crypto.validating_fingerprint = true;
                    crypto.public_key.clone()
                };
                if let Some(public_key) = public_key {
                    let phrase = derive_fingerprint(&[&public_key]).phrase();
                    self.user_interface.show_fingerprint_dialog(phrase);
                }
            }
            ControlMessage::WrongUserId => {
                self.user_interface.show_dialog(Dialog::wrong_user());
            }
        }
    }

    async fn handle_app_payload(&self, payload: AppPayload) {
        let message = match (self.peer_mode, payload) {
            (PeerMode::Desktop, AppPayload::Encrypted(payload)) => {
                match self.decrypt_message(payload).await {
                    Ok(message) => message,
                    Err(error) => {
                        // Fatal for this message only; the loop stays alive.
                        log::error!("failed to decrypt native message: {error}");
                        return;
                    }
                }
            }
            (PeerMode::Bundled, AppPayload::Plain(message)) => message,
            (mode, _) => {
                log::warn!("dropping app message with unexpected payload form in {mode:?} mode");
                return;
            }
        };

        let now = Utc::now().timestamp_millis();
        if (now - message.timestamp).abs() > MESSAGE_VALID_TIMEOUT_MS {
            log::warn!("native message is too old, ignoring");
            return;
        }

        match message.command {
            ReceiveCommand::BiometricUnlock => self.handle_biometric_unlock(&message).await,
        }

        if let Some(resolver) = self.response_resolver.lock().await.take() {
            let _ = resolver.send(message);
        }
    }

    async fn handle_biometric_unlock(&self, message: &ReceiveMessage) {
        match message.response {
            Some(BiometricUnlockResponse::NotEnabled) => {
                self.user_interface
                    .show_dialog(Dialog::biometrics_not_enabled());
            }
            Some(BiometricUnlockResponse::NotSupported) => {
                self.user_interface
                    .show_dialog(Dialog::biometrics_not_supported());
            }
            Some(BiometricUnlockResponse::Unlocked) => {
                let Some(key_b64) = &message.key_b64 else {
                    log::error!("biometric unlock response is missing the unlock key");
                    return;
                };
                let key = match SymmetricCryptoKey::from_base64(key_b64) {
                    Ok(key) => key,
                    Err(error) => {
                        log::error!("unable to parse unlock key: {error}");
                        return;
                    }
                };
                if let Err(error) = self.account.set_user_key(key).await {
                    log::error!("unable to install unlock key: {error}");
                    return;
                }
                // Verify the key is correct by deriving the account
                // fingerprint with it.
                if let Err(error) = self.account.verify_user_key().await {
                    log::error!("unable to verify key: {error}");
                    self.account.clear_user_key().await;
                    self.user_interface.show_dialog(Dialog::wrong_user());
                    return;
                }
                self.user_interface.notify_unlocked();
            }
            Some(BiometricUnlockResponse::Canceled) | None => {}
        }
    }

    /// Generate an ephemeral RSA key pair, publish the public half, and
    /// wait for the peer's encrypted shared secret. There is no built-in
    /// bound on the wait; `handshake_timeout` adds one when configured.
    async fn secure_communication(self: &Arc<Self>) -> Result<(), ChannelError> {
        let key_pair = make_ephemeral_key_pair()?;
        let public_key_b64 = STANDARD.encode(&key_pair.public);
        {
            let mut crypto = self.crypto.lock().await;
            crypto.private_key = Some(key_pair.private);
            crypto.public_key = Some(key_pair.public);
        }

        let (tx, rx) = oneshot::channel();
        *self.pending_secure_setup.lock().await = Some(tx);

        let mut message = Message::new(SendCommand::SetupEncryption);
        message.public_key = Some(public_key_b64);
        message.user_id = self.account.user_id().await;
        self.send_unencrypted(message).await?;

        let wait = async {
            rx.await
                .map_err(|_| ChannelError::Connect(ConnectError::Closed))
        };
        match self.handshake_timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| ChannelError::HandshakeTimeout)?,
            None => wait.await,
        }
    }

    async fn finish_key_exchange(&self, shared_secret_b64: &str) -> Result<(), ChannelError> {
        let encrypted = STANDARD
            .decode(shared_secret_b64)
            .map_err(passvault_crypto::CryptoError::from)?;

        {
            let mut crypto = self.crypto.lock().await;
            let private_key = crypto
                .private_key
                .as_ref()
                .ok_or(ChannelError::NoKeyExchange)?;
            let secret = decrypt_rsa2048_oaep_sha1(private_key, &encrypted)?;
            let key = SymmetricCryptoKey::try_from(secret.as_slice())?;

            crypto.validating_fingerprint = false;
            crypto.shared_secret = Some(key);
            // The key pair served its one handshake.
            crypto.private_key = None;
            crypto.public_key = None;
        }

        *self.state.lock().await = SessionState::Secure;
        if let Some(resolver) = self.pending_secure_setup.lock().await.take() {
            let _ = resolver.send(());
        }
        Ok(())
    }

    async fn encrypt_message(self: &Arc<Self>, message: &Message) -> Result<EncString, ChannelError> {
        let needs_handshake = self.crypto.lock().await.shared_secret.is_none();
        if needs_handshake {
            self.secure_communication().await?;
        }

        let crypto = self.crypto.lock().await;
        let secret = crypto
            .shared_secret
            .as_ref()
            .ok_or(ChannelError::MissingSharedSecret)?;
        let SymmetricCryptoKey::Aes256CbcHmacKey(key) = secret;

        let json = serde_json::to_vec(message)?;
        Ok(EncString::encrypt_aes256_hmac(&json, key))
    }

    async fn decrypt_message(&self, payload: EncString) -> Result<ReceiveMessage, ChannelError> {
        let crypto = self.crypto.lock().await;
        let secret = crypto
            .shared_secret
            .as_ref()
            .ok_or(ChannelError::MissingSharedSecret)?;
        let decrypted = payload.decrypt_with_key(secret)?;
        Ok(serde_json::from_slice(&decrypted)?)
    }

    async fn send_unencrypted(self: &Arc<Self>, mut message: Message) -> Result<(), ChannelError> {
        self.ensure_connected().await?;
        message.timestamp = Some(Utc::now().timestamp_millis());

        self.post_message(OuterMessage {
            app_id: self.app_id.clone(),
            message: MessagePayload::Plain(message),
        })
        .await
    }

    /// A write failure means the pipe died without a disconnect event:
    /// treat it as a silent disconnect and do not retry.
    async fn post_message(&self, message: OuterMessage) -> Result<(), ChannelError> {
        if let Err(error) = self.transport.post_message(message).await {
            log::error!("native messaging port disconnected, disconnecting: {error}");
            self.clear_crypto_state().await;
            *self.state.lock().await = SessionState::Disconnected;
            self.user_interface.show_dialog(Dialog::invalid_encryption());
            return Err(ChannelError::Transport(error.to_string()));
        }
        Ok(())
    }

    async fn ensure_connected(self: &Arc<Self>) -> Result<(), ChannelError> {
        let state = *self.state.lock().await;
        if state == SessionState::Disconnected {
            self.connect().await?;
        }
        Ok(())
    }

    fn accepts_app_id(&self, app_id: &str) -> bool {
        // The bundled peer shares our process; there is nothing to filter.
        self.peer_mode == PeerMode::Bundled || app_id == self.app_id
    }

    async fn clear_crypto_state(&self) {
        let mut crypto = self.crypto.lock().await;
        *crypto = CryptoState::default();
        // Dropping the sender fails any handshake still in flight.
        self.pending_secure_setup.lock().await.take();
    }

    async fn resolve_connect(&self, result: Result<(), ConnectError>) {
        if let Some(resolver) = self.pending_connect.lock().await.take() {
            let _ = resolver.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex as StdMutex,
    };

    use passvault_crypto::{encrypt_rsa2048_oaep_sha1, CryptoError};
    use rsa::{pkcs8::DecodePublicKey, RsaPublicKey};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{AppMessage, TransportError};

    const APP_ID: &str = "test-app-id";

    #[derive(Clone, Default)]
    struct TestTransport {
        inner: Arc<TestTransportInner>,
    }

    #[derive(Default)]
    struct TestTransportInner {
        outgoing: StdMutex<Vec<OuterMessage>>,
        sender: StdMutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
        fail_writes: AtomicBool,
        disconnect_calls: AtomicUsize,
    }

    impl TestTransport {
        fn push(&self, event: TransportEvent) {
            self.inner
                .sender
                .lock()
                .unwrap()
                .as_ref()
                .expect("no subscription yet")
                .send(event)
                .unwrap();
        }

        fn outgoing(&self) -> Vec<OuterMessage> {
            self.inner.outgoing.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Transport for TestTransport {
        async fn post_message(&self, message: OuterMessage) -> Result<(), TransportError> {
            if self.inner.fail_writes.load(Ordering::SeqCst) {
                return Err(TransportError("broken pipe".to_owned()));
            }
            self.inner.outgoing.lock().unwrap().push(message);
            Ok(())
        }

        fn subscribe(&self) -> TransportReceiver {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.inner.sender.lock().unwrap() = Some(tx);
            rx
        }

        fn disconnect(&self) {
            self.inner.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct TestUi {
        inner: Arc<TestUiInner>,
    }

    #[derive(Default)]
    struct TestUiInner {
        dialogs: StdMutex<Vec<Dialog>>,
        fingerprints: StdMutex<Vec<String>>,
        unlocked: AtomicUsize,
    }

    impl TestUi {
        fn dialogs(&self) -> Vec<Dialog> {
            self.inner.dialogs.lock().unwrap().clone()
        }

        fn fingerprints(&self) -> Vec<String> {
            self.inner.fingerprints.lock().unwrap().clone()
        }
    }

    impl ChannelUserInterface for TestUi {
        fn show_dialog(&self, dialog: Dialog) {
            self.inner.dialogs.lock().unwrap().push(dialog);
        }

        fn show_fingerprint_dialog(&self, phrase: String) {
            self.inner.fingerprints.lock().unwrap().push(phrase);
        }

        fn notify_unlocked(&self) {
            self.inner.unlocked.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct TestAccount {
        inner: Arc<TestAccountInner>,
    }

    #[derive(Default)]
    struct TestAccountInner {
        installed_keys: StdMutex<Vec<SymmetricCryptoKey>>,
        fail_verify: AtomicBool,
        clear_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AccountContext for TestAccount {
        async fn user_id(&self) -> Option<String> {
            Some("user-123".to_owned())
        }

        async fn set_user_key(&self, key: SymmetricCryptoKey) -> Result<(), CryptoError> {
            self.inner.installed_keys.lock().unwrap().push(key);
            Ok(())
        }

        async fn verify_user_key(&self) -> Result<(), CryptoError> {
            if self.inner.fail_verify.load(Ordering::SeqCst) {
                return Err(CryptoError::InvalidKey);
            }
            Ok(())
        }

        async fn clear_user_key(&self) {
            self.inner.clear_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    type TestSession = Arc<ChannelSession<TestTransport, TestUi, TestAccount>>;

    fn desktop_session() -> (TestSession, TestTransport, TestUi, TestAccount) {
        let transport = TestTransport::default();
        let ui = TestUi::default();
        let account = TestAccount::default();
        let session = ChannelSession::new(
            transport.clone(),
            ui.clone(),
            account.clone(),
            ChannelSessionOptions {
                app_id: APP_ID.to_owned(),
                peer_mode: PeerMode::Desktop,
                handshake_timeout: None,
            },
        );
        (session, transport, ui, account)
    }

    fn bundled_session() -> (TestSession, TestTransport, TestUi, TestAccount) {
        let transport = TestTransport::default();
        let ui = TestUi::default();
        let account = TestAccount::default();
        let session = ChannelSession::new(
            transport.clone(),
            ui.clone(),
            account.clone(),
            ChannelSessionOptions {
                app_id: APP_ID.to_owned(),
                peer_mode: PeerMode::Bundled,
                handshake_timeout: None,
            },
        );
        (session, transport, ui, account)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Wait until the transport has seen at least `count` outgoing
    /// envelopes. Key generation makes the exact timing unpredictable.
    async fn wait_for_outgoing(transport: &TestTransport, count: usize) -> Vec<OuterMessage> {
        for _ in 0..400 {
            let outgoing = transport.outgoing();
            if outgoing.len() >= count {
                return outgoing;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("timed out waiting for {count} outgoing messages");
    }

    async fn connect(session: &TestSession, transport: &TestTransport) {
        let connect = session.connect();
        let accept = async {
            settle().await;
            transport.push(TransportEvent::Message(PeerMessage::Control(
                ControlMessage::Connected,
            )));
        };
        let (result, ()) = tokio::join!(connect, accept);
        result.unwrap();
    }

    /// Drive the key exchange from the peer's side: read the published
    /// public key, pick a shared secret, and send it back encrypted.
    /// Returns the shared symmetric key.
    async fn complete_handshake(
        session: &TestSession,
        transport: &TestTransport,
    ) -> SymmetricCryptoKey {
        let baseline = transport.outgoing().len();
        let send = session.send(Message::new(SendCommand::BiometricUnlock));
        let peer = async {
            let outgoing = wait_for_outgoing(transport, baseline + 1).await;
            let OuterMessage {
                message: MessagePayload::Plain(setup),
                ..
            } = outgoing.last().unwrap().clone()
            else {
                panic!("expected a plaintext key-exchange message");
            };
            assert_eq!(setup.command, SendCommand::SetupEncryption);

            let spki = STANDARD.decode(setup.public_key.unwrap()).unwrap();
            let public_key = RsaPublicKey::from_public_key_der(&spki).unwrap();

            let secret = SymmetricCryptoKey::generate(rand::thread_rng());
            let encrypted =
                encrypt_rsa2048_oaep_sha1(&public_key, &secret.to_encoded()).unwrap();
            transport.push(TransportEvent::Message(PeerMessage::Control(
                ControlMessage::SetupEncryption {
                    app_id: APP_ID.to_owned(),
                    shared_secret: STANDARD.encode(encrypted),
                },
            )));
            secret
        };
        let (result, secret) = tokio::join!(send, peer);
        result.unwrap();
        secret
    }

    fn encrypt_receive_message(message: &ReceiveMessage, key: &SymmetricCryptoKey) -> EncString {
        let SymmetricCryptoKey::Aes256CbcHmacKey(inner) = key;
        EncString::encrypt_aes256_hmac(&serde_json::to_vec(message).unwrap(), inner)
    }

    fn push_app_message(transport: &TestTransport, app_id: &str, payload: AppPayload) {
        transport.push(TransportEvent::Message(PeerMessage::App(AppMessage {
            app_id: app_id.to_owned(),
            message: payload,
        })));
    }

    #[tokio::test]
    async fn test_connect_resolves_when_peer_reports_connected() {
        let (session, transport, _ui, _account) = desktop_session();

        connect(&session, &transport).await;

        assert_eq!(session.state().await, SessionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_fails_when_peer_disconnects_while_connecting() {
        let (session, transport, _ui, _account) = desktop_session();

        let connect = session.connect();
        let reject = async {
            settle().await;
            transport.push(TransportEvent::Message(PeerMessage::Control(
                ControlMessage::Disconnected,
            )));
        };
        let (result, ()) = tokio::join!(connect, reject);

        assert_eq!(result.unwrap_err(), ConnectError::PeerNotRunning);
        assert_eq!(session.state().await, SessionState::Disconnected);
        assert_eq!(transport.inner.disconnect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_distinguishes_disabled_integration_on_transport_close() {
        let (session, transport, _ui, _account) = desktop_session();

        let connect = session.connect();
        let close = async {
            settle().await;
            transport.push(TransportEvent::Disconnected {
                error: Some("Specified native messaging host not found".to_owned()),
            });
        };
        let (result, ()) = tokio::join!(connect, close);

        assert_eq!(result.unwrap_err(), ConnectError::IntegrationDisabled);
        assert_eq!(session.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_runs_key_exchange_and_encrypts_application_traffic() {
        let (session, transport, _ui, _account) = desktop_session();
        connect(&session, &transport).await;

        let secret = complete_handshake(&session, &transport).await;

        assert_eq!(session.state().await, SessionState::Secure);

        let outgoing = transport.outgoing();
        let OuterMessage {
            app_id,
            message: MessagePayload::Encrypted(payload),
        } = outgoing.last().unwrap().clone()
        else {
            panic!("application traffic must be encrypted");
        };
        assert_eq!(app_id, APP_ID);

        let decrypted = payload.decrypt_with_key(&secret).unwrap();
        let message: Message = serde_json::from_slice(&decrypted).unwrap();
        assert_eq!(message.command, SendCommand::BiometricUnlock);
        assert_eq!(message.user_id.as_deref(), Some("user-123"));
        assert!(message.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_setup_encryption_for_another_install_is_ignored() {
        let (session, transport, _ui, _account) = desktop_session();
        connect(&session, &transport).await;

        let baseline = transport.outgoing().len();
        let send = session.send(Message::new(SendCommand::BiometricUnlock));
        let peer = async {
            let outgoing = wait_for_outgoing(&transport, baseline + 1).await;

            // A reply belonging to another install on this machine.
            transport.push(TransportEvent::Message(PeerMessage::Control(
                ControlMessage::SetupEncryption {
                    app_id: "another-install".to_owned(),
                    shared_secret: STANDARD.encode([0u8; 256]),
                },
            )));
            settle().await;
            assert_eq!(session.state().await, SessionState::Connected);

            // The reply addressed to us completes the exchange.
            let OuterMessage {
                message: MessagePayload::Plain(setup),
                ..
            } = outgoing.last().unwrap().clone()
            else {
                panic!("expected the key-exchange message");
            };
            let spki = STANDARD.decode(setup.public_key.unwrap()).unwrap();
            let public_key = RsaPublicKey::from_public_key_der(&spki).unwrap();
            let secret = SymmetricCryptoKey::generate(rand::thread_rng());
            let encrypted =
                encrypt_rsa2048_oaep_sha1(&public_key, &secret.to_encoded()).unwrap();
            transport.push(TransportEvent::Message(PeerMessage::Control(
                ControlMessage::SetupEncryption {
                    app_id: APP_ID.to_owned(),
                    shared_secret: STANDARD.encode(encrypted),
                },
            )));
        };
        let (result, ()) = tokio::join!(send, peer);

        result.unwrap();
        assert_eq!(session.state().await, SessionState::Secure);
    }

    #[tokio::test]
    async fn test_stale_messages_are_dropped_without_dispatch() {
        let (session, transport, ui, account) = desktop_session();
        connect(&session, &transport).await;
        let secret = complete_handshake(&session, &transport).await;

        let stale = ReceiveMessage {
            command: ReceiveCommand::BiometricUnlock,
            timestamp: Utc::now().timestamp_millis() - 15_000,
            response: Some(BiometricUnlockResponse::Unlocked),
            key_b64: Some(SymmetricCryptoKey::generate(rand::thread_rng()).to_base64()),
        };
        push_app_message(
            &transport,
            APP_ID,
            AppPayload::Encrypted(encrypt_receive_message(&stale, &secret)),
        );
        settle().await;

        assert!(account.inner.installed_keys.lock().unwrap().is_empty());
        assert_eq!(ui.inner.unlocked.load(Ordering::SeqCst), 0);
        assert!(ui.dialogs().is_empty());
    }

    #[tokio::test]
    async fn test_app_traffic_for_another_install_is_ignored() {
        let (session, transport, ui, account) = desktop_session();
        connect(&session, &transport).await;
        let secret = complete_handshake(&session, &transport).await;

        let message = ReceiveMessage {
            command: ReceiveCommand::BiometricUnlock,
            timestamp: Utc::now().timestamp_millis(),
            response: Some(BiometricUnlockResponse::Unlocked),
            key_b64: Some(SymmetricCryptoKey::generate(rand::thread_rng()).to_base64()),
        };
        push_app_message(
            &transport,
            "another-install",
            AppPayload::Encrypted(encrypt_receive_message(&message, &secret)),
        );
        settle().await;

        assert!(account.inner.installed_keys.lock().unwrap().is_empty());
        assert_eq!(ui.inner.unlocked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_biometric_unlock_installs_and_verifies_the_key() {
        let (session, transport, ui, account) = desktop_session();
        connect(&session, &transport).await;
        let secret = complete_handshake(&session, &transport).await;

        let unlock_key = SymmetricCryptoKey::generate(rand::thread_rng());
        let message = ReceiveMessage {
            command: ReceiveCommand::BiometricUnlock,
            timestamp: Utc::now().timestamp_millis(),
            response: Some(BiometricUnlockResponse::Unlocked),
            key_b64: Some(unlock_key.to_base64()),
        };

        let response = session.get_response();
        let deliver = async {
            settle().await;
            push_app_message(
                &transport,
                APP_ID,
                AppPayload::Encrypted(encrypt_receive_message(&message, &secret)),
            );
        };
        let (received, ()) = tokio::join!(response, deliver);

        assert_eq!(received.unwrap(), message);
        assert_eq!(
            account.inner.installed_keys.lock().unwrap().as_slice(),
            &[unlock_key]
        );
        assert_eq!(ui.inner.unlocked.load(Ordering::SeqCst), 1);
        assert_eq!(account.inner.clear_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_biometric_unlock_with_wrong_users_key_is_rejected() {
        let (session, transport, ui, account) = desktop_session();
        account.inner.fail_verify.store(true, Ordering::SeqCst);
        connect(&session, &transport).await;
        let secret = complete_handshake(&session, &transport).await;

        let message = ReceiveMessage {
            command: ReceiveCommand::BiometricUnlock,
            timestamp: Utc::now().timestamp_millis(),
            response: Some(BiometricUnlockResponse::Unlocked),
            key_b64: Some(SymmetricCryptoKey::generate(rand::thread_rng()).to_base64()),
        };
        push_app_message(
            &transport,
            APP_ID,
            AppPayload::Encrypted(encrypt_receive_message(&message, &secret)),
        );
        settle().await;

        assert_eq!(account.inner.clear_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ui.dialogs(), vec![Dialog::wrong_user()]);
        assert_eq!(ui.inner.unlocked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_biometrics_not_enabled_surfaces_a_dialog() {
        let (session, transport, ui, _account) = desktop_session();
        connect(&session, &transport).await;
        let secret = complete_handshake(&session, &transport).await;

        let message = ReceiveMessage {
            command: ReceiveCommand::BiometricUnlock,
            timestamp: Utc::now().timestamp_millis(),
            response: Some(BiometricUnlockResponse::NotEnabled),
            key_b64: None,
        };
        push_app_message(
            &transport,
            APP_ID,
            AppPayload::Encrypted(encrypt_receive_message(&message, &secret)),
        );
        settle().await;

        assert_eq!(ui.dialogs(), vec![Dialog::biometrics_not_enabled()]);
    }

    #[tokio::test]
    async fn test_invalidate_encryption_resets_state_and_informs_user() {
        let (session, transport, ui, _account) = desktop_session();
        connect(&session, &transport).await;
        complete_handshake(&session, &transport).await;

        transport.push(TransportEvent::Message(PeerMessage::Control(
            ControlMessage::InvalidateEncryption {
                app_id: APP_ID.to_owned(),
            },
        )));
        settle().await;

        assert_eq!(session.state().await, SessionState::Disconnected);
        assert!(session.crypto.lock().await.shared_secret.is_none());
        assert_eq!(ui.dialogs(), vec![Dialog::invalid_encryption()]);
    }

    #[tokio::test]
    async fn test_verify_fingerprint_prompts_only_before_secret_exists() {
        let (session, transport, ui, _account) = desktop_session();
        connect(&session, &transport).await;

        let baseline = transport.outgoing().len();
        let send = session.send(Message::new(SendCommand::BiometricUnlock));
        let peer = async {
            let outgoing = wait_for_outgoing(&transport, baseline + 1).await;

            // Mid-handshake: the prompt should appear.
            transport.push(TransportEvent::Message(PeerMessage::Control(
                ControlMessage::VerifyFingerprint,
            )));
            settle().await;
            assert_eq!(ui.fingerprints().len(), 1);
            assert!(!ui.fingerprints()[0].is_empty());

            let OuterMessage {
                message: MessagePayload::Plain(setup),
                ..
            } = outgoing.last().unwrap().clone()
            else {
                panic!("expected the key-exchange message");
            };
            let spki = STANDARD.decode(setup.public_key.unwrap()).unwrap();
            let public_key = RsaPublicKey::from_public_key_der(&spki).unwrap();
            let secret = SymmetricCryptoKey::generate(rand::thread_rng());
            let encrypted =
                encrypt_rsa2048_oaep_sha1(&public_key, &secret.to_encoded()).unwrap();
            transport.push(TransportEvent::Message(PeerMessage::Control(
                ControlMessage::SetupEncryption {
                    app_id: APP_ID.to_owned(),
                    shared_secret: STANDARD.encode(encrypted),
                },
            )));
        };
        let (result, ()) = tokio::join!(send, peer);
        result.unwrap();

        // After the secret exists the prompt would be redundant.
        transport.push(TransportEvent::Message(PeerMessage::Control(
            ControlMessage::VerifyFingerprint,
        )));
        settle().await;

        assert_eq!(ui.fingerprints().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_user_id_surfaces_a_dialog() {
        let (session, transport, ui, _account) = desktop_session();
        connect(&session, &transport).await;

        transport.push(TransportEvent::Message(PeerMessage::Control(
            ControlMessage::WrongUserId,
        )));
        settle().await;

        assert_eq!(ui.dialogs(), vec![Dialog::wrong_user()]);
    }

    #[tokio::test]
    async fn test_write_failure_is_a_silent_disconnect() {
        let (session, transport, ui, _account) = bundled_session();
        session.connect().await.unwrap();

        transport.inner.fail_writes.store(true, Ordering::SeqCst);
        let result = session.send(Message::new(SendCommand::BiometricUnlock)).await;

        assert!(matches!(result, Err(ChannelError::Transport(_))));
        assert_eq!(session.state().await, SessionState::Disconnected);
        assert!(session.crypto.lock().await.shared_secret.is_none());
        assert_eq!(ui.dialogs(), vec![Dialog::invalid_encryption()]);
    }

    #[tokio::test]
    async fn test_bundled_peer_connects_without_a_peer_process() {
        let (session, _transport, _ui, _account) = bundled_session();

        session.connect().await.unwrap();

        assert_eq!(session.state().await, SessionState::Connected);
    }

    #[tokio::test]
    async fn test_bundled_peer_sends_plaintext_and_trusts_all_installs() {
        let (session, transport, _ui, _account) = bundled_session();
        session.connect().await.unwrap();

        session
            .send(Message::new(SendCommand::BiometricUnlock))
            .await
            .unwrap();

        let outgoing = transport.outgoing();
        let OuterMessage {
            message: MessagePayload::Plain(message),
            ..
        } = outgoing.last().unwrap().clone()
        else {
            panic!("bundled traffic must stay plaintext");
        };
        assert_eq!(message.command, SendCommand::BiometricUnlock);
        assert!(message.timestamp.is_some());

        // Inbound plaintext from any install is processed.
        let inbound = ReceiveMessage {
            command: ReceiveCommand::BiometricUnlock,
            timestamp: Utc::now().timestamp_millis(),
            response: Some(BiometricUnlockResponse::Canceled),
            key_b64: None,
        };
        let response = session.get_response();
        let deliver = async {
            settle().await;
            push_app_message(&transport, "some-other-install", AppPayload::Plain(inbound.clone()));
        };
        let (received, ()) = tokio::join!(response, deliver);
        assert_eq!(received.unwrap(), inbound);
    }

    #[tokio::test]
    async fn test_handshake_timeout_bounds_the_wait_when_configured() {
        let transport = TestTransport::default();
        let ui = TestUi::default();
        let account = TestAccount::default();
        let session = ChannelSession::new(
            transport.clone(),
            ui,
            account,
            ChannelSessionOptions {
                app_id: APP_ID.to_owned(),
                peer_mode: PeerMode::Desktop,
                handshake_timeout: Some(Duration::from_millis(100)),
            },
        );
        connect(&session, &transport).await;

        // The peer never answers the key exchange.
        let result = session.send(Message::new(SendCommand::BiometricUnlock)).await;

        assert!(matches!(result, Err(ChannelError::HandshakeTimeout)));
    }
}

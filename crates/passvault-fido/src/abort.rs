use tokio::sync::watch;

/// Requests cancellation of an in-flight authenticator operation.
///
/// Mirrors the browser `AbortController`/`AbortSignal` split: the caller
/// keeps the controller, the operation holds the signal and races it against
/// its own suspension points.
#[derive(Debug)]
pub struct AbortController {
    sender: watch::Sender<bool>,
}

/// The receiving half of an [`AbortController`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    receiver: watch::Receiver<bool>,
}

impl AbortController {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        AbortController { sender }
    }

    /// A signal tied to this controller. May be called multiple times.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Abort the associated operations. Takes effect for signals created
    /// before or after this call.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    /// Whether the controller has already aborted.
    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Suspend until the controller aborts. If the controller is dropped
    /// without aborting, this pends forever — cancellation can then no
    /// longer be requested.
    pub async fn aborted(&mut self) {
        if *self.receiver.borrow() {
            return;
        }
        while self.receiver.changed().await.is_ok() {
            if *self.receiver.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

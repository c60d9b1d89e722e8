use tokio::sync::oneshot;

/// Drop-to-cancel pairing: dropping the `CloseHandle` wakes whoever is
/// waiting on the `Closed` side.
pub(crate) fn close_pair() -> (CloseHandle, Closed) {
    let (tx, rx) = oneshot::channel();

    (CloseHandle { _tx: tx }, Closed { rx })
}

#[derive(Debug)]
pub(crate) struct CloseHandle {
    _tx: oneshot::Sender<()>,
}

pub(crate) struct Closed {
    rx: oneshot::Receiver<()>,
}

impl Closed {
    /// Resolves once the paired handle is gone. Must not be awaited again
    /// after it resolves.
    pub(crate) async fn recv(&mut self) {
        let _ = (&mut self.rx).await;
    }
}

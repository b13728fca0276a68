//! Single-assignment future cells.
//!
//! A [`Promise`] resolves exactly once; any number of [`FutureValue`]
//! clones observe the value, including subscribers that arrive after
//! resolution. Registries and the work queue both signal completion
//! through these cells.

use tokio::sync::watch;

/// Write side of a future cell. Consumed by [`Promise::set`], so a value
/// can only ever be installed once.
pub struct Promise<T> {
    tx: watch::Sender<Option<T>>,
}

/// Read side of a future cell. Cheap to clone; every clone observes the
/// same resolution.
#[derive(Clone)]
pub struct FutureValue<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Promise<T> {
    /// Create a linked promise/future pair.
    pub fn channel() -> (Promise<T>, FutureValue<T>) {
        let (tx, rx) = watch::channel(None);
        (Promise { tx }, FutureValue { rx })
    }

    /// Resolve the future.
    pub fn set(self, value: T) {
        // Waiters may all have gone away; resolution is still valid for
        // late subscribers holding a FutureValue clone.
        let _ = self.tx.send(Some(value));
    }
}

impl<T: Clone> FutureValue<T> {
    /// Wait for resolution.
    ///
    /// A promise dropped unresolved never resolves; waiters stay pending
    /// indefinitely and timeout policy belongs to the caller.
    pub async fn wait(&self) -> T {
        let mut rx = self.rx.clone();
        loop {
            // Clone the value out before awaiting; the borrow guard must
            // not live across a suspension point.
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                return value;
            }
            if rx.changed().await.is_err() {
                // Sender dropped. Either it resolved first or it never
                // will.
                let current = rx.borrow().clone();
                match current {
                    Some(value) => return value,
                    None => std::future::pending::<()>().await,
                }
            }
        }
    }

    /// Resolved value, if available, without waiting.
    pub fn peek(&self) -> Option<T> {
        self.rx.borrow().clone()
    }
}

use tokio::sync::watch;

/// Capability interface over a platform connectivity signal.
///
/// The manager never checks for the presence of a connectivity library at
/// runtime; callers without one construct a [`NoopConnectivity`] instead.
pub trait ConnectivityObserver: Send + Sync {
    /// Current reachability of the upload backend.
    fn is_available(&self) -> bool;

    /// A watch stream of reachability changes.
    fn watch(&self) -> watch::Receiver<bool>;
}

/// Always-online observer for callers without a connectivity source.
pub struct NoopConnectivity {
    tx: watch::Sender<bool>,
}

impl NoopConnectivity {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }
}

impl Default for NoopConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityObserver for NoopConnectivity {
    fn is_available(&self) -> bool {
        true
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Observer fed externally through a watch channel — the bridge for
/// platform network monitors (and for tests).
pub struct WatchConnectivity {
    tx: watch::Sender<bool>,
}

impl WatchConnectivity {
    pub fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Pushes a reachability change to all watchers.
    pub fn set_available(&self, available: bool) {
        // send_replace never fails; it works with zero receivers too.
        self.tx.send_replace(available);
    }
}

impl ConnectivityObserver for WatchConnectivity {
    fn is_available(&self) -> bool {
        *self.tx.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

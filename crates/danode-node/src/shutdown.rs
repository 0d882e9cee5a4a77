use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Receiving side of the node's cancellation signal.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been requested, or the registry is gone.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Named background tasks sharing one cancellation signal.
///
/// Tasks are expected to watch their [`ShutdownSignal`] and return on their
/// own; [`BackgroundTasks::shutdown`] waits for every one of them.
#[derive(Debug)]
pub struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_tx.subscribe(),
        }
    }

    pub fn spawn<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        self.handles.lock().expect("lock poisoned").push((name, handle));
    }

    /// Number of tasks spawned and not yet joined.
    pub fn len(&self) -> usize {
        self.handles.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire the cancellation signal and wait for every task to return.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handles: Vec<_> = self.handles.lock().expect("lock poisoned").drain(..).collect();
        for (name, handle) in handles {
            match handle.await {
                Ok(()) => debug!(task = name, "background task stopped"),
                Err(e) => warn!(task = name, error = %e, "background task ended abnormally"),
            }
        }
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Ok(mut handles) = self.handles.lock() {
            for (_, handle) in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_joins_cooperating_tasks() {
        let tasks = BackgroundTasks::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let mut signal = tasks.signal();
        let flag = stopped.clone();
        tasks.spawn("waiter", async move {
            signal.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(tasks.len(), 1);

        tasks.shutdown().await;
        assert!(stopped.load(Ordering::SeqCst));
        assert!(tasks.is_empty());
        assert!(tasks.signal().is_cancelled());
    }

    #[tokio::test]
    async fn signal_taken_after_shutdown_resolves_immediately() {
        let tasks = BackgroundTasks::new();
        tasks.shutdown().await;
        let mut late = tasks.signal();
        late.cancelled().await;
    }
}

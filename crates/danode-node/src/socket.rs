use std::sync::Arc;
use std::time::Duration;

use danode_types::{OperatorId, OperatorSocket};
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::collaborators::{PublicIpProvider, SocketEventSource, Transactor};
use crate::error::NodeResult;
use crate::metrics::Metrics;
use crate::shutdown::ShutdownSignal;

/// Owner of the socket this operator advertises.
///
/// Every writer (startup registration, the on-chain watcher and the public IP
/// poller) goes through the one lock, and the on-chain update in
/// [`SocketReconciler::update_socket_address`] happens while it is held.
pub struct SocketReconciler {
    operator: OperatorId,
    dispersal_port: u16,
    retrieval_port: u16,
    current: Mutex<Option<OperatorSocket>>,
    transactor: Arc<dyn Transactor>,
    metrics: Arc<dyn Metrics>,
}

impl SocketReconciler {
    pub fn new(
        operator: OperatorId,
        dispersal_port: u16,
        retrieval_port: u16,
        transactor: Arc<dyn Transactor>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        Self {
            operator,
            dispersal_port,
            retrieval_port,
            current: Mutex::new(None),
            transactor,
            metrics,
        }
    }

    pub async fn current_socket(&self) -> Option<OperatorSocket> {
        self.current.lock().await.clone()
    }

    /// Set the socket announced at registration.
    pub async fn set_registered(&self, socket: OperatorSocket) {
        info!(socket = %socket, "operator socket set");
        *self.current.lock().await = Some(socket);
    }

    /// Adopt a socket seen on chain. Returns `true` if it replaced the current one.
    pub async fn observe_onchain(&self, socket: OperatorSocket) -> bool {
        let mut current = self.current.lock().await;
        if current.as_ref() == Some(&socket) {
            return false;
        }
        info!(socket = %socket, "adopting socket from chain");
        *current = Some(socket);
        true
    }

    /// Push `socket` on chain if it differs from the current one, then adopt it.
    ///
    /// Returns `Ok(false)` when nothing changed. On error the current socket is
    /// left untouched.
    pub async fn update_socket_address(&self, socket: OperatorSocket) -> NodeResult<bool> {
        let mut current = self.current.lock().await;
        if current.as_ref() == Some(&socket) {
            return Ok(false);
        }
        self.transactor
            .update_operator_socket(&self.operator, &socket)
            .await?;
        info!(
            old = ?current.as_ref().map(ToString::to_string),
            new = %socket,
            "updated operator socket on chain"
        );
        *current = Some(socket);
        self.metrics.record_socket_address_change();
        Ok(true)
    }

    /// Rebuild the socket from the public IP and reconcile it.
    pub async fn check_public_ip(&self, provider: &dyn PublicIpProvider) -> NodeResult<bool> {
        let ip = provider.public_ip().await?;
        let socket = OperatorSocket::new(ip, self.dispersal_port, self.retrieval_port);
        self.update_socket_address(socket).await
    }

    /// Follow on-chain socket events until shutdown or the stream ends.
    pub async fn watch_onchain(
        self: Arc<Self>,
        source: Arc<dyn SocketEventSource>,
        mut shutdown: ShutdownSignal,
    ) {
        let mut events = match source.watch_operator_socket(&self.operator).await {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "failed to subscribe to socket updates");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(socket) => {
                        self.observe_onchain(socket).await;
                    }
                    None => {
                        warn!("socket update stream closed");
                        break;
                    }
                },
            }
        }
        debug!("on-chain socket watcher stopped");
    }

    /// Check the public IP every `interval` until shutdown. Failures are
    /// logged and retried on the next tick.
    pub async fn poll_public_ip(
        self: Arc<Self>,
        provider: Arc<dyn PublicIpProvider>,
        interval: Duration,
        mut shutdown: ShutdownSignal,
    ) {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.check_public_ip(provider.as_ref()).await {
                        warn!(error = %e, "socket address check failed");
                    }
                }
            }
        }
        debug!("public IP poller stopped");
    }
}

//! Peer transport seam.
//!
//! The dispatcher only needs one operation: hand a sealed packet to a pool
//! and get back a promise for that pool's acknowledgement. Rejection is
//! synchronous; a rejected send is logged by the caller and never counts
//! toward the aggregate. The TCP transport lives with the socket layer;
//! this crate ships a channel-backed implementation used by tests and
//! single-process deployments.

use crate::{PeerPromise, PoolId};
use rpt_core::Pkg;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no server available for pool {0}")]
    PoolUnavailable(PoolId),

    #[error("connection to pool {0} is closed")]
    ChannelClosed(PoolId),
}

pub trait PoolTransport: Send + Sync {
    /// Ship `pkg` to `pool`. On acceptance the returned promise resolves
    /// with the peer's reply packet.
    ///
    /// # Errors
    /// Returns an error when the pool has no reachable server; the packet
    /// is dropped and the caller must not expect a reply.
    fn send_to_pool(&self, pool: PoolId, pkg: Pkg) -> Result<PeerPromise, TransportError>;
}

/// One in-flight request handed to a pool's server loop.
#[derive(Debug)]
pub struct PoolRequest {
    pub pkg: Pkg,
    pub reply: oneshot::Sender<Pkg>,
}

struct PoolChannel {
    server: String,
    tx: mpsc::UnboundedSender<PoolRequest>,
}

/// Channel-backed transport: each registered pool is an mpsc queue drained
/// by that pool's server task.
#[derive(Default)]
pub struct ChannelTransport {
    pools: Vec<Option<PoolChannel>>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool and return the receiving end for its server loop.
    pub fn register_pool(
        &mut self,
        pool: PoolId,
        server: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<PoolRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        let idx = pool as usize;
        if self.pools.len() <= idx {
            self.pools.resize_with(idx + 1, || None);
        }
        self.pools[idx] = Some(PoolChannel {
            server: server.into(),
            tx,
        });
        rx
    }
}

impl PoolTransport for ChannelTransport {
    fn send_to_pool(&self, pool: PoolId, pkg: Pkg) -> Result<PeerPromise, TransportError> {
        let channel = self
            .pools
            .get(pool as usize)
            .and_then(Option::as_ref)
            .ok_or(TransportError::PoolUnavailable(pool))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        channel
            .tx
            .send(PoolRequest {
                pkg,
                reply: reply_tx,
            })
            .map_err(|_| TransportError::ChannelClosed(pool))?;

        Ok(PeerPromise {
            server: channel.server.clone(),
            rx: reply_rx,
        })
    }
}

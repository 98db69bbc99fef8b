//! Per-peer acknowledgement aggregation.
//!
//! The dispatcher registers one promise per peer send that the transport
//! accepted; sends the transport rejected never count. `collect` resolves
//! every promise under an individual timeout, so one stalled peer cannot
//! hold the client response hostage forever, and a timed-out peer simply
//! contributes a missing reply which the completion path treats as an
//! error.

use rpt_core::Pkg;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;

/// One outstanding peer acknowledgement.
#[derive(Debug)]
pub struct PeerPromise {
    pub server: String,
    pub rx: oneshot::Receiver<Pkg>,
}

/// A resolved promise: the reply is `None` on timeout or a dropped peer.
#[derive(Debug)]
pub struct PromiseReply {
    pub server: String,
    pub pkg: Option<Pkg>,
}

/// Collects promises for one insert job.
pub struct PromiseSet {
    promises: Vec<PeerPromise>,
    timeout: Duration,
}

impl PromiseSet {
    #[must_use]
    pub fn new(expected: usize, timeout: Duration) -> Self {
        Self {
            promises: Vec::with_capacity(expected),
            timeout,
        }
    }

    #[inline]
    pub fn push(&mut self, promise: PeerPromise) {
        self.promises.push(promise);
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.promises.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.promises.is_empty()
    }

    /// Await every registered promise. Completes once all replies are in
    /// or timed out; order follows registration order.
    pub async fn collect(self) -> Vec<PromiseReply> {
        let timeout = self.timeout;
        let mut replies = Vec::with_capacity(self.promises.len());
        for promise in self.promises {
            let pkg = match tokio::time::timeout(timeout, promise.rx).await {
                Ok(Ok(pkg)) => Some(pkg),
                Ok(Err(_)) => {
                    warn!(
                        target: "riptide::dispatch",
                        server = %promise.server,
                        "Peer dropped the acknowledgement channel"
                    );
                    None
                },
                Err(_) => {
                    warn!(
                        target: "riptide::dispatch",
                        server = %promise.server,
                        timeout_ms = timeout.as_millis() as u64,
                        "Peer acknowledgement timed out"
                    );
                    None
                },
            };
            replies.push(PromiseReply {
                server: promise.server,
                pkg,
            });
        }
        replies
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::PeerProto;

    fn ack() -> Pkg {
        Pkg::new(0, PeerProto::AckInsert as u8, 0, &[])
    }

    #[tokio::test]
    async fn test_collect_all_acks() {
        let mut set = PromiseSet::new(2, Duration::from_millis(200));
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        set.push(PeerPromise {
            server: "pool-1".into(),
            rx: rx1,
        });
        set.push(PeerPromise {
            server: "pool-2".into(),
            rx: rx2,
        });

        tx1.send(ack()).unwrap();
        tx2.send(ack()).unwrap();

        let replies = set.collect().await;
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|r| r.pkg.is_some()));
        assert_eq!(replies[0].server, "pool-1");
    }

    #[tokio::test]
    async fn test_collect_timeout_yields_missing_reply() {
        let mut set = PromiseSet::new(1, Duration::from_millis(20));
        let (tx, rx) = oneshot::channel::<Pkg>();
        set.push(PeerPromise {
            server: "pool-9".into(),
            rx,
        });

        let replies = set.collect().await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].pkg.is_none());
        drop(tx);
    }

    #[tokio::test]
    async fn test_collect_dropped_sender_yields_missing_reply() {
        let mut set = PromiseSet::new(1, Duration::from_millis(200));
        let (tx, rx) = oneshot::channel::<Pkg>();
        drop(tx);
        set.push(PeerPromise {
            server: "pool-3".into(),
            rx,
        });

        let replies = set.collect().await;
        assert!(replies[0].pkg.is_none());
    }

    #[tokio::test]
    async fn test_collect_empty_set() {
        let set = PromiseSet::new(0, Duration::from_millis(10));
        assert!(set.is_empty());
        assert!(set.collect().await.is_empty());
    }
}

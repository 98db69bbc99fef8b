//! Replica hook: every local write is mirrored to the pool's other server
//! through a durable fifo. The fifo drain loop and the initial-sync
//! machinery live with the replication subsystem; the write path only
//! needs to enqueue packets and to know whether an initial sync is busy.

use crate::InsertFlags;
use crossbeam::queue::ArrayQueue;
use rpt_cluster::PeerProto;
use rpt_core::Pkg;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

pub struct Replica {
    server_name: String,
    initsync_active: AtomicBool,
    fifo: ArrayQueue<Pkg>,
}

impl Replica {
    #[must_use]
    pub fn new(server_name: impl Into<String>, fifo_capacity: usize) -> Self {
        Self {
            server_name: server_name.into(),
            initsync_active: AtomicBool::new(false),
            fifo: ArrayQueue::new(fifo_capacity.max(1)),
        }
    }

    #[inline]
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    #[inline]
    #[must_use]
    pub fn initsync_idle(&self) -> bool {
        !self.initsync_active.load(Ordering::Acquire)
    }

    pub fn set_initsync_active(&self, active: bool) {
        self.initsync_active.store(active, Ordering::Release);
    }

    /// Queue a packet for the replica. A full fifo loses the packet; the
    /// drain loop alarms on the gap during its next catch-up.
    pub fn enqueue(&self, pkg: Pkg) {
        if self.fifo.push(pkg).is_err() {
            error!(
                target: "riptide::replica",
                server = %self.server_name,
                capacity = self.fifo.capacity(),
                "Replica fifo is full, dropping packet"
            );
        }
    }

    #[inline]
    #[must_use]
    pub fn queued(&self) -> usize {
        self.fifo.len()
    }

    #[must_use]
    pub fn pop(&self) -> Option<Pkg> {
        self.fifo.pop()
    }

    /// Re-tag an insert body for the replica while an initial sync is
    /// running. Series-level filtering against the sync watermark belongs
    /// to the replication subsystem; an empty body yields nothing.
    #[must_use]
    pub fn filter(&self, body: &[u8], flags: InsertFlags) -> Option<Pkg> {
        if body.len() <= 1 {
            warn!(
                target: "riptide::replica",
                server = %self.server_name,
                "Refusing to queue an empty insert body"
            );
            return None;
        }
        let tp = if flags.tested() {
            PeerProto::InsertTestedServer
        } else {
            PeerProto::InsertTestServer
        };
        Some(Pkg::new(0, tp as u8, flags.bits(), body))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_pop_order() {
        let replica = Replica::new("ts-a1", 8);
        replica.enqueue(Pkg::new(1, PeerProto::InsertServer as u8, 0, b"a"));
        replica.enqueue(Pkg::new(2, PeerProto::InsertServer as u8, 0, b"b"));
        assert_eq!(replica.queued(), 2);

        assert_eq!(replica.pop().unwrap().request_id(), 1);
        assert_eq!(replica.pop().unwrap().request_id(), 2);
        assert!(replica.pop().is_none());
    }

    #[test]
    fn test_full_fifo_drops() {
        let replica = Replica::new("ts-a1", 1);
        replica.enqueue(Pkg::new(1, PeerProto::InsertServer as u8, 0, b"a"));
        replica.enqueue(Pkg::new(2, PeerProto::InsertServer as u8, 0, b"b"));
        assert_eq!(replica.queued(), 1);
        assert_eq!(replica.pop().unwrap().request_id(), 1);
    }

    #[test]
    fn test_filter_rejects_empty_body() {
        let replica = Replica::new("ts-a1", 8);
        assert!(replica.filter(&[0xF0], InsertFlags::default()).is_none());
    }

    #[test]
    fn test_filter_tags_by_flags() {
        let replica = Replica::new("ts-a1", 8);
        let body = [0xF0, 0xD0, 0x01, 0x00, 0x00, 0x00, b'x'];

        let pkg = replica.filter(&body, InsertFlags::default()).unwrap();
        assert_eq!(PeerProto::from(pkg.tp()), PeerProto::InsertTestServer);

        let tested = InsertFlags::new(InsertFlags::TESTED);
        let pkg = replica.filter(&body, tested).unwrap();
        assert_eq!(PeerProto::from(pkg.tp()), PeerProto::InsertTestedServer);
    }

    #[test]
    fn test_initsync_toggle() {
        let replica = Replica::new("ts-a1", 8);
        assert!(replica.initsync_idle());
        replica.set_initsync_active(true);
        assert!(!replica.initsync_idle());
    }
}

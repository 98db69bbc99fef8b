//! Re-index forwarding.
//!
//! While a re-index is in flight, the test variant of the local apply runs
//! into series this node no longer owns. Those series are not decoded and
//! re-encoded; their `name + points` TBF fragments are spliced verbatim
//! into one buffer per destination pool and shipped as a second async task
//! once the apply's lock scope has ended.

use crate::{PeerProto, PoolMap, PoolTransport, PromiseSet};
use rpt_core::{FramedPacker, PACKER_SUGGESTED_SIZE};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub struct ForwardJob {
    packers: Vec<FramedPacker>,
    nseries: usize,
}

impl ForwardJob {
    /// Allocate one buffer per pool. The buffer count is frozen at
    /// creation, like the insert job's.
    #[must_use]
    pub fn new(pools: &Arc<PoolMap>) -> Self {
        let capacity = PACKER_SUGGESTED_SIZE / (usize::from(pools.pool_count()) / 4 + 1);
        let packers = (0..pools.pool_count())
            .map(|_| {
                let mut packer = FramedPacker::with_capacity(capacity);
                packer.add_map_open();
                packer
            })
            .collect();
        Self {
            packers,
            nseries: 0,
        }
    }

    /// Splice one series verbatim: the name followed by its already-encoded
    /// points array.
    pub fn add_series(&mut self, pool: u16, name: &[u8], points_fragment: &[u8]) {
        let packer = &mut self.packers[pool as usize];
        packer.add_raw(name);
        packer.extend_fragment(points_fragment);
        self.nseries += 1;
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nseries == 0
    }

    /// Post the shipment task. Per-pool results are logged; forwarding has
    /// no client to answer, so failures are not surfaced further.
    pub fn ship(self, transport: Arc<dyn PoolTransport>, ack_timeout: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut promises = PromiseSet::new(self.packers.len(), ack_timeout);
            for (n, packer) in self.packers.into_iter().enumerate() {
                if packer.is_empty_body() {
                    continue;
                }
                let pkg = packer.into_pkg(0, PeerProto::InsertTestPool as u8, 0);
                match transport.send_to_pool(n as u16, pkg) {
                    Ok(promise) => promises.push(promise),
                    Err(e) => {
                        error!(
                            target: "riptide::forward",
                            pool = n,
                            error = %e,
                            "Cannot forward re-routed series to pool"
                        );
                    },
                }
            }

            let replies = promises.collect().await;
            for reply in &replies {
                match &reply.pkg {
                    Some(pkg) if PeerProto::from(pkg.tp()) == PeerProto::AckInsert => {
                        debug!(
                            target: "riptide::forward",
                            server = %reply.server,
                            "Forwarded series acknowledged"
                        );
                    },
                    _ => {
                        error!(
                            target: "riptide::forward",
                            server = %reply.server,
                            "No acknowledgement for forwarded series"
                        );
                    },
                }
            }
            info!(
                target: "riptide::forward",
                pools = replies.len(),
                "Forward shipment finished"
            );
        })
    }

    #[cfg(test)]
    pub(crate) fn packer_body(&self, pool: u16) -> &[u8] {
        self.packers[pool as usize].body()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ChannelTransport;
    use rpt_core::{Packer, Token, Unpacker};

    fn points_fragment() -> Vec<u8> {
        let mut p = Packer::new();
        p.add_array_open();
        p.add_array2();
        p.add_int(10);
        p.add_int(1);
        p.add_array_close();
        p.into_inner()
    }

    #[test]
    fn test_fragment_spliced_verbatim() {
        let pools = Arc::new(PoolMap::new(2, 0, 0));
        let mut job = ForwardJob::new(&pools);
        assert!(job.is_empty());

        let fragment = points_fragment();
        job.add_series(1, b"x", &fragment);
        assert!(!job.is_empty());

        let mut up = Unpacker::new(job.packer_body(1));
        assert_eq!(up.next(), Token::MapOpen);
        assert_eq!(up.next(), Token::Raw(b"x"));
        let start = up.pos();
        up.skip_next();
        assert_eq!(up.fragment_since(start), fragment.as_slice());
    }

    #[tokio::test]
    async fn test_ship_sends_only_nonempty_buffers() {
        let pools = Arc::new(PoolMap::new(3, 0, 0));
        let mut transport = ChannelTransport::new();
        let mut rx1 = transport.register_pool(1, "ts-b0");
        let mut rx2 = transport.register_pool(2, "ts-c0");
        let transport: Arc<dyn PoolTransport> = Arc::new(transport);

        let mut job = ForwardJob::new(&pools);
        job.add_series(2, b"x", &points_fragment());

        let responder = tokio::spawn(async move {
            let request = rx2.recv().await.unwrap();
            assert_eq!(PeerProto::from(request.pkg.tp()), PeerProto::InsertTestPool);
            request
                .reply
                .send(rpt_core::Pkg::new(0, PeerProto::AckInsert as u8, 0, &[]))
                .unwrap();
        });

        job.ship(transport, Duration::from_millis(200))
            .await
            .unwrap();
        responder.await.unwrap();

        // Pool 1 never saw a packet.
        assert!(rx1.try_recv().is_err());
    }
}

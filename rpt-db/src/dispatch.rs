//! Insert dispatch: split the repacked pool buffers into {local, peers},
//! ship the peer buffers, apply the local one, and answer the client once
//! every peer acknowledgement is in.

use crate::{apply_local, Database, InsertFlags, InsertJob};
use rpt_cluster::{ClientProto, PeerProto, PoolTransport, PromiseReply, PromiseSet};
use rpt_core::{FramedPacker, Pkg};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Where the aggregate response goes. The insert job holds the sink for
/// its whole lifetime, which keeps the client connection pinned until the
/// response is out; the transport layer maps this onto its socket locks.
pub trait ClientSink: Send + Sync {
    fn send(&self, pkg: Pkg);
}

/// Entry point for one client insert packet: allocate the job, decode and
/// repack the payload, then either post the dispatch task or answer the
/// client with the validation error. Decode failures never touch storage.
pub fn handle_insert(
    db: &Arc<Database>,
    transport: &Arc<dyn PoolTransport>,
    client: Arc<dyn ClientSink>,
    request_id: u32,
    payload: &[u8],
) -> Option<JoinHandle<()>> {
    let mut job = InsertJob::new(db, request_id, Arc::clone(&client));
    match job.assign_pools(db, payload) {
        Ok(npoints) => {
            info!(
                target: "riptide::insert",
                request_id,
                npoints,
                "Insert repacked, posting dispatch"
            );
            Some(spawn_dispatch(Arc::clone(db), Arc::clone(transport), job))
        },
        Err(err) => {
            warn!(
                target: "riptide::insert",
                request_id,
                error = %err,
                "Rejected insert"
            );
            let mut packer = FramedPacker::with_capacity(256);
            packer.add_map_open();
            packer.add_raw(b"error_msg");
            packer.add_raw(err.to_string().as_bytes());
            client.send(packer.into_pkg(request_id, ClientProto::ErrInsert as u8, 0));
            None
        },
    }
}

/// Post the dispatch task for a repacked job.
pub fn spawn_dispatch(
    db: Arc<Database>,
    transport: Arc<dyn PoolTransport>,
    job: InsertJob,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        dispatch(db, transport, job).await;
    })
}

/// Drive one repacked insert to its aggregate response.
pub async fn dispatch(db: Arc<Database>, transport: Arc<dyn PoolTransport>, job: InsertJob) {
    let InsertJob {
        request_id,
        client,
        flags,
        npoints,
        packers,
        pools,
    } = job;

    let own = pools.own_pool_id();
    let expected = usize::from(pools.pool_count().saturating_sub(1));
    let mut promises = PromiseSet::new(expected, db.peer_ack_timeout());

    for (n, packer) in packers.into_iter().enumerate() {
        let n = n as u16;
        if packer.is_empty_body() {
            continue;
        }

        if n == own {
            apply_own_pool(&db, &transport, packer, flags);
        } else {
            let tp = if flags.test() {
                PeerProto::InsertTestPool
            } else {
                PeerProto::InsertPool
            };
            let pkg = packer.into_pkg(0, tp as u8, flags.bits());
            match transport.send_to_pool(n, pkg) {
                Ok(promise) => promises.push(promise),
                // A rejected send is dropped here and never counts toward
                // the aggregate.
                Err(e) => {
                    error!(
                        target: "riptide::dispatch",
                        pool = n,
                        error = %e,
                        "Every pool had a reachable server when this insert was \
                         accepted, but points can no longer be sent to pool"
                    );
                },
            }
        }
    }

    let replies = promises.collect().await;
    on_response(&db, client.as_ref(), request_id, npoints, &replies);
}

/// Own-pool branch: mirror to the replica when one exists, then apply
/// locally. While the replica's initial sync is busy the body goes
/// through the replica's filter instead of being re-tagged directly.
fn apply_own_pool(
    db: &Database,
    transport: &Arc<dyn PoolTransport>,
    packer: FramedPacker,
    flags: InsertFlags,
) {
    match db.replica() {
        Some(replica) => {
            let pkg = if replica.initsync_idle() {
                Some(packer.into_pkg(0, server_tag(flags) as u8, flags.bits()))
            } else {
                replica.filter(packer.body(), flags)
            };
            if let Some(pkg) = pkg {
                replica.enqueue(pkg.clone());
                apply_local(db, transport, pkg.body(), flags);
            }
        },
        None => apply_local(db, transport, packer.body(), flags),
    }
}

const fn server_tag(flags: InsertFlags) -> PeerProto {
    if flags.test() {
        PeerProto::InsertTestServer
    } else if flags.tested() {
        PeerProto::InsertTestedServer
    } else {
        PeerProto::InsertServer
    }
}

/// Completion: collapse the peer replies and the fault signal into one
/// client response under the original request id.
fn on_response(
    db: &Database,
    client: &dyn ClientSink,
    request_id: u32,
    npoints: usize,
    replies: &[PromiseReply],
) {
    let mut failure: Option<String> = None;

    if db.fault().is_raised() {
        failure = Some(format!(
            "Critical error occurred on '{}'",
            db.server_name()
        ));
    } else {
        for reply in replies {
            let acked = matches!(
                &reply.pkg,
                Some(pkg) if PeerProto::from(pkg.tp()) == PeerProto::AckInsert
            );
            if !acked {
                failure = Some(format!(
                    "Error occurred while sending points to at least '{}'",
                    reply.server
                ));
                break;
            }
        }
    }

    let mut packer = FramedPacker::with_capacity(256);
    packer.add_map_open();

    let (tp, msg) = match failure {
        Some(msg) => {
            error!(target: "riptide::dispatch", request_id, %msg, "Insert failed");
            packer.add_raw(b"error_msg");
            (ClientProto::ErrInsert, msg)
        },
        None => {
            let msg = format!("Inserted {npoints} point(s) successfully.");
            info!(target: "riptide::dispatch", request_id, npoints, "Insert completed");
            db.add_received_points(npoints as u64);
            packer.add_raw(b"success_msg");
            (ClientProto::ResInsert, msg)
        },
    };
    packer.add_raw(msg.as_bytes());

    client.send(packer.into_pkg(request_id, tp as u8, 0));
}

//! Local apply: feed one pool buffer into the series index and the shard
//! store.
//!
//! Both variants hold the series and shards mutexes, acquired through the
//! database's single lock helper, for the whole buffer; points for one
//! series therefore reach the storage engine exactly in the order the
//! client submitted them. Every series and point step first observes the
//! fault signal so a critical failure unwinds without touching the engine
//! again.
//!
//! The test variant runs while a re-index is (or may be) in flight: a
//! series this node no longer owns is either created here (new owner),
//! skipped (the replica forwards it), or spliced verbatim into a forward
//! job that ships after the lock scope ends.

use crate::{Database, InsertFlags, Series, WriteGuard};
use bytes::Bytes;
use rpt_cluster::{server_id, ForwardJob, PoolTransport};
use rpt_core::{Token, Unpacker, Value, ValueType};
use std::sync::Arc;
use tracing::error;

/// Apply one pool buffer locally, choosing the variant from the job flags
/// and the live re-index state. A body tagged as already tested is never
/// re-routed.
pub fn apply_local(
    db: &Database,
    transport: &Arc<dyn PoolTransport>,
    body: &[u8],
    flags: InsertFlags,
) {
    if flags.test() || (db.pools().is_reindexing() && !flags.tested()) {
        apply_test(db, transport, body);
    } else {
        apply_plain(db, body);
    }
}

fn apply_plain(db: &Database, body: &[u8]) {
    let fault = db.fault().clone();
    let mut guard = db.write_lock();
    let mut up = Unpacker::new(body);

    up.next(); // map open
    let mut tok = up.next();

    while !fault.is_raised() {
        let Token::Raw(name) = tok else { break };

        let Some(value_type) = peek_first_value_type(&mut up) else {
            error!(
                target: "riptide::insert",
                series = %String::from_utf8_lossy(name),
                "Malformed points in local apply"
            );
            fault.raise();
            break;
        };
        let series = guard.series.get_or_create(name, value_type);

        match apply_points(&mut guard, series, &mut up, &fault) {
            Some(next) => tok = next,
            None => break,
        }
    }
}

fn apply_test(db: &Database, transport: &Arc<dyn PoolTransport>, body: &[u8]) {
    let pools = db.pools();
    let fault = db.fault().clone();
    let replica = db.replica();
    let mut forward = ForwardJob::new(&pools);

    {
        let mut guard = db.write_lock();
        let mut up = Unpacker::new(body);

        up.next(); // map open
        let mut tok = up.next();

        while !fault.is_raised() {
            let Token::Raw(name) = tok else { break };

            let series = match guard.series.get(name) {
                Some(series) => series,
                None => {
                    let pool = pools.lookup(name);
                    if pool == pools.own_pool_id() {
                        // The re-index moved this series to us: create it.
                        let Some(value_type) = peek_first_value_type(&mut up) else {
                            error!(
                                target: "riptide::insert",
                                series = %String::from_utf8_lossy(name),
                                "Malformed points in test apply"
                            );
                            fault.raise();
                            break;
                        };
                        guard.series.get_or_create(name, value_type)
                    } else if replica.is_none() || server_id(name) == pools.own_server_id() {
                        // This server carries the forwarding duty: splice
                        // the series verbatim for its owning pool.
                        let start = up.pos();
                        up.skip_next();
                        forward.add_series(pool, name, up.fragment_since(start));
                        tok = up.next();
                        continue;
                    } else {
                        // The replica forwards this one.
                        up.skip_next();
                        tok = up.next();
                        continue;
                    }
                },
            };

            match apply_points(&mut guard, series, &mut up, &fault) {
                Some(next) => tok = next,
                None => break,
            }
        }
    }

    if !forward.is_empty() && !fault.is_raised() {
        forward.ship(Arc::clone(transport), db.peer_ack_timeout());
    }
}

/// Read the first value of the upcoming points array without consuming it.
fn peek_first_value_type(up: &mut Unpacker) -> Option<ValueType> {
    let saved = up.pos();
    if up.next() != Token::ArrayOpen || up.next() != Token::Array2 {
        return None;
    }
    let Token::Int(_) = up.next() else { return None };
    let value_type = match up.next() {
        Token::Int(_) => ValueType::Int,
        Token::Double(_) => ValueType::Float,
        Token::Raw(_) => ValueType::Raw,
        _ => return None,
    };
    up.set_pos(saved);
    Some(value_type)
}

/// Feed one points array into the storage engine. Returns the token
/// following the array, or `None` when the apply must stop (the fault
/// signal is raised for malformed input and storage failures).
fn apply_points<'a>(
    guard: &mut WriteGuard<'_>,
    series: Series,
    up: &mut Unpacker<'a>,
    fault: &rpt_core::FaultSignal,
) -> Option<Token<'a>> {
    if up.next() != Token::ArrayOpen {
        fault.raise();
        return None;
    }
    let mut tok = up.next();
    if tok != Token::Array2 {
        fault.raise();
        return None;
    }

    while tok == Token::Array2 {
        if fault.is_raised() {
            return None;
        }
        let Token::Int(ts) = up.next() else {
            fault.raise();
            return None;
        };
        let Some(value) = token_value(up.next()) else {
            fault.raise();
            return None;
        };
        if let Err(e) = guard.shards.add_point(&series, ts, &value) {
            error!(
                target: "riptide::insert",
                series_id = series.id,
                error = %e,
                "Storage engine rejected a point"
            );
            fault.raise();
            return None;
        }
        tok = up.next();
    }

    if tok == Token::ArrayClose {
        tok = up.next();
    }
    Some(tok)
}

fn token_value(tok: Token<'_>) -> Option<Value> {
    match tok {
        Token::Int(v) => Some(Value::Int(v)),
        Token::Double(v) => Some(Value::Float(v)),
        Token::Raw(v) => Some(Value::Raw(Bytes::copy_from_slice(v))),
        _ => None,
    }
}

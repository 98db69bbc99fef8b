//! Insert decoding and repacking.
//!
//! A client batch arrives as one TBF document, either a map of
//! `series name -> points` or an array of `{name, points}` records. The
//! decoder walks the stream once, validates every point, routes each
//! series to its pool and streams the points straight into that pool's
//! output buffer; there is no per-point allocation. Array-form records
//! may put `points` before `name`, in which case the points are decoded
//! into a scratch buffer and flushed once the name resolves to a pool.

use crate::{route_series, ClientSink, Database};
use rpt_cluster::{PoolId, PoolMap};
use rpt_core::{FramedPacker, Packer, Token, Unpacker, SERIES_NAME_MAX};
use std::sync::Arc;
use thiserror::Error;

/// Validation failures surfaced to the client without touching storage.
/// The messages are the client-facing wire strings.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    #[error("Expecting an array with points.")]
    ExpectingArray,

    #[error("Expecting a series name (string value) with an array of points where each point \
             should be an integer time-stamp with a value.")]
    ExpectingSeriesName,

    #[error("Expecting an array or map containing series and points.")]
    ExpectingMapOrArray,

    #[error("Expecting an integer value as time-stamp.")]
    ExpectingIntegerTs,

    #[error("Received at least one time-stamp which is out-of-range.")]
    TimestampOutOfRange,

    #[error("Unsupported value received. (only integer, string and float values are supported).")]
    UnsupportedValue,

    #[error("Expecting a series to have at least one point.")]
    ExpectingAtLeastOnePoint,

    #[error("Expecting a map with name and points.")]
    ExpectingNameAndPoints,

    #[error("Critical memory allocation error")]
    MemAlloc,
}

/// Bit set over the insert modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertFlags(u8);

impl InsertFlags {
    /// Run the test variant of the local apply.
    pub const TEST: u8 = 0x01;
    /// The body was already re-routed by the sender; never test again.
    pub const TESTED: u8 = 0x02;

    #[inline]
    #[must_use]
    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn test(self) -> bool {
        self.0 & Self::TEST != 0
    }

    #[inline]
    #[must_use]
    pub const fn tested(self) -> bool {
        self.0 & Self::TESTED != 0
    }
}

/// One in-flight client insert.
///
/// The per-pool buffer count is frozen at creation: a re-index swapping
/// the live registry mid-flight never changes this job's buffers, and the
/// job routes against the snapshot it was born with.
pub struct InsertJob {
    pub(crate) request_id: u32,
    pub(crate) client: Arc<dyn ClientSink>,
    pub(crate) flags: InsertFlags,
    pub(crate) npoints: usize,
    pub(crate) packers: Vec<FramedPacker>,
    pub(crate) pools: Arc<PoolMap>,
}

impl InsertJob {
    /// Allocate a job for a client request. The `TEST` flag is set when
    /// the database is re-indexing at this moment.
    #[must_use]
    pub fn new(db: &Database, request_id: u32, client: Arc<dyn ClientSink>) -> Self {
        let pools = db.pools();
        let flags = if pools.is_reindexing() {
            InsertFlags::new(InsertFlags::TEST)
        } else {
            InsertFlags::default()
        };

        // Smaller per-pool buffers when there are many pools.
        let capacity =
            db.config().insert_buffer_size / (usize::from(pools.pool_count()) / 4 + 1);
        let packers = (0..pools.pool_count())
            .map(|_| {
                let mut packer = FramedPacker::with_capacity(capacity);
                packer.add_map_open();
                packer
            })
            .collect();

        Self {
            request_id,
            client,
            flags,
            npoints: 0,
            packers,
            pools,
        }
    }

    #[inline]
    #[must_use]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> InsertFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub fn npoints(&self) -> usize {
        self.npoints
    }

    #[inline]
    #[must_use]
    pub fn pools(&self) -> &Arc<PoolMap> {
        &self.pools
    }

    #[inline]
    #[must_use]
    pub fn pool_buffer(&self, pool: PoolId) -> &[u8] {
        self.packers[pool as usize].body()
    }

    /// Decode `payload` and distribute every series over the pool buffers.
    /// Returns the total point count across all pools, which is also bound
    /// to the job for the final client response.
    ///
    /// # Errors
    /// Any validation failure aborts the whole batch; no partial state
    /// escapes because nothing has touched storage yet.
    pub fn assign_pools(&mut self, db: &Database, payload: &[u8]) -> Result<usize, InsertError> {
        let mut up = Unpacker::new(payload);
        let count = match up.next() {
            Token::MapOpen => self.assign_by_map(db, &mut up)?,
            Token::ArrayOpen => {
                let mut scratch = Packer::with_capacity(db.config().insert_buffer_size);
                self.assign_by_array(db, &mut up, &mut scratch)?
            },
            _ => return Err(InsertError::ExpectingMapOrArray),
        };
        self.npoints = count;
        Ok(count)
    }

    fn assign_by_map(&mut self, db: &Database, up: &mut Unpacker) -> Result<usize, InsertError> {
        let mut count = 0usize;
        let mut tok = up.next();
        loop {
            let name = match tok {
                Token::Raw(name) if !name.is_empty() && name.len() < SERIES_NAME_MAX => name,
                Token::MapClose | Token::End => return Ok(count),
                _ => return Err(InsertError::ExpectingSeriesName),
            };
            let pool = route_series(db, &self.pools, name);
            let packer = &mut self.packers[pool as usize];
            packer.add_raw(name);
            tok = read_points(db, packer, up, &mut count)?;
        }
    }

    fn assign_by_array(
        &mut self,
        db: &Database,
        up: &mut Unpacker,
        scratch: &mut Packer,
    ) -> Result<usize, InsertError> {
        let mut count = 0usize;
        let mut tok = up.next();

        while tok == Token::Map2 {
            let mut key = match up.next() {
                Token::Raw(key) => key,
                _ => return Err(InsertError::ExpectingNameAndPoints),
            };

            // Points first: decode into the scratch buffer, flush below
            // once the name has resolved to a pool.
            if key == b"points" {
                match read_points(db, scratch, up, &mut count)? {
                    Token::Raw(next_key) => key = next_key,
                    _ => return Err(InsertError::ExpectingNameAndPoints),
                }
            }

            if key != b"name" {
                return Err(InsertError::ExpectingNameAndPoints);
            }
            let pool = match up.next() {
                Token::Raw(name) if !name.is_empty() && name.len() < SERIES_NAME_MAX => {
                    let pool = route_series(db, &self.pools, name);
                    self.packers[pool as usize].add_raw(name);
                    pool
                },
                _ => return Err(InsertError::ExpectingNameAndPoints),
            };

            if scratch.is_empty() {
                match up.next() {
                    Token::Raw(key) if key == b"points" => {},
                    _ => return Err(InsertError::ExpectingNameAndPoints),
                }
                tok = read_points(db, &mut self.packers[pool as usize], up, &mut count)?;
            } else {
                self.packers[pool as usize].extend_fragment(scratch.as_slice());
                scratch.clear();
                tok = up.next();
            }
        }

        if tok == Token::ArrayClose || tok == Token::End {
            Ok(count)
        } else {
            Err(InsertError::ExpectingSeriesName)
        }
    }
}

/// Validate one points array and stream it into `packer`. Returns the
/// token following the array (the next series name or a terminator).
fn read_points<'a>(
    db: &Database,
    packer: &mut Packer,
    up: &mut Unpacker<'a>,
    count: &mut usize,
) -> Result<Token<'a>, InsertError> {
    if up.next() != Token::ArrayOpen {
        return Err(InsertError::ExpectingArray);
    }
    packer.add_array_open();

    let mut tok = up.next();
    if tok != Token::Array2 {
        return Err(InsertError::ExpectingAtLeastOnePoint);
    }

    while tok == Token::Array2 {
        packer.add_array2();

        let ts = match up.next() {
            Token::Int(ts) => ts,
            _ => return Err(InsertError::ExpectingIntegerTs),
        };
        if !db.valid_ts(ts) {
            return Err(InsertError::TimestampOutOfRange);
        }
        packer.add_int(ts);

        match up.next() {
            Token::Int(v) => packer.add_int(v),
            Token::Double(v) => packer.add_double(v),
            Token::Raw(v) => packer.add_raw(v),
            _ => return Err(InsertError::UnsupportedValue),
        }

        *count += 1;
        tok = up.next();
    }

    if tok == Token::ArrayClose {
        tok = up.next();
    }
    packer.add_array_close();

    Ok(tok)
}

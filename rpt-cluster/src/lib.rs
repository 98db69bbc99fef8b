#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod forward;
mod lookup;
mod pools;
mod promises;
mod proto;
mod transport;

pub use forward::ForwardJob;
pub use lookup::{server_id, Lookup, LOOKUP_SZ};
pub use pools::{PoolId, PoolMap};
pub use promises::{PeerPromise, PromiseReply, PromiseSet};
pub use proto::{ClientProto, PeerProto};
pub use transport::{ChannelTransport, PoolRequest, PoolTransport, TransportError};

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod checksum;
mod error;
mod fault;
mod pkg;
mod tbf;
mod value;

pub use checksum::crc32c;
pub use error::{Result, RiptideError};
pub use fault::FaultSignal;
pub use pkg::{FramedPacker, Pkg, PKG_HEADER_SIZE};
pub use tbf::{Packer, Token, Unpacker};
pub use value::{Value, ValueType};

/// Maximum series name length in bytes, exclusive.
pub const SERIES_NAME_MAX: usize = 256;

/// Default initial capacity for a pool packer before the per-pool split.
pub const PACKER_SUGGESTED_SIZE: usize = 8192;

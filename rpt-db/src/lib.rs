#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod apply;
mod config;
mod database;
mod dispatch;
mod insert;
mod replica;
mod route;
mod series;
mod storage;

pub use apply::apply_local;
pub use config::{DbConfig, TimePrecision};
pub use database::{Database, WriteGuard};
pub use dispatch::{dispatch, handle_insert, spawn_dispatch, ClientSink};
pub use insert::{InsertError, InsertFlags, InsertJob};
pub use replica::Replica;
pub use route::route_series;
pub use series::{Series, SeriesIndex};
pub use storage::{CriticalError, ShardStore, Storage};

mod db;
mod read;
mod write;

pub use db::{EventStore, StoreError, StoreWriter};
pub use write::NewEvent;

pub(crate) use db::unix_now_secs;

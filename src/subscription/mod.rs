// WebSocket snapshot streaming with per-connection entity filters

pub mod manager;
pub mod protocol;

pub use manager::ConnectionManager;
pub use protocol::{ClientMessage, SnapshotMessage};

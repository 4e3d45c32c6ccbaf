//! Ports layer for the gateway.

pub mod outbound;

pub use outbound::{
    AppSessionStore, ChannelStore, Clock, RpcHistoryStore, RpcRecord, SystemClock,
};

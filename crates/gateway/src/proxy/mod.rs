//! Gateway proxy: routing, credential propagation and streamed forwarding

mod error;
mod server;

pub use error::ProxyError;
pub use server::{
    AppState, GatewayServer, HOP_BY_HOP_HEADERS, StreamStats, UpstreamClient, create_router,
    forward_request, strip_hop_by_hop,
};

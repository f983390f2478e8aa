//! Gateway client: typed API calls and the streamed response consumer

mod api;
mod consumer;
mod decoder;
mod error;

pub use api::{
    GatewayClient, LoginRequest, MessageResponse, RegisterRequest, RegisterResponse, TokenResponse,
    UserProfile,
};
pub use consumer::{CallbackObserver, StreamConsumer, StreamObserver, StreamOutcome, callbacks};
pub use decoder::Utf8ChunkDecoder;
pub use error::{ClientError, ClientResult};

pub mod chat;
pub mod login;
pub mod logout;
pub mod me;
pub mod register;

pub use chat::ChatCommand;
pub use login::LoginCommand;
pub use logout::LogoutCommand;
pub use me::MeCommand;
pub use register::RegisterCommand;

use chat_gateway::client::GatewayClient;

use crate::output::OutputFormat;
use crate::session::SessionStore;

/// Everything a command needs to talk to the gateway
pub struct CliContext {
    pub client: GatewayClient,
    pub sessions: SessionStore,
    pub format: OutputFormat,
}

impl CliContext {
    pub fn new(client: GatewayClient, sessions: SessionStore, format: OutputFormat) -> Self {
        Self {
            client,
            sessions,
            format,
        }
    }
}

pub mod commands;
pub mod error;
pub mod output;
pub mod session;

pub use commands::{
    ChatCommand, CliContext, LoginCommand, LogoutCommand, MeCommand, RegisterCommand,
};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_timestamp, profile_table};
pub use session::{Session, SessionStore};

use chrono::Utc;
use clap::Parser;

use super::CliContext;
use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct LogoutCommand {}

impl LogoutCommand {
    /// Invalidate the stored token on the user service, then remove the
    /// session file.
    ///
    /// The local session is removed even when the service call fails or the
    /// file cannot be parsed.
    pub async fn execute(&self, ctx: &CliContext) -> CliResult<()> {
        let session = ctx.sessions.load().ok().flatten();

        let revoked = match session.filter(|s| !s.is_expired(Utc::now())) {
            Some(session) => match ctx.client.logout(&session.auth_context()).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!("Server-side logout failed: {e}");
                    false
                }
            },
            None => false,
        };

        let removed = ctx.sessions.clear()?;

        match ctx.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({ "logged_out": removed, "revoked": revoked })
                );
            }
            OutputFormat::Table => {
                if removed {
                    println!("Logged out.");
                } else {
                    println!("No active session.");
                }
            }
        }

        Ok(())
    }
}

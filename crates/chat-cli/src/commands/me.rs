use clap::Parser;

use super::CliContext;
use crate::error::CliResult;
use crate::output::{OutputFormat, profile_table};

#[derive(Parser)]
pub struct MeCommand {}

impl MeCommand {
    /// Ask the user service who we are.
    ///
    /// Sent without credentials when no session is stored. A stored session
    /// the service rejects is removed.
    pub async fn execute(&self, ctx: &CliContext) -> CliResult<()> {
        let session = ctx.sessions.load()?;
        let auth = ctx.sessions.auth_context()?;

        let profile = match ctx.client.me(&auth).await {
            Ok(profile) => profile,
            Err(e) => {
                if session.is_some() {
                    ctx.sessions.clear()?;
                    tracing::debug!("Cleared session after failed identity check");
                }
                return Err(e.into());
            }
        };

        if let Some(mut session) = session {
            session.user = Some(profile.clone());
            ctx.sessions.save(&session)?;
        }

        match ctx.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&profile)?),
            OutputFormat::Table => println!("{}", profile_table(&profile)),
        }

        Ok(())
    }
}

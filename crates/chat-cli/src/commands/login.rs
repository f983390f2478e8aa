use chrono::Utc;
use clap::Parser;

use chat_gateway::client::LoginRequest;

use super::CliContext;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, format_timestamp, profile_table};
use crate::session::Session;

#[derive(Parser)]
pub struct LoginCommand {
    #[clap(long, help = "Account email")]
    pub email: String,

    #[clap(long, env = "CHAT_PASSWORD", hide_env_values = true, help = "Account password")]
    pub password: String,
}

impl LoginCommand {
    /// Log in, store the token, then confirm it with a `me` check.
    ///
    /// A token the user service rejects on that check is not kept.
    pub async fn execute(&self, ctx: &CliContext) -> CliResult<()> {
        let token = ctx
            .client
            .login(&LoginRequest {
                email: self.email.clone(),
                password: self.password.clone(),
            })
            .await?;

        let mut session = Session::from_token(ctx.client.base_url().as_str(), &token, Utc::now());
        ctx.sessions.save(&session)?;

        let profile = match ctx.client.me(&session.auth_context()).await {
            Ok(profile) => profile,
            Err(e) => {
                ctx.sessions.clear()?;
                return Err(CliError(format!(
                    "Login succeeded but the session could not be verified: {}",
                    CliError::from(e)
                )));
            }
        };

        session.user = Some(profile.clone());
        ctx.sessions.save(&session)?;
        tracing::debug!("Logged in as {}", profile.email);

        match ctx.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "token_type": session.token_type,
                    "expires_at": session.expires_at,
                    "user": profile,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Logged in as {} <{}>", profile.name, profile.email);
                if let Some(expires_at) = session.expires_at {
                    println!("Session expires {} UTC", format_timestamp(&expires_at));
                }
                println!("\n{}", profile_table(&profile));
            }
        }

        Ok(())
    }
}

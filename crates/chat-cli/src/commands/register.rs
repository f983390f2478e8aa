use clap::Parser;

use chat_gateway::client::RegisterRequest;

use super::CliContext;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, profile_table};

#[derive(Parser)]
pub struct RegisterCommand {
    #[clap(long, help = "Display name (2-100 characters)")]
    pub name: String,

    #[clap(long, help = "Email address used to log in")]
    pub email: String,

    #[clap(long, env = "CHAT_PASSWORD", hide_env_values = true, help = "Account password")]
    pub password: String,

    #[clap(long, help = "Password confirmation (defaults to --password)")]
    pub password_confirmation: Option<String>,
}

impl RegisterCommand {
    pub async fn execute(&self, ctx: &CliContext) -> CliResult<()> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() {
            return Err(CliError::from("Name and email cannot be empty"));
        }

        let request = RegisterRequest {
            name: self.name.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
            password_confirmation: self
                .password_confirmation
                .clone()
                .unwrap_or_else(|| self.password.clone()),
        };

        let response = ctx.client.register(&request).await?;

        match ctx.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
            OutputFormat::Table => {
                println!("{}\n", response.message);
                println!("{}", profile_table(&response.user));
                println!("\nRun `chat-cli login --email {}` to sign in.", response.user.email);
            }
        }

        Ok(())
    }
}

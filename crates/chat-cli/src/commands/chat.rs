use std::io::Write;

use clap::Parser;

use chat_gateway::client::{ClientError, StreamObserver, StreamOutcome};

use super::CliContext;
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ChatCommand {
    #[clap(required = true, num_args = 1.., help = "Message to send")]
    pub message: Vec<String>,
}

/// Writes each chunk as soon as it arrives and keeps the full reply
pub struct ChunkPrinter<W: Write> {
    out: Option<W>,
    reply: String,
    error: Option<ClientError>,
}

impl<W: Write> ChunkPrinter<W> {
    /// Echo chunks to `out`
    pub fn new(out: W) -> Self {
        Self {
            out: Some(out),
            reply: String::new(),
            error: None,
        }
    }

    /// Collect chunks without echoing them
    pub fn silent() -> Self {
        Self {
            out: None,
            reply: String::new(),
            error: None,
        }
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    pub fn into_result(self) -> CliResult<String> {
        match self.error {
            Some(e) => Err(CliError::from(e)),
            None => Ok(self.reply),
        }
    }
}

impl<W: Write> StreamObserver for ChunkPrinter<W> {
    fn on_chunk(&mut self, text: &str) {
        self.reply.push_str(text);
        if let Some(out) = self.out.as_mut() {
            // A closed stdout should not abort the stream
            let _ = out.write_all(text.as_bytes()).and_then(|_| out.flush());
        }
    }

    fn on_done(&mut self) {
        if let Some(out) = self.out.as_mut() {
            let _ = writeln!(out);
        }
    }

    fn on_error(&mut self, error: ClientError) {
        if let Some(out) = self.out.as_mut() {
            if !self.reply.is_empty() {
                let _ = writeln!(out);
            }
        }
        self.error = Some(error);
    }
}

impl ChatCommand {
    pub async fn execute(&self, ctx: &CliContext) -> CliResult<()> {
        let reply = match ctx.format {
            OutputFormat::Table => self.run(ctx, ChunkPrinter::new(std::io::stdout())).await?,
            OutputFormat::Json => self.run(ctx, ChunkPrinter::<std::io::Sink>::silent()).await?,
        };

        if let OutputFormat::Json = ctx.format {
            let output = serde_json::json!({
                "message": self.text(),
                "reply": reply,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Ok(())
    }

    /// Stream the reply into `printer` and return the full text
    pub async fn run<W: Write>(
        &self,
        ctx: &CliContext,
        mut printer: ChunkPrinter<W>,
    ) -> CliResult<String> {
        let message = self.text();
        if message.trim().is_empty() {
            return Err(CliError::from("Message cannot be empty"));
        }

        let auth = ctx.sessions.auth_context()?;
        let outcome = ctx.client.stream_chat(&message, &auth, &mut printer).await;
        tracing::debug!(?outcome, chars = printer.reply().chars().count(), "Chat finished");

        match outcome {
            StreamOutcome::Done => printer.into_result(),
            StreamOutcome::Failed => match printer.into_result() {
                Err(e) => Err(e),
                Ok(_) => Err(CliError::from("Chat stream failed")),
            },
        }
    }

    fn text(&self) -> String {
        self.message.join(" ")
    }
}

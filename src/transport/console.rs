//! Console transport: chat with the bot from a terminal.
//!
//! Each stdin line is a message from the configured console user in
//! the `console` channel. Replies go to stdout. An uploaded file is
//! printed inline and then deleted, like a chat upload would.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{ChatCommand, ChatEvent, Connection, IncomingMessage, Transport};

/// Channel name used for every console message
pub const CONSOLE_CHANNEL: &str = "console";

type Input = Box<dyn AsyncBufRead + Unpin + Send>;
type Output = Box<dyn AsyncWrite + Unpin + Send>;

pub struct ConsoleTransport {
    user: String,
    input: Input,
    output: Output,
}

impl ConsoleTransport {
    /// Console bound to the process stdin/stdout.
    pub fn new(user: impl Into<String>) -> Self {
        Self::with_io(
            user,
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(tokio::io::stdout()),
        )
    }

    pub fn with_io(user: impl Into<String>, input: Input, output: Output) -> Self {
        Self {
            user: user.into(),
            input,
            output,
        }
    }

    async fn read_loop(user: String, input: Input, event_tx: mpsc::Sender<ChatEvent>) {
        let mut lines = input.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    debug!("Console input: {line}");
                    let msg = IncomingMessage {
                        from: user.clone(),
                        channel: CONSOLE_CHANNEL.to_string(),
                        body: line,
                    };
                    if event_tx.send(ChatEvent::Message(msg)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("Console input closed");
                    break;
                }
                Err(e) => {
                    error!("Console read error: {e}");
                    break;
                }
            }
        }
        let _ = event_tx.send(ChatEvent::Closed).await;
    }

    async fn write_loop(mut output: Output, mut cmd_rx: mpsc::Receiver<ChatCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            let text = match cmd {
                ChatCommand::SendMessage { body, .. } => format!("{body}\n"),
                ChatCommand::Typing { channel } => {
                    debug!("Typing in {channel}");
                    continue;
                }
                ChatCommand::UploadFile { path, .. } => upload(&path).await,
            };

            if let Err(e) = output.write_all(text.as_bytes()).await {
                error!("Console write error: {e}");
                break;
            }
            let _ = output.flush().await;
        }
    }
}

/// Renders the file inline and removes it.
async fn upload(path: &Path) -> String {
    let text = match tokio::fs::read(path).await {
        Ok(bytes) => format!(
            "── {} ──\n{}\n",
            path.display(),
            String::from_utf8_lossy(&bytes).trim_end()
        ),
        Err(e) => {
            warn!("Could not read output file {}: {e}", path.display());
            return format!("Could not upload {}: {e}\n", path.display());
        }
    };
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Could not delete output file {}: {e}", path.display());
    }
    text
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    async fn connect(self: Box<Self>) -> Result<Connection> {
        let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(100);
        let (cmd_tx, cmd_rx) = mpsc::channel::<ChatCommand>(100);

        let ConsoleTransport {
            user,
            input,
            output,
        } = *self;

        let _ = event_tx.send(ChatEvent::Connected).await;
        tokio::spawn(Self::read_loop(user, input, event_tx));
        let outbound = tokio::spawn(Self::write_loop(output, cmd_rx));

        Ok(Connection {
            event_rx,
            cmd_tx,
            outbound,
        })
    }
}

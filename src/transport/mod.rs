pub mod console;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use console::ConsoleTransport;

/// Parsed incoming chat message
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Caller identity, matched against `authorized_users`
    pub from: String,
    pub channel: String,
    pub body: String,
}

/// Events emitted by the transport to the runtime
#[derive(Debug)]
pub enum ChatEvent {
    Connected,
    Message(IncomingMessage),
    /// The transport is gone (EOF, connection closed)
    Closed,
}

/// Commands sent by the runtime to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    SendMessage { channel: String, body: String },
    /// An action is running for this channel
    Typing { channel: String },
    /// Upload the file to the channel, then delete it
    UploadFile { channel: String, path: PathBuf },
}

/// What a connected transport hands to the runtime.
pub struct Connection {
    /// Receives chat events (incoming messages, etc.)
    pub event_rx: mpsc::Receiver<ChatEvent>,
    /// Sends commands (replies, uploads, etc.)
    pub cmd_tx: mpsc::Sender<ChatCommand>,
    /// Delivers commands; finishes once every `cmd_tx` clone is dropped
    /// and the backlog is out
    pub outbound: JoinHandle<()>,
}

/// A chat backend. Connecting yields the same `Connection` whatever
/// the backend.
#[async_trait]
pub trait Transport: Send {
    /// Short backend name for logs, e.g. `"console"`.
    fn name(&self) -> &str;

    async fn connect(self: Box<Self>) -> Result<Connection>;
}

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::action::{ActionDefinition, ActionRegistry};
use crate::config::ChatConfig;
use crate::gate::InvocationGate;
use crate::transport::{ChatCommand, ChatEvent, IncomingMessage};

use super::commands::{self, Request};

/// The chat-command router.
///
/// Receives chat events, filters them by channel, answers `help`,
/// and runs actions through the invocation gate. Every invocation runs
/// in its own task so a long action never stops the loop from turning
/// down overlapping requests.
pub struct BotRuntime {
    chat: ChatConfig,
    registry: Arc<ActionRegistry>,
    gate: Arc<InvocationGate>,
}

impl BotRuntime {
    pub fn new(chat: ChatConfig, registry: ActionRegistry, gate: Arc<InvocationGate>) -> Self {
        Self {
            chat,
            registry: Arc::new(registry),
            gate,
        }
    }

    /// Main bot loop. Returns once the transport closes and every
    /// running invocation has replied.
    pub async fn run(
        &self,
        mut event_rx: mpsc::Receiver<ChatEvent>,
        cmd_tx: mpsc::Sender<ChatCommand>,
    ) -> Result<()> {
        info!("{} started, waiting for messages...", self.chat.name);
        let mut invocations = JoinSet::new();

        while let Some(event) = event_rx.recv().await {
            match event {
                ChatEvent::Connected => {
                    info!("✓ {} is online with {} actions", self.chat.name, self.registry.len());
                }
                ChatEvent::Message(msg) => {
                    if let Some((def, user_args)) = self.handle_message(&msg, &cmd_tx).await {
                        invocations.spawn(invoke(
                            self.gate.clone(),
                            def,
                            user_args,
                            msg,
                            cmd_tx.clone(),
                        ));
                    }
                }
                ChatEvent::Closed => {
                    info!("Transport closed");
                    if self.gate.is_busy() {
                        info!("Waiting for the running action to finish");
                    }
                    break;
                }
            }

            // Reap finished invocations so the set does not grow
            while let Some(joined) = invocations.try_join_next() {
                report_join(joined);
            }
        }

        while let Some(joined) = invocations.join_next().await {
            report_join(joined);
        }
        Ok(())
    }

    /// Answers what can be answered inline. Returns the action and its
    /// values when the message is a well-formed invocation.
    async fn handle_message(
        &self,
        msg: &IncomingMessage,
        cmd_tx: &mpsc::Sender<ChatCommand>,
    ) -> Option<(ActionDefinition, Vec<String>)> {
        if let Some(ref channel) = self.chat.channel {
            if *channel != msg.channel {
                return None;
            }
        }

        let reply = match commands::parse_request(&msg.body)? {
            Request::Help => commands::help_text(&self.registry),
            Request::Run { action, rest } => match self.registry.get(action) {
                None => format!("Unknown command: {action}\nType help for available commands."),
                Some(def) => match commands::parse_args(def, rest) {
                    Some(user_args) => return Some((def.clone(), user_args)),
                    None => format!("Usage: {}", def.usage()),
                },
            },
        };

        send(cmd_tx, &msg.channel, reply).await;
        None
    }
}

/// Runs one action for one message and posts the replies.
async fn invoke(
    gate: Arc<InvocationGate>,
    def: ActionDefinition,
    user_args: Vec<String>,
    msg: IncomingMessage,
    cmd_tx: mpsc::Sender<ChatCommand>,
) {
    let invocation = Uuid::new_v4();
    info!(
        "[{invocation}] {} requested {} {:?}",
        msg.from, def.name, user_args
    );

    let typing = ChatCommand::Typing {
        channel: msg.channel.clone(),
    };
    let started = Instant::now();
    let outcome = gate
        .invoke_with(&def, &msg.from, &user_args, || {
            // Best effort, a full queue just loses the indicator
            let _ = cmd_tx.try_send(typing);
        })
        .await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("[{invocation}] {e}");
            send(&cmd_tx, &msg.channel, commands::rejection_text(&def, &e)).await;
            return;
        }
    };

    let elapsed = started.elapsed().as_millis();
    if outcome.result.success() {
        info!("[{invocation}] {} succeeded in {elapsed}ms", def.name);
    } else {
        warn!(
            "[{invocation}] {} failed with exit code {} in {elapsed}ms",
            def.name, outcome.result.exit_code
        );
    }
    for reply in commands::result_messages(&outcome) {
        send(&cmd_tx, &msg.channel, reply).await;
    }

    if let Some(path) = def.output_path() {
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!("[{invocation}] Uploading {}", path.display());
            send(&cmd_tx, &msg.channel, "Uploading output file ...".to_string()).await;
            let _ = cmd_tx
                .send(ChatCommand::UploadFile {
                    channel: msg.channel.clone(),
                    path,
                })
                .await;
        }
    }
}

async fn send(cmd_tx: &mpsc::Sender<ChatCommand>, channel: &str, body: String) {
    let _ = cmd_tx
        .send(ChatCommand::SendMessage {
            channel: channel.to_string(),
            body,
        })
        .await;
}

fn report_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!("Invocation task failed: {e}");
    }
}

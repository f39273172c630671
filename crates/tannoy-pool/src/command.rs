//! Chat command parsing and dispatch.
//!
//! Commands arrive as ordinary chat messages prefixed with a fixed
//! token. Every live connection observes every message, so the
//! dispatcher claims each message id once and drops the duplicates the
//! other connections deliver.

use crate::agent::VoiceAgent;
use crate::controller::PoolController;
use crate::gateway::{ChatMessage, Connection};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tannoy_types::MessageId;
use tracing::{debug, warn};

/// Posted to the originating text channel after a successful `join`.
const GREETING_TEXT: &str = "Hello!";

/// Posted to the originating text channel after a `leave`.
const FAREWELL_TEXT: &str = "Goodbye!";

/// Reply when every agent is busy serving someone.
const NO_CAPACITY_TEXT: &str = "No available bots.";

/// Recognized subcommands. Anything unrecognized, and a bare prefix,
/// falls back to `Join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Leave,
    Voice { name: Option<String> },
    Shutdown,
}

impl Command {
    /// Parses a chat line of the form `<prefix> [subcommand] [args…]`.
    /// Returns `None` when the line is not addressed to the pool at all.
    pub fn parse(prefix: &str, content: &str) -> Option<Command> {
        let mut words = content.split_whitespace();
        if words.next()? != prefix {
            return None;
        }
        let command = match words.next().map(|word| word.to_lowercase()) {
            None => Command::Join,
            Some(word) => match word.as_str() {
                "join" => Command::Join,
                "leave" => Command::Leave,
                "voice" => Command::Voice {
                    name: words.next().map(|name| name.to_lowercase()),
                },
                "shutdown" => Command::Shutdown,
                _ => Command::Join,
            },
        };
        Some(command)
    }
}

/// Bounded record of recently dispatched message ids.
#[derive(Debug)]
pub struct SeenMessages {
    order: VecDeque<MessageId>,
    set: HashSet<MessageId>,
    capacity: usize,
}

impl Default for SeenMessages {
    fn default() -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
            capacity: 1024,
        }
    }
}

impl SeenMessages {
    /// Returns true exactly once per id.
    pub fn claim(&mut self, id: &MessageId) -> bool {
        if self.set.contains(id) {
            return false;
        }
        self.set.insert(id.clone());
        self.order.push_back(id.clone());
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }
}

impl PoolController {
    /// Entry point for every chat message a connection observes.
    pub async fn dispatch_message(&self, via: &Arc<VoiceAgent>, message: &ChatMessage) {
        if message.author.automated {
            return;
        }
        let Some(command) = Command::parse(&self.config.command_prefix, &message.content) else {
            return;
        };
        if !self.seen_messages.lock().await.claim(&message.id) {
            return;
        }
        debug!(author = %message.author.id, ?command, "dispatching command");

        match command {
            Command::Join => self.cmd_join(via, message).await,
            Command::Leave => self.cmd_leave(via, message).await,
            Command::Voice { name } => self.cmd_voice(message, name).await,
            Command::Shutdown => self.cmd_shutdown(message).await,
        }
    }

    async fn cmd_join(&self, via: &Arc<VoiceAgent>, message: &ChatMessage) {
        let Some(room) = via.connection().member_room(message.author.id).await else {
            debug!(author = %message.author.id, "join requested from outside any voice room");
            return;
        };

        if self.agent_serving(&room).await.is_some() {
            return;
        }

        match self.idle_agent().await {
            Some(agent) => {
                if let Err(e) = agent.go_online(&room).await {
                    warn!(room = %room, error = %e, "failed to bring agent online");
                    return;
                }
                if let Err(e) = agent
                    .connection()
                    .send_text(&message.channel, GREETING_TEXT)
                    .await
                {
                    warn!(error = %e, "failed to send greeting");
                }
            }
            None => {
                // Out of capacity: any open agent delivers the notice.
                if let Some(agent) = self.any_agent().await {
                    if let Err(e) = agent
                        .connection()
                        .send_text(&message.channel, NO_CAPACITY_TEXT)
                        .await
                    {
                        warn!(error = %e, "failed to send capacity notice");
                    }
                }
            }
        }
    }

    async fn cmd_leave(&self, via: &Arc<VoiceAgent>, message: &ChatMessage) {
        let Some(room) = via.connection().member_room(message.author.id).await else {
            return;
        };
        let Some(agent) = self.agent_serving(&room).await else {
            return;
        };

        if let Err(e) = agent.go_offline().await {
            warn!(room = %room, error = %e, "failed to leave room");
            return;
        }
        if let Err(e) = agent
            .connection()
            .send_text(&message.channel, FAREWELL_TEXT)
            .await
        {
            warn!(error = %e, "failed to send farewell");
        }
    }

    async fn cmd_voice(&self, message: &ChatMessage, name: Option<String>) {
        // Unauthorized attempts are ignored without a reply.
        if !self.is_admin(message.author.id) {
            debug!(author = %message.author.id, "ignoring voice command from non-admin");
            return;
        }
        let name = name.unwrap_or_else(|| self.config.default_voice.clone());
        self.set_voice(&name).await;
    }

    async fn cmd_shutdown(&self, message: &ChatMessage) {
        if !self.is_admin(message.author.id) {
            debug!(author = %message.author.id, "ignoring shutdown command from non-admin");
            return;
        }
        self.shutdown().await;
    }
}

//! The platform gateway seam.
//!
//! The chat platform's transport and authentication are external
//! collaborators: something that can open a connection for a secret
//! token, deliver membership and message events in arrival order, and
//! carry out room and text operations. Everything the pool needs from it
//! is captured by [`Gateway`] and [`Connection`]; adapters for a concrete
//! platform implement these two traits and nothing else.

use crate::error::PoolError;
use async_trait::async_trait;
use std::sync::Arc;
use tannoy_types::{
    MemberId, MembershipChange, MessageId, Participant, RoomId, Secret, TextChannelId,
};
use tokio::sync::mpsc;

/// A chat message observed by a connection.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: MessageId,
    /// The text channel the message arrived on; replies go here and
    /// nowhere else.
    pub channel: TextChannelId,
    pub author: Participant,
    pub content: String,
}

/// Events a live connection delivers, in arrival order.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Membership(MembershipChange),
    Message(ChatMessage),
}

/// Opens platform connections.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Connects with `token`. The receiver yields events until the
    /// connection closes, then finishes.
    async fn connect(
        &self,
        token: &Secret,
    ) -> Result<(Arc<dyn Connection>, mpsc::Receiver<PlatformEvent>), PoolError>;
}

/// One live platform connection: the agent's control surface.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The agent's own platform identity. Used by the state machine to
    /// recognize self-events.
    fn identity(&self) -> Participant;

    fn is_closed(&self) -> bool;

    /// Closes the connection; the event receiver finishes shortly after.
    async fn close(&self);

    async fn join_room(&self, room: &RoomId) -> Result<(), PoolError>;

    /// Leaves the current voice room, if any.
    async fn leave_room(&self) -> Result<(), PoolError>;

    fn current_room(&self) -> Option<RoomId>;

    /// Snapshot of who is in `room` right now.
    async fn occupants(&self, room: &RoomId) -> Vec<Participant>;

    /// The voice room `member` currently occupies, if any.
    async fn member_room(&self, member: MemberId) -> Option<RoomId>;

    /// Posts text to a channel. Fails hard with
    /// [`PoolError::ChannelNotFound`] or [`PoolError::NotATextChannel`]
    /// when the target cannot be resolved.
    async fn send_text(&self, channel: &TextChannelId, text: &str) -> Result<(), PoolError>;
}

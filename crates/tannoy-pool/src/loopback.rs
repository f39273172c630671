//! An in-process platform for integration tests and local development.
//!
//! Presents the same surface a real transport adapter would: every live
//! connection observes every membership change and chat message, and can
//! join rooms, snapshot occupancy, and post text. State lives in one
//! shared table, so tests drive membership and chat traffic directly and
//! assert on what the pool did.

use crate::error::PoolError;
use crate::gateway::{ChatMessage, Connection, Gateway, PlatformEvent};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tannoy_types::{
    MemberId, MembershipChange, MessageId, Participant, RoomId, Secret, TextChannelId,
};
use tokio::sync::mpsc;
use tracing::warn;

/// Per-connection event buffer; tests never come close to filling it.
const EVENT_BUFFER: usize = 256;

struct ConnectionSlot {
    tx: mpsc::Sender<PlatformEvent>,
}

#[derive(Default)]
struct State {
    members: HashMap<MemberId, Participant>,
    locations: HashMap<MemberId, RoomId>,
    rooms: HashSet<RoomId>,
    text_channels: HashSet<TextChannelId>,
    connections: HashMap<u64, ConnectionSlot>,
    posted: Vec<(TextChannelId, String)>,
    next_member: u64,
    next_connection: u64,
    connect_count: usize,
}

impl State {
    fn broadcast(&self, event: PlatformEvent) {
        for slot in self.connections.values() {
            if let Err(e) = slot.tx.try_send(event.clone()) {
                warn!("loopback event dropped: {}", e);
            }
        }
    }

    /// Moves a member between rooms (or out of voice entirely) and tells
    /// every connection about it, the mover's own included.
    fn relocate(&mut self, member: MemberId, to: Option<RoomId>) {
        let Some(participant) = self.members.get(&member).cloned() else {
            return;
        };
        let before = match &to {
            Some(room) => {
                self.rooms.insert(room.clone());
                self.locations.insert(member, room.clone())
            }
            None => self.locations.remove(&member),
        };
        if before == to {
            return;
        }
        self.broadcast(PlatformEvent::Membership(MembershipChange {
            member: participant,
            before,
            after: to,
        }));
    }
}

/// The shared platform. Clones are handles onto the same world.
#[derive(Clone, Default)]
pub struct LoopbackPlatform {
    state: Arc<Mutex<State>>,
}

impl LoopbackPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_text_channel(&self, id: &str) -> TextChannelId {
        let channel = TextChannelId::new(id);
        self.lock().text_channels.insert(channel.clone());
        channel
    }

    pub fn add_room(&self, id: &str) -> RoomId {
        let room = RoomId::new(id);
        self.lock().rooms.insert(room.clone());
        room
    }

    pub fn add_member(&self, display_name: &str, automated: bool) -> Participant {
        let mut state = self.lock();
        state.next_member += 1;
        let participant = Participant {
            id: MemberId(state.next_member),
            display_name: display_name.to_string(),
            automated,
        };
        state.members.insert(participant.id, participant.clone());
        participant
    }

    /// Moves `member` into `to` (or out of voice for `None`), emitting a
    /// membership event to every live connection.
    pub fn move_member(&self, member: MemberId, to: Option<RoomId>) {
        self.lock().relocate(member, to);
    }

    /// Posts a chat message observed by every live connection.
    pub fn post_message(&self, author: MemberId, channel: &TextChannelId, content: &str) {
        let state = self.lock();
        let Some(participant) = state.members.get(&author).cloned() else {
            return;
        };
        state.broadcast(PlatformEvent::Message(ChatMessage {
            id: MessageId::new(uuid::Uuid::new_v4().to_string()),
            channel: channel.clone(),
            author: participant,
            content: content.to_string(),
        }));
    }

    /// Everything agents posted to text channels, in order.
    pub fn sent_texts(&self) -> Vec<(TextChannelId, String)> {
        self.lock().posted.clone()
    }

    pub fn occupants_of(&self, room: &RoomId) -> Vec<Participant> {
        let state = self.lock();
        state
            .locations
            .iter()
            .filter(|(_, location)| *location == room)
            .filter_map(|(member, _)| state.members.get(member).cloned())
            .collect()
    }

    /// How many connections have ever been opened; supervisor tests watch
    /// this grow across restarts.
    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }
}

#[async_trait]
impl Gateway for LoopbackPlatform {
    async fn connect(
        &self,
        token: &Secret,
    ) -> Result<(Arc<dyn Connection>, mpsc::Receiver<PlatformEvent>), PoolError> {
        let mut state = self.lock();
        state.connect_count += 1;
        state.next_member += 1;
        let identity = Participant {
            id: MemberId(state.next_member),
            display_name: format!("tannoy-{}", token.fingerprint()),
            automated: true,
        };
        state.members.insert(identity.id, identity.clone());

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        state.next_connection += 1;
        let connection_id = state.next_connection;
        state.connections.insert(connection_id, ConnectionSlot { tx });

        let connection = LoopbackConnection {
            connection_id,
            identity,
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        };
        Ok((Arc::new(connection), rx))
    }
}

struct LoopbackConnection {
    connection_id: u64,
    identity: Participant,
    state: Arc<Mutex<State>>,
    closed: AtomicBool,
}

impl LoopbackConnection {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    fn identity(&self) -> Participant {
        self.identity.clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.lock();
        // Dropping the sender finishes the event receiver.
        state.connections.remove(&self.connection_id);
        state.relocate(self.identity.id, None);
    }

    async fn join_room(&self, room: &RoomId) -> Result<(), PoolError> {
        if self.is_closed() {
            return Err(PoolError::Connection("connection closed".to_string()));
        }
        self.lock().relocate(self.identity.id, Some(room.clone()));
        Ok(())
    }

    async fn leave_room(&self) -> Result<(), PoolError> {
        if self.is_closed() {
            return Err(PoolError::Connection("connection closed".to_string()));
        }
        self.lock().relocate(self.identity.id, None);
        Ok(())
    }

    fn current_room(&self) -> Option<RoomId> {
        self.lock().locations.get(&self.identity.id).cloned()
    }

    async fn occupants(&self, room: &RoomId) -> Vec<Participant> {
        let state = self.lock();
        state
            .locations
            .iter()
            .filter(|(_, location)| *location == room)
            .filter_map(|(member, _)| state.members.get(member).cloned())
            .collect()
    }

    async fn member_room(&self, member: MemberId) -> Option<RoomId> {
        self.lock().locations.get(&member).cloned()
    }

    async fn send_text(&self, channel: &TextChannelId, text: &str) -> Result<(), PoolError> {
        let mut state = self.lock();
        if !state.text_channels.contains(channel) {
            // A voice room's id is resolvable but cannot carry text.
            if state.rooms.contains(&RoomId::new(channel.as_str())) {
                return Err(PoolError::NotATextChannel(channel.to_string()));
            }
            return Err(PoolError::ChannelNotFound(channel.to_string()));
        }
        state.posted.push((channel.clone(), text.to_string()));
        Ok(())
    }
}

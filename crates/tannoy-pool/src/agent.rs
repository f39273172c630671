//! One voice agent: a platform connection, its greeter queue, and the
//! settle/drain discipline that turns membership events into speech.

use crate::error::PoolError;
use crate::gateway::Connection;
use crate::queue::{Announcement, GreeterQueue};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tannoy_types::{MembershipChange, RoomId};
use tannoy_voice::{wait_idle, Playback, PlaybackError, Synthesizer};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, warn};

/// Spoken in place of an automated participant's display name.
const SERVICE_DROID: &str = "service droid";

/// Spoken when an agent comes online in a room.
pub const ONLINE_ANNOUNCEMENT: &str = "Tannoy online";

/// Spoken, to completion, before an agent leaves a room.
pub const OFFLINE_ANNOUNCEMENT: &str = "Tannoy going offline";

/// Timing knobs for the settle/drain discipline.
#[derive(Debug, Clone)]
pub struct AgentTiming {
    /// Fixed pause between enqueueing an announcement and draining; the
    /// window in which a rapid join/leave pair cancels itself.
    pub settle: Duration,
    /// Extra pause before draining to a single remaining listener, so the
    /// first words are not clipped while the audio channel is still
    /// negotiating.
    pub lone_listener_extra: Duration,
    /// Bounded interval for playback idle polling.
    pub playback_poll: Duration,
    /// Backoff after losing a playback-busy race.
    pub busy_backoff: Duration,
}

impl Default for AgentTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            lone_listener_extra: Duration::from_secs(1),
            playback_poll: Duration::from_millis(100),
            busy_backoff: Duration::from_millis(100),
        }
    }
}

/// A single pool member. Owns its greeter queue exclusively; only the
/// agent's own event intake and drain task ever touch it.
pub struct VoiceAgent {
    conn: Arc<dyn Connection>,
    playback: Arc<dyn Playback>,
    synth: RwLock<Arc<Synthesizer>>,
    queue: Mutex<GreeterQueue>,
    priority: AtomicI64,
    timing: AgentTiming,
    drain_wake: Notify,
}

impl VoiceAgent {
    pub fn new(
        conn: Arc<dyn Connection>,
        playback: Arc<dyn Playback>,
        synth: Arc<Synthesizer>,
        priority: i64,
        timing: AgentTiming,
    ) -> Arc<Self> {
        Arc::new(Self {
            conn,
            playback,
            synth: RwLock::new(synth),
            queue: Mutex::new(GreeterQueue::new()),
            priority: AtomicI64::new(priority),
            timing,
            drain_wake: Notify::new(),
        })
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// Selection score. Decrements on every observed membership event,
    /// which biases "highest priority wins" selection toward agents that
    /// have been comparatively idle. Deliberate policy, not a load
    /// metric with the sign flipped.
    pub fn priority(&self) -> i64 {
        self.priority.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    pub fn current_room(&self) -> Option<RoomId> {
        self.conn.current_room()
    }

    /// Replaces the synthesizer reference; the next announcement uses it.
    /// The reference is swapped as a whole, never mutated in place.
    pub async fn set_synthesizer(&self, synth: Arc<Synthesizer>) {
        *self.synth.write().await = synth;
    }

    pub async fn synthesizer(&self) -> Arc<Synthesizer> {
        Arc::clone(&*self.synth.read().await)
    }

    /// Copy of the pending announcements, front first.
    pub async fn pending(&self) -> Vec<Announcement> {
        self.queue.lock().await.entries()
    }

    /// Whether the agent is serving anyone: some non-automated
    /// participant occupies its current room.
    pub async fn is_active(&self) -> bool {
        match self.conn.current_room() {
            Some(room) => self.human_count(&room).await > 0,
            None => false,
        }
    }

    async fn human_count(&self, room: &RoomId) -> usize {
        self.conn
            .occupants(room)
            .await
            .iter()
            .filter(|p| !p.automated)
            .count()
    }

    /// Feeds one membership event through the state machine.
    pub async fn handle_membership(&self, change: &MembershipChange) {
        // Every observed event costs one point of selection priority,
        // whether or not it produces speech.
        self.priority.fetch_sub(1, Ordering::SeqCst);

        if change.member.id == self.conn.identity().id {
            if change.after != change.before {
                // Relocating or disconnecting: pending announcements for
                // the old room are meaningless.
                self.queue.lock().await.clear();
                debug!("own room changed, cleared greeter queue");
            }
            return;
        }

        let Some(room) = self.conn.current_room() else {
            return;
        };
        if change.after == change.before {
            return;
        }

        let subject = if change.member.automated {
            SERVICE_DROID.to_string()
        } else {
            change.member.display_name.clone()
        };

        {
            let mut queue = self.queue.lock().await;
            if change.after.as_ref() == Some(&room) {
                queue.add_welcome(&subject);
            } else if change.before.as_ref() == Some(&room) {
                queue.add_goodbye(&subject);
            } else {
                // Movement elsewhere on the platform.
                return;
            }
        }
        self.drain_wake.notify_one();
    }

    /// Long-lived drain task: wakes whenever the state machine enqueues,
    /// settles, then drains. Runs until the connection closes and the
    /// supervisor tears it down.
    pub async fn run_drain_loop(self: Arc<Self>) {
        loop {
            self.drain_wake.notified().await;
            if self.conn.is_closed() {
                break;
            }

            tokio::time::sleep(self.timing.settle).await;
            if let Some(room) = self.conn.current_room() {
                if self.human_count(&room).await == 1 {
                    tokio::time::sleep(self.timing.lone_listener_extra).await;
                }
            }

            self.drain().await;
        }
    }

    /// Plays queued announcements one at a time until the queue empties.
    ///
    /// An announcement is only popped once its playback has started; a
    /// lost busy race backs off and retries the same entry. A drain that
    /// finds the room empty of real occupants clears the whole queue
    /// instead of speaking into it.
    pub async fn drain(&self) {
        loop {
            let front = self.queue.lock().await.peek_front().cloned();
            let Some(entry) = front else {
                break;
            };

            wait_idle(self.playback.as_ref(), self.timing.playback_poll).await;

            let Some(room) = self.conn.current_room() else {
                self.queue.lock().await.clear();
                break;
            };
            if self.human_count(&room).await == 0 {
                debug!("clearing queue, nobody there to hear anything");
                self.queue.lock().await.clear();
                break;
            }

            let synth = self.synthesizer().await;
            let path = match synth.say(&entry.text()).await {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "synthesis failed, keeping entry for next drain");
                    break;
                }
            };

            match self.playback.start(&path) {
                Ok(()) => {
                    self.queue.lock().await.pop_front();
                }
                Err(PlaybackError::Busy) => {
                    // Lost the race against another in-flight playback;
                    // retry the same entry without popping it.
                    tokio::time::sleep(self.timing.busy_backoff).await;
                }
                Err(e) => {
                    warn!(error = %e, "player failed to start");
                    tokio::time::sleep(self.timing.busy_backoff).await;
                }
            }
        }
    }

    /// Speaks a one-off line outside the greeter queue (online/offline
    /// confirmations). With `wait`, returns only once playback finished.
    pub async fn announce(&self, text: &str, wait: bool) {
        if self.conn.current_room().is_none() {
            debug!(text, "no voice session to announce into");
            return;
        }

        let synth = self.synthesizer().await;
        let path = match synth.say(text).await {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, text, "announcement synthesis failed");
                return;
            }
        };

        wait_idle(self.playback.as_ref(), self.timing.playback_poll).await;
        loop {
            match self.playback.start(&path) {
                Ok(()) => break,
                Err(PlaybackError::Busy) => {
                    tokio::time::sleep(self.timing.busy_backoff).await;
                }
                Err(e) => {
                    warn!(error = %e, text, "announcement playback failed");
                    return;
                }
            }
        }

        if wait {
            debug!(text, "waiting for announcement to finish");
            wait_idle(self.playback.as_ref(), self.timing.playback_poll).await;
        }
    }

    /// Connects to `room` and speaks the online announcement.
    pub async fn go_online(&self, room: &RoomId) -> Result<(), PoolError> {
        self.conn.join_room(room).await?;
        self.announce(ONLINE_ANNOUNCEMENT, false).await;
        Ok(())
    }

    /// Speaks the offline announcement to completion, then leaves the
    /// room. The self membership event takes care of clearing the queue.
    pub async fn go_offline(&self) -> Result<(), PoolError> {
        self.announce(OFFLINE_ANNOUNCEMENT, true).await;
        self.conn.leave_room().await
    }
}

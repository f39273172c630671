//! The pool controller: agent registry, selection policy, supervised
//! restart loops, the inactivity reaper, and pool-wide lifecycle.

use crate::agent::{AgentTiming, VoiceAgent, ONLINE_ANNOUNCEMENT};
use crate::gateway::{Connection, Gateway, PlatformEvent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tannoy_types::{MemberId, RoomId, Secret};
use tannoy_voice::{Playback, Synthesizer};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Factory for per-agent playback engines; each connection gets its own
/// audio channel.
pub type PlaybackFactory = Box<dyn Fn() -> Arc<dyn Playback> + Send + Sync>;

/// Probabilistic maintenance policy: idle agents are occasionally torn
/// down on purpose to free and cycle capacity. The supervisor reconnects
/// them immediately, so the observable effect is a fresh connection.
#[derive(Debug, Clone)]
pub struct ReaperPolicy {
    /// Base sleep between activity checks.
    pub check_interval: Duration,
    /// Random extra sleep added to each check, de-synchronizing reapers
    /// across a large pool.
    pub jitter: Duration,
    /// Chance per check that an inactive agent is torn down.
    pub teardown_probability: f64,
}

impl Default for ReaperPolicy {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            jitter: Duration::from_secs(30),
            teardown_probability: 0.02,
        }
    }
}

/// Pool-level configuration.
pub struct PoolConfig {
    /// Connection secrets, one agent each. Order is significant: it is
    /// the enumeration order used for selection tie-breaks.
    pub tokens: Vec<Secret>,
    /// Identities allowed to run privileged commands.
    pub admins: Vec<MemberId>,
    /// Leading token a chat message must start with to be a command.
    pub command_prefix: String,
    /// Voice used when a `voice` command names none.
    pub default_voice: String,
    /// Scratch directory for synthesized audio.
    pub scratch_dir: PathBuf,
    /// Starting priority for every fresh agent.
    pub base_priority: i64,
    pub timing: AgentTiming,
    pub reaper: ReaperPolicy,
    /// Seed for the reaper's random source; `None` seeds from entropy.
    /// Tests pin this to make teardown decisions reproducible.
    pub reaper_seed: Option<u64>,
    /// Pause between reconnect attempts after a failed connection.
    pub reconnect_backoff: Duration,
    /// Where the active voice name is persisted after a `voice` command.
    pub voice_file: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            admins: Vec::new(),
            command_prefix: "!tannoy".to_string(),
            default_voice: "festival".to_string(),
            scratch_dir: PathBuf::from("temp"),
            base_priority: 0,
            timing: AgentTiming::default(),
            reaper: ReaperPolicy::default(),
            reaper_seed: None,
            reconnect_backoff: Duration::from_secs(5),
            voice_file: None,
        }
    }
}

/// Owns the set of agents and coordinates everything that spans more
/// than one of them.
pub struct PoolController {
    pub(crate) config: PoolConfig,
    gateway: Arc<dyn Gateway>,
    playback_factory: PlaybackFactory,
    synth: RwLock<Arc<Synthesizer>>,
    agents: RwLock<HashMap<Secret, Arc<VoiceAgent>>>,
    running: AtomicBool,
    pub(crate) seen_messages: tokio::sync::Mutex<crate::command::SeenMessages>,
}

impl PoolController {
    pub fn new(
        config: PoolConfig,
        gateway: Arc<dyn Gateway>,
        synth: Arc<Synthesizer>,
        playback_factory: PlaybackFactory,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            gateway,
            playback_factory,
            synth: RwLock::new(synth),
            agents: RwLock::new(HashMap::new()),
            running: AtomicBool::new(true),
            seen_messages: tokio::sync::Mutex::new(crate::command::SeenMessages::default()),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// The process-wide active synthesizer.
    pub async fn active_synthesizer(&self) -> Arc<Synthesizer> {
        Arc::clone(&*self.synth.read().await)
    }

    /// Runs one supervised loop per configured token; returns once the
    /// pool has shut down and every loop has exited.
    pub async fn run(self: Arc<Self>) {
        info!(agents = self.config.tokens.len(), "starting agent pool");
        let mut handles = Vec::new();
        for token in self.config.tokens.clone() {
            let controller = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                controller.supervise(token).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        info!("agent pool stopped");
    }

    /// One token's lifecycle: connect, register, pump events until the
    /// connection ends, deregister, reconnect — forever, until the pool
    /// stops running.
    async fn supervise(self: Arc<Self>, token: Secret) {
        while self.is_running() {
            info!(token = %token, "starting agent");
            let (conn, mut events) = match self.gateway.connect(&token).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(token = %token, error = %e, "connection attempt failed");
                    tokio::time::sleep(self.config.reconnect_backoff).await;
                    continue;
                }
            };

            // A shutdown can land between the running check and the
            // connect finishing; such a connection is closed, not served.
            if !self.is_running() {
                conn.close().await;
                break;
            }

            let agent = VoiceAgent::new(
                conn,
                (self.playback_factory)(),
                self.active_synthesizer().await,
                self.config.base_priority,
                self.config.timing.clone(),
            );
            self.register_agent(token.clone(), Arc::clone(&agent)).await;

            let drain = tokio::spawn(Arc::clone(&agent).run_drain_loop());
            let reaper = tokio::spawn(Self::reap_when_idle(
                Arc::clone(&agent),
                self.config.reaper.clone(),
                self.config.reaper_seed,
            ));

            while let Some(event) = events.recv().await {
                match event {
                    PlatformEvent::Membership(change) => agent.handle_membership(&change).await,
                    PlatformEvent::Message(message) => {
                        self.dispatch_message(&agent, &message).await
                    }
                }
            }

            drain.abort();
            reaper.abort();
            self.deregister_agent(&token).await;
            info!(token = %token, "agent connection ended");
        }
    }

    /// Registers a freshly connected agent under its token. Called by the
    /// supervisor; public so tests can assemble pools by hand.
    pub async fn register_agent(&self, token: Secret, agent: Arc<VoiceAgent>) {
        self.agents.write().await.insert(token, agent);
    }

    pub async fn deregister_agent(&self, token: &Secret) {
        self.agents.write().await.remove(token);
    }

    /// Periodically checks one agent for inactivity and, on a coin flip,
    /// tears its connection down to cycle capacity.
    async fn reap_when_idle(agent: Arc<VoiceAgent>, policy: ReaperPolicy, seed: Option<u64>) {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        loop {
            let jitter = policy.jitter.mul_f64(rng.gen::<f64>());
            tokio::time::sleep(policy.check_interval + jitter).await;

            if agent.is_closed() {
                break;
            }
            if agent.is_active().await {
                continue;
            }
            if rng.gen::<f64>() < policy.teardown_probability {
                info!("tearing down idle agent to cycle capacity");
                agent.connection().close().await;
                break;
            }
        }
    }

    /// Among agents whose connection is open and that satisfy `pred`,
    /// picks the one with the highest priority; ties go to the first in
    /// token order. Stable and deterministic across repeated calls.
    pub async fn select_agent<F, Fut>(&self, pred: F) -> Option<Arc<VoiceAgent>>
    where
        F: Fn(Arc<VoiceAgent>) -> Fut,
        Fut: Future<Output = bool>,
    {
        let agents = self.agents.read().await;
        let mut best: Option<(i64, Arc<VoiceAgent>)> = None;
        for token in &self.config.tokens {
            let Some(agent) = agents.get(token) else {
                continue;
            };
            if agent.is_closed() {
                continue;
            }
            if !pred(Arc::clone(agent)).await {
                continue;
            }
            let priority = agent.priority();
            match &best {
                Some((best_priority, _)) if *best_priority >= priority => {}
                _ => best = Some((priority, Arc::clone(agent))),
            }
        }
        best.map(|(_, agent)| agent)
    }

    /// The agent currently serving `room`, if any.
    pub async fn agent_serving(&self, room: &RoomId) -> Option<Arc<VoiceAgent>> {
        self.select_agent(|agent| {
            let room = room.clone();
            async move { agent.current_room().as_ref() == Some(&room) }
        })
        .await
    }

    /// An agent not serving any non-automated occupant anywhere.
    pub async fn idle_agent(&self) -> Option<Arc<VoiceAgent>> {
        self.select_agent(|agent| async move { !agent.is_active().await })
            .await
    }

    /// Any open agent at all; the last resort for delivering a
    /// no-capacity reply.
    pub async fn any_agent(&self) -> Option<Arc<VoiceAgent>> {
        self.select_agent(|_| async { true }).await
    }

    pub(crate) fn is_admin(&self, member: MemberId) -> bool {
        self.config.admins.contains(&member)
    }

    /// Replaces the process-wide active voice and propagates it to every
    /// live agent. Only after all agents hold the new reference does any
    /// of them speak the confirmation, so none confirms with a stale
    /// voice.
    pub async fn set_voice(&self, name: &str) {
        info!(voice = name, "switching active voice");
        let synth = Arc::new(Synthesizer::from_name(
            name,
            self.config.scratch_dir.clone(),
        ));
        *self.synth.write().await = Arc::clone(&synth);

        let agents = self.agents_in_token_order().await;
        for agent in &agents {
            agent.set_synthesizer(Arc::clone(&synth)).await;
        }
        for agent in &agents {
            agent.announce(ONLINE_ANNOUNCEMENT, false).await;
        }

        if let Some(path) = &self.config.voice_file {
            if let Err(e) = std::fs::write(path, format!("{}\n", name)) {
                warn!(path = %path.display(), error = %e, "failed to persist voice selection");
            }
        }
    }

    /// Flips the running flag and closes every live connection. The
    /// supervisor loops observe the flag and exit instead of
    /// reconnecting.
    pub async fn shutdown(&self) {
        info!("shutting down agent pool");
        self.running.store(false, Ordering::SeqCst);
        for agent in self.agents_in_token_order().await {
            agent.connection().close().await;
        }
    }

    async fn agents_in_token_order(&self) -> Vec<Arc<VoiceAgent>> {
        let agents = self.agents.read().await;
        self.config
            .tokens
            .iter()
            .filter_map(|token| agents.get(token).cloned())
            .collect()
    }
}

//! Orchestration core for the Tannoy voice agent pool.
//!
//! A pool of automated presence agents occupies voice rooms in a group
//! chat platform and speaks synthesized announcements when people join or
//! leave. This crate is the sequencing and coordination layer:
//!
//! - the per-agent greeter queue with subject-based cancellation,
//! - the membership state machine that classifies raw before/after room
//!   events into deduplicated announcements,
//! - the settle/drain discipline that plays them one at a time,
//! - the pool controller: selection policy, supervised restart loops, the
//!   inactivity reaper, and chat command dispatch.
//!
//! The platform transport, speech synthesis, and audio playback are all
//! external capabilities behind traits; an in-process loopback platform
//! backs integration tests and local development.

pub mod agent;
pub mod command;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod loopback;
pub mod queue;

pub use agent::{AgentTiming, VoiceAgent};
pub use command::Command;
pub use controller::{PoolConfig, PoolController, ReaperPolicy};
pub use error::PoolError;
pub use gateway::{ChatMessage, Connection, Gateway, PlatformEvent};
pub use loopback::LoopbackPlatform;
pub use queue::{Announcement, AnnouncementKind, GreeterQueue};

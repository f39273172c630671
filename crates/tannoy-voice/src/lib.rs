//! Voice output for the Tannoy agent pool.
//!
//! Turns announcement text into playable audio files and hands them to an
//! audio playback engine. Synthesis runs local CLI engines (Festival, SVOX
//! Pico, espeak-ng) behind a closed backend set, with an optional
//! pre-rendered phrase cache that falls back to a live engine on a miss.
//!
//! Playback is a deliberately thin boundary: start a file, ask whether it
//! is still playing, wait for idle. The drain logic in `tannoy-pool` builds
//! its sequencing guarantees on exactly those three operations.

pub mod error;
pub mod playback;
pub mod synth;

pub use error::{PlaybackError, VoiceError};
pub use playback::{detect_player, wait_idle, Playback, ProcessPlayer, IDLE_POLL_INTERVAL};
pub use synth::{cache_key, sanitize, Backend, Synthesizer};

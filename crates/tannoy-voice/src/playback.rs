//! Audio playback boundary.
//!
//! Synthesis hands over a filesystem path; playback consumes it. The
//! surface is intentionally small — start, busy check — because the drain
//! loops in `tannoy-pool` build their sequencing on polling those two
//! operations rather than on playback callbacks.

use crate::error::PlaybackError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

/// How often [`wait_idle`] re-checks a busy engine. Busy-polling is
/// bounded by this interval; nothing in the pool polls faster.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The audio playback capability.
pub trait Playback: Send + Sync {
    /// Starts playing the file at `path`. Fails with
    /// [`PlaybackError::Busy`] if something is already playing.
    fn start(&self, path: &Path) -> Result<(), PlaybackError>;

    /// Whether audio is currently playing.
    fn is_playing(&self) -> bool;
}

/// Polls `playback` until it reports idle, sleeping `poll` between checks.
pub async fn wait_idle(playback: &dyn Playback, poll: Duration) {
    while playback.is_playing() {
        tokio::time::sleep(poll).await;
    }
}

/// Plays audio files through the first available command-line player.
pub struct ProcessPlayer {
    player_bin: PathBuf,
    playing: Arc<AtomicBool>,
}

/// Candidate player binaries, in preference order.
const PLAYER_CANDIDATES: [&str; 3] = ["aplay", "paplay", "ffplay"];

/// The first candidate player binary found on `PATH`.
pub fn detect_player() -> Result<PathBuf, PlaybackError> {
    PLAYER_CANDIDATES
        .iter()
        .find_map(|name| find_in_path(name))
        .ok_or_else(|| {
            PlaybackError::Engine(format!(
                "no audio player found on PATH (tried {})",
                PLAYER_CANDIDATES.join(", ")
            ))
        })
}

impl ProcessPlayer {
    /// Picks the first player binary found on `PATH`.
    pub fn detect() -> Result<Self, PlaybackError> {
        detect_player().map(Self::with_binary)
    }

    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self {
            player_bin: bin.into(),
            playing: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Playback for ProcessPlayer {
    fn start(&self, path: &Path) -> Result<(), PlaybackError> {
        // swap returns the previous value: true means a playback is still
        // in flight and the flag must stay set.
        if self.playing.swap(true, Ordering::SeqCst) {
            return Err(PlaybackError::Busy);
        }

        let mut command = Command::new(&self.player_bin);
        if self
            .player_bin
            .file_name()
            .is_some_and(|name| name == "ffplay")
        {
            command.args(["-nodisp", "-autoexit", "-loglevel", "quiet"]);
        }
        command
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.playing.store(false, Ordering::SeqCst);
                return Err(PlaybackError::Engine(format!(
                    "failed to spawn {}: {}",
                    self.player_bin.display(),
                    e
                )));
            }
        };

        let playing = Arc::clone(&self.playing);
        let player = self.player_bin.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(player = %player.display(), %status, "player exited with error");
                }
                Err(e) => {
                    warn!(player = %player.display(), "failed to wait for player: {}", e);
                }
                Ok(_) => {}
            }
            playing.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubPlayback {
        playing: AtomicBool,
    }

    impl Playback for StubPlayback {
        fn start(&self, _path: &Path) -> Result<(), PlaybackError> {
            if self.playing.swap(true, Ordering::SeqCst) {
                return Err(PlaybackError::Busy);
            }
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn starting_while_busy_reports_busy() {
        let playback = StubPlayback {
            playing: AtomicBool::new(false),
        };
        playback.start(Path::new("a.wav")).unwrap();
        assert!(matches!(
            playback.start(Path::new("b.wav")),
            Err(PlaybackError::Busy)
        ));
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_idle() {
        let playback = StubPlayback {
            playing: AtomicBool::new(false),
        };
        wait_idle(&playback, Duration::from_millis(1)).await;
        assert!(!playback.is_playing());
    }
}

//! Bot configuration: a TOML tuning file with environment overrides,
//! plus the legacy line-oriented files that hold the operational state
//! (connection secrets, admin identities, active voice name).
//!
//! Missing files are tolerated everywhere: the TOML file falls back to
//! defaults and each line file falls back to empty/default with a
//! warning. Unreadable or unparsable files are errors.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tannoy_pool::{AgentTiming, PoolConfig, ReaperPolicy};
use tannoy_types::{MemberId, Secret};
use thiserror::Error;

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Paths of the line-oriented state files.
    #[serde(default)]
    pub files: FilesConfig,

    /// Voice and audio settings.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Pool timing and policy settings.
    #[serde(default)]
    pub pool: PoolSettings,

    /// Inactivity reaper settings.
    #[serde(default)]
    pub reaper: ReaperSettings,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "tannoy_pool=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Where the line-oriented state files live.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Connection secrets, one per line.
    #[serde(default = "default_tokens_path")]
    pub tokens: PathBuf,

    /// Admin identities, one integer per line.
    #[serde(default = "default_admins_path")]
    pub admins: PathBuf,

    /// Single-line active voice name.
    #[serde(default = "default_voice_path")]
    pub voice: PathBuf,
}

/// Voice and audio settings.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// Voice used when the voice file is absent or a `voice` command
    /// names none.
    #[serde(default = "default_voice_name")]
    pub default: String,

    /// Scratch directory for synthesized audio.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Explicit player binary; auto-detected when unset.
    #[serde(default)]
    pub player: Option<PathBuf>,
}

/// Pool timing and policy settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    /// Leading token a chat message must start with to be a command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Starting priority for every fresh agent.
    #[serde(default)]
    pub base_priority: i64,

    /// Settle delay between enqueueing an announcement and draining.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Extra delay before draining to a single remaining listener.
    #[serde(default = "default_lone_listener_extra_ms")]
    pub lone_listener_extra_ms: u64,

    /// Playback idle poll interval.
    #[serde(default = "default_playback_poll_ms")]
    pub playback_poll_ms: u64,

    /// Backoff after a playback-busy race.
    #[serde(default = "default_busy_backoff_ms")]
    pub busy_backoff_ms: u64,

    /// Pause between reconnect attempts after a connection failure.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

/// Inactivity reaper settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReaperSettings {
    /// Base sleep between activity checks.
    #[serde(default = "default_reaper_interval_secs")]
    pub check_interval_secs: u64,

    /// Random extra sleep added to each check.
    #[serde(default = "default_reaper_jitter_secs")]
    pub jitter_secs: u64,

    /// Chance per check that an inactive agent is torn down.
    #[serde(default = "default_teardown_probability")]
    pub teardown_probability: f64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tokens_path() -> PathBuf {
    PathBuf::from("tokens.txt")
}

fn default_admins_path() -> PathBuf {
    PathBuf::from("admins.txt")
}

fn default_voice_path() -> PathBuf {
    PathBuf::from("voice.txt")
}

fn default_voice_name() -> String {
    "festival".to_string()
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_command_prefix() -> String {
    "!tannoy".to_string()
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_lone_listener_extra_ms() -> u64 {
    1000
}

fn default_playback_poll_ms() -> u64 {
    100
}

fn default_busy_backoff_ms() -> u64 {
    100
}

fn default_reconnect_backoff_ms() -> u64 {
    5000
}

fn default_reaper_interval_secs() -> u64 {
    60
}

fn default_reaper_jitter_secs() -> u64 {
    30
}

fn default_teardown_probability() -> f64 {
    0.02
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            tokens: default_tokens_path(),
            admins: default_admins_path(),
            voice: default_voice_path(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            default: default_voice_name(),
            scratch_dir: default_scratch_dir(),
            player: None,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            base_priority: 0,
            settle_ms: default_settle_ms(),
            lone_listener_extra_ms: default_lone_listener_extra_ms(),
            playback_poll_ms: default_playback_poll_ms(),
            busy_backoff_ms: default_busy_backoff_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
        }
    }
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: default_reaper_interval_secs(),
            jitter_secs: default_reaper_jitter_secs(),
            teardown_probability: default_teardown_probability(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults when
/// the file is absent.
///
/// Environment variable overrides:
/// - `TANNOY_LOG_LEVEL` overrides `logging.level`
/// - `TANNOY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `TANNOY_TOKENS_PATH` overrides `files.tokens`
/// - `TANNOY_ADMINS_PATH` overrides `files.admins`
/// - `TANNOY_VOICE_PATH` overrides `files.voice`
/// - `TANNOY_COMMAND_PREFIX` overrides `pool.command_prefix`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(level) = std::env::var("TANNOY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("TANNOY_LOG_JSON") {
        config.logging.json = json == "true";
    }
    if let Ok(tokens) = std::env::var("TANNOY_TOKENS_PATH") {
        config.files.tokens = PathBuf::from(tokens);
    }
    if let Ok(admins) = std::env::var("TANNOY_ADMINS_PATH") {
        config.files.admins = PathBuf::from(admins);
    }
    if let Ok(voice) = std::env::var("TANNOY_VOICE_PATH") {
        config.files.voice = PathBuf::from(voice);
    }
    if let Ok(prefix) = std::env::var("TANNOY_COMMAND_PREFIX") {
        config.pool.command_prefix = prefix;
    }

    Ok(config)
}

/// Reads the non-empty trimmed lines of a file; a missing file is a
/// warning plus an empty list, never fatal.
fn load_lines(path: &Path, what: &str) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "could not find {} file", what);
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read {} file", what);
            Vec::new()
        }
    }
}

/// Connection secrets, one per line.
pub fn load_tokens(path: &Path) -> Vec<Secret> {
    load_lines(path, "tokens").into_iter().map(Secret::new).collect()
}

/// Admin identities, one integer per line. Lines that do not parse are
/// skipped with a warning.
pub fn load_admins(path: &Path) -> Vec<MemberId> {
    load_lines(path, "admins")
        .into_iter()
        .filter_map(|line| match line.parse::<u64>() {
            Ok(id) => Some(MemberId(id)),
            Err(_) => {
                tracing::warn!(line, "skipping unparsable admin id");
                None
            }
        })
        .collect()
}

/// The active voice name: the file's first non-empty line, or `default`.
pub fn load_voice_name(path: &Path, default: &str) -> String {
    load_lines(path, "voice")
        .into_iter()
        .next()
        .unwrap_or_else(|| default.to_string())
}

/// Writes the state files back in normalized form, mirroring what was
/// loaded. Failures are warnings; the bot runs on regardless.
pub fn write_back_state(
    files: &FilesConfig,
    tokens: &[Secret],
    admins: &[MemberId],
    voice: &str,
) {
    let tokens_text: String = tokens
        .iter()
        .map(|token| format!("{}\n", token.reveal()))
        .collect();
    if let Err(e) = std::fs::write(&files.tokens, tokens_text) {
        tracing::warn!(path = %files.tokens.display(), error = %e, "could not write tokens file");
    }

    let admins_text: String = admins.iter().map(|id| format!("{}\n", id)).collect();
    if let Err(e) = std::fs::write(&files.admins, admins_text) {
        tracing::warn!(path = %files.admins.display(), error = %e, "could not write admins file");
    }

    if let Err(e) = std::fs::write(&files.voice, format!("{}\n", voice)) {
        tracing::warn!(path = %files.voice.display(), error = %e, "could not write voice file");
    }
}

impl Config {
    /// Assembles the pool configuration from the tuning file and the
    /// loaded state files.
    pub fn pool_config(&self, tokens: Vec<Secret>, admins: Vec<MemberId>) -> PoolConfig {
        PoolConfig {
            tokens,
            admins,
            command_prefix: self.pool.command_prefix.clone(),
            default_voice: self.voice.default.clone(),
            scratch_dir: self.voice.scratch_dir.clone(),
            base_priority: self.pool.base_priority,
            timing: AgentTiming {
                settle: Duration::from_millis(self.pool.settle_ms),
                lone_listener_extra: Duration::from_millis(self.pool.lone_listener_extra_ms),
                playback_poll: Duration::from_millis(self.pool.playback_poll_ms),
                busy_backoff: Duration::from_millis(self.pool.busy_backoff_ms),
            },
            reaper: ReaperPolicy {
                check_interval: Duration::from_secs(self.reaper.check_interval_secs),
                jitter: Duration::from_secs(self.reaper.jitter_secs),
                teardown_probability: self.reaper.teardown_probability,
            },
            reaper_seed: None,
            reconnect_backoff: Duration::from_millis(self.pool.reconnect_backoff_ms),
            voice_file: Some(self.files.voice.clone()),
        }
    }
}

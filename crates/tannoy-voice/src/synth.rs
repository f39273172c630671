//! Speech synthesis: closed backend set with cached-phrase fallback.
//!
//! Every backend renders to a WAV file and returns its path; the playback
//! side only ever sees paths. The `Cached` backend looks up pre-rendered
//! phrases in a directory and delegates to its fallback on a miss, so
//! caches can be stacked over any live engine.

use crate::error::VoiceError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Timeout for a synthesis subprocess.
const SYNTH_TIMEOUT: Duration = Duration::from_secs(60);

/// Festival voice selection passed to `text2wave`.
const FESTIVAL_VOICE: &str = "(voice_cmu_us_slt_arctic_hts)";

/// Strips announcement text down to the characters the engines are trusted
/// with: ASCII letters, digits, space, and `,.?!`. Everything else is
/// dropped silently, not escaped and not rejected.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | ',' | '.' | '?' | '!'))
        .collect()
}

/// Normalizes a message to its cached-phrase filename stem: lowercase
/// ASCII letters and spaces only.
pub fn cache_key(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || *c == ' ')
        .collect()
}

/// The closed set of synthesis backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Festival `text2wave` CLI.
    Festival,
    /// SVOX Pico `pico2wave` CLI.
    Pico,
    /// `espeak-ng` CLI.
    Espeak,
    /// Pre-rendered phrase directory, delegating to `fallback` on a miss.
    /// Fallbacks may themselves be cached, so caches chain to any depth;
    /// the boxed recursion bottoms out at a live engine.
    Cached {
        dir: PathBuf,
        fallback: Box<Backend>,
    },
}

impl Backend {
    /// Resolves a configured voice name. Known engine names select that
    /// engine; any other value is treated as a cache directory layered
    /// over Festival.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "festival" => Self::Festival,
            "pico" => Self::Pico,
            "espeak" => Self::Espeak,
            other => Self::Cached {
                dir: PathBuf::from(other),
                fallback: Box::new(Self::Festival),
            },
        }
    }

    /// The live engine at the bottom of the fallback chain.
    fn base_engine(&self) -> &Backend {
        let mut backend = self;
        while let Backend::Cached { fallback, .. } = backend {
            backend = fallback;
        }
        backend
    }
}

/// Renders announcement text to playable audio files.
///
/// One synthesizer is shared by every agent in the pool; swapping the
/// active voice replaces the whole `Arc`, never mutates in place.
#[derive(Debug)]
pub struct Synthesizer {
    name: String,
    backend: Backend,
    scratch_dir: PathBuf,
}

impl Synthesizer {
    pub fn new(name: impl Into<String>, backend: Backend, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            backend,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Builds a synthesizer from a configured voice name, see
    /// [`Backend::from_name`].
    pub fn from_name(name: &str, scratch_dir: impl Into<PathBuf>) -> Self {
        Self::new(name, Backend::from_name(name), scratch_dir)
    }

    /// The configured voice name, as persisted in the voice config file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Synthesizes `text` and returns the path of a playable audio file.
    ///
    /// Walks the cached-phrase chain first; a live engine renders into a
    /// fresh scratch file. Fails only if the engine itself errors.
    pub async fn say(&self, text: &str) -> Result<PathBuf, VoiceError> {
        let text = sanitize(text);

        let mut backend = &self.backend;
        loop {
            match backend {
                Backend::Cached { dir, fallback } => {
                    let cached = dir.join(format!("{}.wav", cache_key(&text)));
                    if cached.is_file() {
                        debug!(path = %cached.display(), "cached phrase hit");
                        return Ok(cached);
                    }
                    debug!(path = %cached.display(), "cached phrase miss, falling back");
                    backend = fallback;
                }
                engine => {
                    let output = self.scratch_path().await?;
                    render_engine(engine, &text, &output).await?;
                    return Ok(output);
                }
            }
        }
    }

    /// Renders each phrase into `dir` under its cache-key filename, using
    /// the live engine at the bottom of this synthesizer's chain. Lets an
    /// operator pre-render the fixed announcements a cached backend serves.
    pub async fn prime_cache(
        &self,
        dir: impl AsRef<Path>,
        phrases: &[&str],
    ) -> Result<(), VoiceError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let engine = self.backend.base_engine();
        for phrase in phrases {
            let text = sanitize(phrase);
            let output = dir.join(format!("{}.wav", cache_key(&text)));
            render_engine(engine, &text, &output).await?;
        }
        Ok(())
    }

    /// A collision-free output path; multiple agents synthesize
    /// concurrently into the same scratch directory.
    async fn scratch_path(&self) -> Result<PathBuf, VoiceError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        Ok(self
            .scratch_dir
            .join(format!("voice_{}.wav", uuid::Uuid::new_v4().simple())))
    }
}

/// Runs one live engine, writing a WAV file to `output`.
async fn render_engine(engine: &Backend, text: &str, output: &Path) -> Result<(), VoiceError> {
    match engine {
        Backend::Festival => render_festival(text, output).await,
        Backend::Pico => render_pico(text, output).await,
        Backend::Espeak => render_espeak(text, output).await,
        Backend::Cached { .. } => unreachable!("cached backends never render directly"),
    }
}

async fn render_festival(text: &str, output: &Path) -> Result<(), VoiceError> {
    let mut command = Command::new("text2wave");
    command
        .arg("-eval")
        .arg(FESTIVAL_VOICE)
        .arg("-o")
        .arg(output)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| VoiceError::Synthesis(format!("failed to spawn text2wave: {}", e)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| VoiceError::Synthesis("failed to open text2wave stdin".to_string()))?;
    let text_owned = text.to_string();

    // Write from a separate task to avoid deadlock if the output buffer fills.
    let write_task = tokio::spawn(async move { stdin.write_all(text_owned.as_bytes()).await });

    let result = wait_engine("text2wave", child).await;

    match write_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(VoiceError::Synthesis(format!(
                "failed to write to text2wave stdin: {}",
                e
            )))
        }
        Err(e) => return Err(VoiceError::Synthesis(format!("stdin task failed: {}", e))),
    }

    result
}

async fn render_pico(text: &str, output: &Path) -> Result<(), VoiceError> {
    let mut command = Command::new("pico2wave");
    command
        .arg("-w")
        .arg(output)
        .arg(text)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = command
        .spawn()
        .map_err(|e| VoiceError::Synthesis(format!("failed to spawn pico2wave: {}", e)))?;
    wait_engine("pico2wave", child).await
}

async fn render_espeak(text: &str, output: &Path) -> Result<(), VoiceError> {
    let mut command = Command::new("espeak-ng");
    command
        .arg("-w")
        .arg(output)
        .arg(text)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = command
        .spawn()
        .map_err(|e| VoiceError::Synthesis(format!("failed to spawn espeak-ng: {}", e)))?;
    wait_engine("espeak-ng", child).await
}

/// Waits for an engine subprocess under [`SYNTH_TIMEOUT`] and turns a
/// non-zero exit into a synthesis error carrying stderr.
async fn wait_engine(engine: &str, child: tokio::process::Child) -> Result<(), VoiceError> {
    let output = tokio::time::timeout(SYNTH_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| {
            VoiceError::Synthesis(format!(
                "{} timed out after {} seconds",
                engine,
                SYNTH_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| VoiceError::Synthesis(format!("failed to wait for {}: {}", engine, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VoiceError::Synthesis(format!(
            "{} failed: {}",
            engine, stderr
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_letters_digits_and_basic_punctuation() {
        assert_eq!(sanitize("Hello, Ann! 99%"), "Hello, Ann! 99");
        assert_eq!(sanitize("rm -rf /; echo $(pwd)"), "rm rf  echo pwd");
        assert_eq!(sanitize("Ça va?"), "a va?");
    }

    #[test]
    fn cache_key_is_lowercase_letters_and_spaces() {
        assert_eq!(cache_key("Welcome Ann"), "welcome ann");
        assert_eq!(cache_key("Tannoy online 24.7!"), "tannoy online ");
    }

    #[test]
    fn from_name_resolves_engines_and_cache_dirs() {
        assert_eq!(Backend::from_name("Festival"), Backend::Festival);
        assert_eq!(Backend::from_name("pico"), Backend::Pico);
        assert_eq!(Backend::from_name("espeak"), Backend::Espeak);
        assert_eq!(
            Backend::from_name("phrases/common"),
            Backend::Cached {
                dir: PathBuf::from("phrases/common"),
                fallback: Box::new(Backend::Festival),
            }
        );
    }

    #[test]
    fn base_engine_walks_the_chain() {
        let chained = Backend::Cached {
            dir: PathBuf::from("outer"),
            fallback: Box::new(Backend::Cached {
                dir: PathBuf::from("inner"),
                fallback: Box::new(Backend::Pico),
            }),
        };
        assert_eq!(chained.base_engine(), &Backend::Pico);
    }
}

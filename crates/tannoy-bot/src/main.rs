//! Tannoy bot binary — entry point for the voice agent pool.
//!
//! Loads configuration, initializes structured logging, assembles the
//! pool over the platform gateway, and runs until an admin `shutdown`
//! command or a SIGTERM/SIGINT arrives.
//!
//! The platform transport is pluggable behind the gateway traits in
//! `tannoy-pool`; this build wires the in-process loopback platform used
//! for local development, which is where a concrete platform adapter
//! slots in.

mod config;

use std::sync::Arc;
use tannoy_pool::{LoopbackPlatform, PoolController};
use tannoy_voice::{detect_player, Playback, ProcessPlayer, Synthesizer};
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("TANNOY_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the bot cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Load the line-oriented state files and write them back normalized.
    let tokens = config::load_tokens(&config.files.tokens);
    let admins = config::load_admins(&config.files.admins);
    let voice_name = config::load_voice_name(&config.files.voice, &config.voice.default);
    config::write_back_state(&config.files, &tokens, &admins, voice_name.as_str());

    tracing::info!(
        tokens = tokens.len(),
        admins = admins.len(),
        voice = %voice_name,
        "loaded pool state"
    );

    if tokens.is_empty() {
        tracing::error!(
            path = %config.files.tokens.display(),
            "at least one connection secret must be provided"
        );
        return;
    }

    // Active voice, shared by every agent until a `voice` command swaps it.
    let synth = Arc::new(Synthesizer::from_name(
        &voice_name,
        config.voice.scratch_dir.clone(),
    ));

    // One playback engine per agent, all using the same player binary.
    let player_bin = match &config.voice.player {
        Some(bin) => bin.clone(),
        None => detect_player()
            .expect("no audio player found — install aplay, paplay, or ffplay"),
    };
    tracing::info!(player = %player_bin.display(), "using audio player");

    let playback_factory: Box<dyn Fn() -> Arc<dyn Playback> + Send + Sync> =
        Box::new(move || Arc::new(ProcessPlayer::with_binary(player_bin.clone())) as Arc<dyn Playback>);

    let platform = Arc::new(LoopbackPlatform::new());
    let controller = PoolController::new(
        config.pool_config(tokens, admins),
        platform,
        synth,
        playback_factory,
    );

    let runner = Arc::clone(&controller);
    let mut run = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        _ = &mut run => {
            tracing::info!("pool stopped on its own (shutdown command)");
        }
        () = shutdown_signal() => {
            controller.shutdown().await;
            let _ = run.await;
        }
    }

    tracing::info!("tannoy bot shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}

//! Selection-policy tests: predicate filtering, priority ordering, and
//! deterministic tie-breaking over the configured token order.

use std::path::Path;
use std::sync::Arc;
use tannoy_pool::{
    AgentTiming, Connection, Gateway, LoopbackPlatform, PoolConfig, PoolController, VoiceAgent,
};
use tannoy_types::Secret;
use tannoy_voice::{Backend, Playback, PlaybackError, Synthesizer};

struct NullPlayback;

impl Playback for NullPlayback {
    fn start(&self, _path: &Path) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn is_playing(&self) -> bool {
        false
    }
}

fn test_synth(dir: &Path) -> Arc<Synthesizer> {
    Arc::new(Synthesizer::new(
        "festival",
        Backend::Festival,
        dir.join("scratch"),
    ))
}

fn controller_for(tokens: &[Secret], platform: &LoopbackPlatform, dir: &Path) -> Arc<PoolController> {
    let config = PoolConfig {
        tokens: tokens.to_vec(),
        scratch_dir: dir.join("scratch"),
        ..PoolConfig::default()
    };
    PoolController::new(
        config,
        Arc::new(platform.clone()),
        test_synth(dir),
        Box::new(|| Arc::new(NullPlayback) as Arc<dyn Playback>),
    )
}

/// Connects an agent for `token` with a pinned starting priority and
/// registers it, the way the supervisor would.
async fn register(
    controller: &Arc<PoolController>,
    platform: &LoopbackPlatform,
    token: &Secret,
    priority: i64,
    dir: &Path,
) -> Arc<VoiceAgent> {
    let (conn, _events) = platform.connect(token).await.unwrap();
    let agent = VoiceAgent::new(
        conn,
        Arc::new(NullPlayback),
        test_synth(dir),
        priority,
        AgentTiming::default(),
    );
    controller
        .register_agent(token.clone(), Arc::clone(&agent))
        .await;
    agent
}

#[tokio::test]
async fn no_matching_agent_selects_none() {
    let dir = tempfile::tempdir().unwrap();
    let platform = LoopbackPlatform::new();
    let tokens = [Secret::new("alpha-token"), Secret::new("bravo-token")];
    let controller = controller_for(&tokens, &platform, dir.path());

    // Empty pool.
    assert!(controller.any_agent().await.is_none());

    register(&controller, &platform, &tokens[0], 10, dir.path()).await;
    let picked = controller.select_agent(|_| async { false }).await;
    assert!(picked.is_none());
}

#[tokio::test]
async fn a_single_match_wins_regardless_of_priority() {
    let dir = tempfile::tempdir().unwrap();
    let platform = LoopbackPlatform::new();
    let tokens = [Secret::new("alpha-token"), Secret::new("bravo-token")];
    let controller = controller_for(&tokens, &platform, dir.path());

    let low = register(&controller, &platform, &tokens[0], -100, dir.path()).await;
    let high = register(&controller, &platform, &tokens[1], 100, dir.path()).await;

    let low_priority = low.priority();
    let picked = controller
        .select_agent(move |agent| async move { agent.priority() == low_priority })
        .await
        .expect("one agent matches");
    assert!(Arc::ptr_eq(&picked, &low));
    assert!(!Arc::ptr_eq(&picked, &high));
}

#[tokio::test]
async fn strictly_highest_priority_wins() {
    let dir = tempfile::tempdir().unwrap();
    let platform = LoopbackPlatform::new();
    let tokens = [
        Secret::new("alpha-token"),
        Secret::new("bravo-token"),
        Secret::new("charlie-token"),
    ];
    let controller = controller_for(&tokens, &platform, dir.path());

    register(&controller, &platform, &tokens[0], 5, dir.path()).await;
    let best = register(&controller, &platform, &tokens[1], 9, dir.path()).await;
    register(&controller, &platform, &tokens[2], 7, dir.path()).await;

    let picked = controller.any_agent().await.expect("pool is non-empty");
    assert!(Arc::ptr_eq(&picked, &best));
}

#[tokio::test]
async fn exact_ties_break_to_the_first_token_deterministically() {
    let dir = tempfile::tempdir().unwrap();
    let platform = LoopbackPlatform::new();
    let tokens = [Secret::new("alpha-token"), Secret::new("bravo-token")];
    let controller = controller_for(&tokens, &platform, dir.path());

    let first = register(&controller, &platform, &tokens[0], 5, dir.path()).await;
    let second = register(&controller, &platform, &tokens[1], 5, dir.path()).await;

    for _ in 0..100 {
        let picked = controller.idle_agent().await.expect("both agents are idle");
        assert!(Arc::ptr_eq(&picked, &first));
        assert!(!Arc::ptr_eq(&picked, &second));
    }
}

#[tokio::test]
async fn closed_connections_are_never_selected() {
    let dir = tempfile::tempdir().unwrap();
    let platform = LoopbackPlatform::new();
    let tokens = [Secret::new("alpha-token"), Secret::new("bravo-token")];
    let controller = controller_for(&tokens, &platform, dir.path());

    let doomed = register(&controller, &platform, &tokens[0], 100, dir.path()).await;
    let survivor = register(&controller, &platform, &tokens[1], 1, dir.path()).await;

    doomed.connection().close().await;

    let picked = controller.any_agent().await.expect("one agent still open");
    assert!(Arc::ptr_eq(&picked, &survivor));
}

#[tokio::test]
async fn serving_and_idle_predicates_track_room_occupancy() {
    let dir = tempfile::tempdir().unwrap();
    let platform = LoopbackPlatform::new();
    let lounge = platform.add_room("lounge");
    let den = platform.add_room("den");
    let tokens = [Secret::new("alpha-token"), Secret::new("bravo-token")];
    let controller = controller_for(&tokens, &platform, dir.path());

    let serving = register(&controller, &platform, &tokens[0], 0, dir.path()).await;
    let idle = register(&controller, &platform, &tokens[1], 0, dir.path()).await;

    serving.connection().join_room(&lounge).await.unwrap();
    let ann = platform.add_member("Ann", false);
    platform.move_member(ann.id, Some(lounge.clone()));

    let found = controller.agent_serving(&lounge).await.expect("lounge is served");
    assert!(Arc::ptr_eq(&found, &serving));
    assert!(controller.agent_serving(&den).await.is_none());

    // The serving agent has an audience, so only the other one is idle.
    let picked = controller.idle_agent().await.expect("one agent is idle");
    assert!(Arc::ptr_eq(&picked, &idle));

    // An agent alone in a room with nobody but automated occupants
    // counts as idle too.
    idle.connection().join_room(&den).await.unwrap();
    let picked = controller.idle_agent().await.expect("empty room is still idle");
    assert!(Arc::ptr_eq(&picked, &idle));
}

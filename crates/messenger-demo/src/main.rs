//! # Messenger Demo
//!
//! Runs a scoreboard on top of `tower-messaging`.
//!
//! ## Flow
//!
//! ```text
//! GameClock ──Tick──→ global scope ──→ Scoreboard (state-bound)
//!                                  └─→ Announcer  (order 10)
//!
//! Player#N ──Score──→ instance#N scope ──→ per-player tally (order -1)
//!                                      └─→ Scoreboard forwarder
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Initialise telemetry from the environment
//! 2. Load messenger configuration (env, falling back to defaults)
//! 3. Register handlers
//! 4. Run a few rounds, then a cancelled slow publish
//! 5. Tear down player scopes and print metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use tower_messaging::{
    CancellationSource, CancellationToken, GlobalScope, Handler, InstanceId, Messenger,
    MessengerConfig, PublishingContext, SubscriptionSet,
};
use tower_telemetry::{init_telemetry, log_publish_report, messaging_span, TelemetryConfig};

/// A player scored.
#[derive(Debug, Clone)]
struct Score {
    player: u64,
    points: u64,
}

/// The game clock advanced one round.
#[derive(Debug, Clone, Copy)]
struct Tick(u32);

/// Asks every player handler to save; handlers take a while.
#[derive(Debug, Clone, Copy)]
struct Checkpoint;

#[derive(Debug, Default)]
struct Scoreboard {
    total: AtomicU64,
    rounds: AtomicU64,
}

const PLAYERS: u64 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::for_service("messenger-demo"))
        .context("failed to initialise telemetry")?;

    let config = MessengerConfig::from_env().unwrap_or_else(|e| {
        warn!(error = %e, "Invalid messenger configuration, using defaults");
        MessengerConfig::default()
    });

    // Global messages (ticks) and per-player messages (scores) live in two
    // messengers keyed by different scope types.
    let global = Messenger::<GlobalScope>::builder()
        .config(config.clone())
        .build()
        .context("global messenger")?;
    let players = Messenger::<InstanceId>::builder()
        .config(config)
        .build()
        .context("player messenger")?;

    let scoreboard = Arc::new(Scoreboard::default());
    let mut subscriptions = SubscriptionSet::new();

    // Scoreboard counts rounds; it is bound weakly to its state.
    global
        .subscriber()
        .global()
        .subscribe(Handler::with_state(&scoreboard, |board: &Scoreboard, _: Tick| {
            board.rounds.fetch_add(1, Ordering::SeqCst);
        }))
        .add_to(&mut subscriptions);

    // The announcer runs after everything else on the tick.
    let announcer_board = Arc::clone(&scoreboard);
    global
        .subscriber()
        .global()
        .subscribe_with_order(
            Handler::sync(move |tick: Tick| {
                info!(round = tick.0, total = announcer_board.total.load(Ordering::SeqCst), "Round complete");
            }),
            10,
        )
        .add_to(&mut subscriptions);

    let tallies: Vec<Arc<AtomicU64>> = (0..PLAYERS).map(|_| Arc::new(AtomicU64::new(0))).collect();
    for (player, tally) in (1..=PLAYERS).zip(&tallies) {
        let scope = players.subscriber().scope(InstanceId::new(player));

        let tally = Arc::clone(tally);
        scope
            .subscribe_with_order(
                Handler::sync(move |score: Score| {
                    let now = tally.fetch_add(score.points, Ordering::SeqCst) + score.points;
                    debug!(player = score.player, points = score.points, tally = now, "Score recorded");
                }),
                -1,
            )
            .add_to(&mut subscriptions);

        scope
            .subscribe(Handler::with_state(&scoreboard, |board: &Scoreboard, score: Score| {
                board.total.fetch_add(score.points, Ordering::SeqCst);
            }))
            .add_to(&mut subscriptions);

        scope
            .subscribe(Handler::future(move |_: Checkpoint| async move {
                tokio::time::sleep(Duration::from_millis(50 * player)).await;
                info!(player, "Checkpoint saved");
            }))
            .add_to(&mut subscriptions);
    }

    // Cached publishers resolve each player's broker once.
    let score_publishers: Vec<_> = (1..=PLAYERS)
        .map(|player| players.publisher().scope(InstanceId::new(player)).cache::<Score>())
        .collect();
    let ticks = global.publisher().global().cache::<Tick>();

    for round in 1..=3_u32 {
        let _span = messaging_span!("round", round).entered();
        for (player, publisher) in (1..=PLAYERS).zip(&score_publishers) {
            let points = u64::from(round) * player;
            publisher.publish(Score { player, points }, PublishingContext::get());
        }
        ticks.publish(Tick(round), PublishingContext::get());
    }

    // A checkpoint that takes too long: stop waiting, let the saves finish.
    let source = CancellationSource::new();
    let deadline = {
        let source = source.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(75)).await;
            source.cancel();
        })
    };
    let report = players
        .publisher()
        .scope(InstanceId::new(PLAYERS))
        .publish_async(Checkpoint, PublishingContext::get(), source.token())
        .await;
    log_publish_report!(info, "Checkpoint", report, "Checkpoint publish returned");
    deadline.await.context("deadline task")?;

    // Scoped teardown: removes every broker of player 1.
    let removed = players.vault().remove_scope(&InstanceId::new(1));
    info!(removed, "Player 1 left");
    score_publishers[0].publish(Score { player: 1, points: 100 }, PublishingContext::get());

    // Let detached checkpoint saves finish before reporting.
    players
        .publisher()
        .scope(InstanceId::new(2))
        .publish_async(Checkpoint, PublishingContext::get(), CancellationToken::none())
        .await;

    for (player, tally) in (1..=PLAYERS).zip(&tallies) {
        info!(player, points = tally.load(Ordering::SeqCst), "Final tally");
    }
    info!(
        total = scoreboard.total.load(Ordering::SeqCst),
        rounds = scoreboard.rounds.load(Ordering::SeqCst),
        "Scoreboard"
    );

    let disposed = subscriptions.dispose_all();
    info!(disposed, "Subscriptions disposed");

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "global": global.metrics().snapshot(),
            "players": players.metrics().snapshot(),
        }))?
    );

    Ok(())
}

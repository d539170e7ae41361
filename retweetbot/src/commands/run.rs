use anyhow::Result;
use retweetbot::config::BotConfig;
use retweetbot::dispatcher::Dispatcher;
use retweetbot::gate::RateLimitGate;
use retweetbot::stream::{StreamStats, run_stream};
use retweetbot::sweeper::RetrySweeper;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{RwLock, watch};
use tokio::time;
use tracing::{error, info};

/// Stream the hashtag and the bot's mentions until Ctrl+C
pub async fn execute(config: BotConfig) -> Result<()> {
    let (ctx, client) = super::connect(config).await?;
    let dispatcher = Dispatcher::new(&ctx)?;
    let track = ctx.config.track();

    info!(
        "Starting @{bot} for {track:?}, sweeping retries every {interval}s",
        bot = ctx.config.bot_name,
        interval = ctx.config.sweep_interval.as_secs()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        info!("Received shutdown signal (Ctrl+C)");
        let _ = shutdown_tx.send(true);
    });

    let sweeper_handle =
        RetrySweeper::new(&ctx).spawn(ctx.config.sweep_interval, shutdown_rx.clone());

    let stats = Arc::new(RwLock::new(StreamStats::default()));
    let stats_handle = spawn_stats_reporter(stats.clone(), ctx.gate());

    let result = run_stream(&client, &track, &dispatcher, stats.clone(), shutdown_rx).await;

    stats_handle.abort();
    if result.is_err() {
        sweeper_handle.abort();
    } else if let Err(e) = sweeper_handle.await {
        error!("Retry sweeper task failed: {e}");
    }

    print_final_stats(&stats).await;
    info!("Shutdown complete");
    result
}

/// Log a one-line summary every minute
fn spawn_stats_reporter(
    stats: Arc<RwLock<StreamStats>>,
    gate: RateLimitGate,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let cooldown = match gate.remaining().await {
                Ok(Some(left)) => format!("{}s left", left.as_secs()),
                Ok(None) => "off".to_string(),
                Err(e) => format!("unknown ({e})"),
            };

            let stats = stats.read().await;
            let uptime = stats.start_time.elapsed();
            let hours = uptime.as_secs() / 3600;
            let minutes = (uptime.as_secs() % 3600) / 60;

            info!(
                "📊 Stats | Uptime: {hours}h{minutes}m | Connections: {connections} (✗{failed}) | Events: {lines} | Actions: {actions} | Cooldown: {cooldown}",
                connections = stats.connections,
                failed = stats.failed_connections,
                lines = stats.lines,
                actions = stats.actions_started
            );
        }
    })
}

async fn print_final_stats(stats: &Arc<RwLock<StreamStats>>) {
    let stats = stats.read().await;
    let uptime = stats.start_time.elapsed();

    info!("=== Final Bot Statistics ===");
    info!(
        "Uptime: {uptime:.2} hours",
        uptime = uptime.as_secs_f64() / 3600.0
    );
    info!(
        "Stream connections: {connections} ({failed} failed)",
        connections = stats.connections,
        failed = stats.failed_connections
    );
    info!("Events received: {lines}", lines = stats.lines);
    info!(
        "Actions started: {actions}",
        actions = stats.actions_started
    );
    info!("============================");
}

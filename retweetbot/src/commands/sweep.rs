use anyhow::Result;
use retweetbot::config::BotConfig;
use retweetbot::sweeper::RetrySweeper;
use tracing::info;

/// Run a single retry sweep
pub async fn execute(config: BotConfig) -> Result<()> {
    let (ctx, _) = super::connect(config).await?;

    match RetrySweeper::new(&ctx).sweep().await? {
        Some(report) => info!(
            "Listed {listed} pending keys: {attempted} retried, {cleared} cleared, {left_pending} left",
            listed = report.listed,
            attempted = report.attempted,
            cleared = report.cleared,
            left_pending = report.left_pending
        ),
        None => info!("Another sweep is already running"),
    }
    Ok(())
}

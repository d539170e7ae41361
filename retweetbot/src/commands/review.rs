use anyhow::{Result, bail};
use retweetbot::config::BotConfig;
use retweetbot::registration;

/// Approve or reject the registration of `user_id`
pub async fn execute(config: &BotConfig, user_id: &str, approve: bool) -> Result<()> {
    let store = config.open_registrations().await?;

    let Some(record) = registration::review(&store, user_id, approve).await? else {
        bail!("No registration found for user {user_id}");
    };

    println!(
        "@{screen_name} is now {status}",
        screen_name = record.user_screen_name,
        status = record.status_label()
    );
    Ok(())
}

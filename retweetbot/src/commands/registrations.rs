use anyhow::Result;
use retweetbot::config::BotConfig;
use retweetbot::registration::RegistrationStore;
use tracing::info;

/// List stored registrations, oldest first
pub async fn execute(config: &BotConfig, pending_only: bool) -> Result<()> {
    let store = config.open_registrations().await?;
    let records: Vec<_> = store
        .list()
        .await?
        .into_iter()
        .filter(|record| !pending_only || !record.processed)
        .collect();

    if records.is_empty() {
        info!(
            "No registrations found in {path}",
            path = config.data_dir.display()
        );
        return Ok(());
    }

    println!(
        "Found {} registrations in {}",
        records.len(),
        config.data_dir.display()
    );
    println!("{:-^80}", "");

    for record in records {
        println!(
            "{created}  {status:<8}  @{screen_name} ({user_id}){flags}",
            created = record.created_at.format("%Y-%m-%d %H:%M"),
            status = record.status_label(),
            screen_name = record.user_screen_name,
            user_id = record.user_id,
            flags = match (record.verified, record.protected) {
                (true, true) => " [verified, protected]",
                (true, false) => " [verified]",
                (false, true) => " [protected]",
                (false, false) => "",
            }
        );
        if !record.description.is_empty() {
            println!("    {description}", description = record.description);
        }
    }
    Ok(())
}

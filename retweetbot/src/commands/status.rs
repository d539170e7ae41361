use anyhow::Result;
use retweetbot::clock::{Clock, SystemClock, duration_to_millis, format_millis_for_display};
use retweetbot::config::BotConfig;
use retweetbot::gate::RateLimitGate;
use std::sync::Arc;

/// Print the cooldown window and the retry queue
pub async fn execute(config: BotConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = config.open_store(clock.clone()).await?;
    let keys = config.keys();
    let gate = RateLimitGate::new(store.clone(), clock.clone(), keys.clone(), config.cooldown);

    match gate.remaining().await? {
        Some(left) => println!(
            "Cooldown: active for {secs}s more (until {until})",
            secs = left.as_secs(),
            until = format_millis_for_display(clock.now_millis() + duration_to_millis(left))
        ),
        None => println!("Cooldown: off"),
    }

    let mut pending = Vec::new();
    for key in store.keys(&keys.pending_prefix()).await? {
        let Some(tweet_id) = keys.pending_id_from_key(&key) else {
            continue;
        };
        // cleared entries linger for a second with an empty value
        if store.get(&key).await?.is_some_and(|value| !value.is_empty()) {
            pending.push(tweet_id.to_string());
        }
    }
    pending.sort();

    println!(
        "Pending retries under {ns}: {count}",
        ns = keys.namespace(),
        count = pending.len()
    );
    println!("{:-^40}", "");
    for tweet_id in pending {
        println!("{tweet_id}");
    }
    Ok(())
}

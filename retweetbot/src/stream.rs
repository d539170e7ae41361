//! Keeps the filter stream connected and feeds its lines to the dispatcher.

use anyhow::Result;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, watch};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::twitter::{TwitterClient, TwitterError};

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(5 * 60);

/// Counters shared with the stats reporter
#[derive(Clone, Debug)]
pub struct StreamStats {
    pub start_time: Instant,
    pub connections: u64,
    pub failed_connections: u64,
    pub lines: u64,
    pub actions_started: u64,
}

impl Default for StreamStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            connections: 0,
            failed_connections: 0,
            lines: 0,
            actions_started: 0,
        }
    }
}

/// How a connection ended
enum Disconnect {
    Shutdown,
    Dropped { delivered: u64 },
}

pub fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_secs(1),
        initial_interval: Duration::from_secs(1),
        randomization_factor: 0.0,
        multiplier: 2.0,
        max_interval: MAX_RECONNECT_DELAY,
        max_elapsed_time: None,
        ..Default::default()
    }
}

fn with_jitter(delay: Duration) -> Duration {
    delay + Duration::from_millis(rand::rng().random_range(0..1000))
}

fn log_connect_error(error: &TwitterError) {
    if error.is_rate_limited() || matches!(error, TwitterError::Api { status: 420 | 429, .. }) {
        warn!("Stream connection rate limited by Twitter: {error}");
    } else {
        error!("Failed to connect to the filter stream: {error}");
    }
}

/// Run the stream until `shutdown` flips to `true`, reconnecting as needed
pub async fn run_stream(
    client: &TwitterClient,
    track: &[String],
    dispatcher: &Dispatcher,
    stats: Arc<RwLock<StreamStats>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut backoff = reconnect_backoff();

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let delivered = match client.filter_stream(track).await {
            Ok(lines) => {
                info!("Connected to the filter stream, tracking {track:?}");
                stats.write().await.connections += 1;
                match consume(lines, dispatcher, &stats, &mut shutdown).await {
                    Disconnect::Shutdown => return Ok(()),
                    Disconnect::Dropped { delivered } => delivered,
                }
            }
            Err(e) => {
                log_connect_error(&e);
                stats.write().await.failed_connections += 1;
                0
            }
        };

        if delivered > 0 {
            backoff.reset();
        }

        let delay = with_jitter(backoff.next_backoff().unwrap_or(MAX_RECONNECT_DELAY));
        warn!("Reconnecting to the filter stream in {delay:?}");

        tokio::select! {
            _ = time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

async fn consume(
    mut lines: BoxStream<'static, Result<String, TwitterError>>,
    dispatcher: &Dispatcher,
    stats: &RwLock<StreamStats>,
    shutdown: &mut watch::Receiver<bool>,
) -> Disconnect {
    let mut delivered = 0;

    loop {
        tokio::select! {
            item = lines.next() => match item {
                Some(Ok(line)) => {
                    delivered += 1;
                    // handles dropped: write calls complete on their own
                    let started = dispatcher.dispatch_line(&line).await.len() as u64;

                    let mut stats = stats.write().await;
                    stats.lines += 1;
                    stats.actions_started += started;
                }
                Some(Err(e)) => {
                    error!("Filter stream failed: {e}");
                    return Disconnect::Dropped { delivered };
                }
                None => {
                    warn!("Filter stream closed by Twitter");
                    return Disconnect::Dropped { delivered };
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Closing the filter stream");
                    return Disconnect::Shutdown;
                }
            }
        }
    }
}

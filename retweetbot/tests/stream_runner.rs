mod common;

use common::{START, test_config};
use retweetbot::clock::ManualClock;
use retweetbot::context::BotContext;
use retweetbot::dispatcher::Dispatcher;
use retweetbot::registration::MemoryRegistrationStore;
use retweetbot::store::{KvStore, MemoryStore};
use retweetbot::stream::{StreamStats, run_stream};
use retweetbot::twitter::{TwitterClient, TwitterCredentials};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};

fn credentials() -> TwitterCredentials {
    TwitterCredentials {
        consumer_key: "ck".to_string(),
        consumer_secret: "cs".to_string(),
        access_token: "at".to_string(),
        access_token_secret: "ats".to_string(),
    }
}

async fn wait_for(stats: &RwLock<StreamStats>, check: impl Fn(&StreamStats) -> bool) {
    for _ in 0..200 {
        if check(&*stats.read().await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached: {:?}", stats.read().await);
}

#[tokio::test]
async fn test_stream_lines_are_retweeted_through_the_api() {
    let mut server = mockito::Server::new_async().await;
    let stream_mock = server
        .mock("POST", "/statuses/filter.json")
        .match_body(mockito::Matcher::UrlEncoded(
            "track".into(),
            "#caparledev,@caparledev".into(),
        ))
        .with_status(200)
        .with_body(concat!(
            "{\"id_str\":\"100\",\"text\":\"#caparledev\",\"user\":{\"screen_name\":\"alice\"}}\r\n",
            "\r\n",
            "{\"delete\":{\"status\":{\"id_str\":\"5\"}}}\r\n",
            "{\"id_str\":\"200\",\"text\":\"RT\",\"user\":{\"screen_name\":\"caparledev\"},",
            "\"retweeted_status\":{\"id_str\":\"100\",\"text\":\"#caparledev\"}}\r\n",
        ))
        .expect_at_least(1)
        .create_async()
        .await;
    let retweet_mock = server
        .mock("POST", "/statuses/retweet/100.json")
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let client = Arc::new(
        TwitterClient::with_base_urls(credentials(), &server.url(), &server.url()).unwrap(),
    );
    let clock = Arc::new(ManualClock::new(START));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let ctx = BotContext::new(
        test_config(),
        store.clone(),
        client.clone(),
        Arc::new(MemoryRegistrationStore::new()),
        clock,
    );
    let dispatcher = Dispatcher::new(&ctx).unwrap();
    let track = ctx.config.track();

    let stats = Arc::new(RwLock::new(StreamStats::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = {
        let stats = stats.clone();
        tokio::spawn(async move {
            run_stream(&client, &track, &dispatcher, stats, shutdown_rx).await
        })
    };

    wait_for(&stats, |s| s.lines >= 3).await;
    // retweet of 100 runs detached
    for _ in 0..200 {
        if retweet_mock.matched_async().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown_tx.send(true).unwrap();
    runner.await.unwrap().unwrap();

    stream_mock.assert_async().await;
    retweet_mock.assert_async().await;

    let stats = stats.read().await;
    assert!(stats.lines >= 3);
    assert_eq!(stats.actions_started, 1);
    assert!(stats.connections >= 1);
    assert!(
        store
            .get(&ctx.keys().seen_key("100"))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_refused_connection_is_counted_and_shutdown_interrupts_backoff() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/statuses/filter.json")
        .with_status(420)
        .with_body("Enhance Your Calm")
        .expect_at_least(1)
        .create_async()
        .await;

    let client = TwitterClient::with_base_urls(credentials(), &server.url(), &server.url()).unwrap();
    let common::Harness { ctx, .. } = common::Harness::new();
    let dispatcher = Dispatcher::new(&ctx).unwrap();

    let stats = Arc::new(RwLock::new(StreamStats::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = {
        let stats = stats.clone();
        let track = ctx.config.track();
        tokio::spawn(async move {
            run_stream(&client, &track, &dispatcher, stats, shutdown_rx).await
        })
    };

    wait_for(&stats, |s| s.failed_connections >= 1).await;
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("runner should stop during the reconnect delay")
        .unwrap()
        .unwrap();

    assert_eq!(stats.read().await.connections, 0);
}

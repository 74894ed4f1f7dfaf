//! End-to-end sync passes against an in-process fake of the ThingSpeak
//! feed endpoint and a capturing webhook receiver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use penwatch_bridge::config::BridgeConfig;
use penwatch_bridge::delivery::{RetryPolicy, WebhookDelivery};
use penwatch_bridge::feed::{FeedClient, FeedError};
use penwatch_bridge::sync::{AlertSync, BridgeError};
use penwatch_core::fields::FieldMap;
use penwatch_core::range::TemperatureRange;

const CHANNEL: u64 = 42;

#[derive(Clone, Default)]
struct Fake {
    /// Entries served by the feed; the newest is last.
    feeds: Arc<Mutex<Vec<Value>>>,
    /// Query strings seen by the feed endpoint.
    feed_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    /// Alert bodies received by the webhook.
    alerts: Arc<Mutex<Vec<Value>>>,
    webhook_status: Arc<Mutex<Option<StatusCode>>>,
}

impl Fake {
    fn push_entry(&self, entry_id: u64, temperature: &str, presence: &str) {
        self.feeds.lock().unwrap().push(json!({
            "created_at": "2024-03-01T08:00:00Z",
            "entry_id": entry_id,
            "field1": temperature,
            "field2": presence,
        }));
    }

    fn alerts(&self) -> Vec<Value> {
        self.alerts.lock().unwrap().clone()
    }

    fn fail_webhook(&self, status: StatusCode) {
        *self.webhook_status.lock().unwrap() = Some(status);
    }

    fn recover_webhook(&self) {
        *self.webhook_status.lock().unwrap() = None;
    }
}

fn app(fake: Fake) -> Router {
    async fn feeds(
        State(fake): State<Fake>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, String) {
        fake.feed_queries.lock().unwrap().push(params.clone());
        if params.get("api_key").is_some_and(|k| k != "READKEY") {
            return (StatusCode::OK, "-1".to_string());
        }
        let feeds = fake.feeds.lock().unwrap().clone();
        let latest: Vec<Value> = feeds.last().cloned().into_iter().collect();
        let body = json!({
            "channel": { "id": CHANNEL, "name": "Insulin fridge" },
            "feeds": latest,
        });
        (StatusCode::OK, body.to_string())
    }

    async fn hook(State(fake): State<Fake>, Json(alert): Json<Value>) -> StatusCode {
        fake.alerts.lock().unwrap().push(alert);
        fake.webhook_status.lock().unwrap().unwrap_or(StatusCode::NO_CONTENT)
    }

    Router::new()
        .route(&format!("/channels/{CHANNEL}/feeds.json"), get(feeds))
        .route("/hook", post(hook))
        .with_state(fake)
}

async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(base: &str, cooldown: Duration) -> BridgeConfig {
    BridgeConfig {
        base_url: base.to_string(),
        channel_id: CHANNEL,
        read_key: None,
        webhook_url: format!("{base}/hook"),
        interval: None,
        cooldown,
        request_timeout: Duration::from_secs(5),
        fields: FieldMap::default(),
        range: TemperatureRange::default(),
    }
}

fn sync_for(config: &BridgeConfig) -> AlertSync {
    let feed = FeedClient::new(config.base_url.clone(), config.request_timeout).unwrap();
    let delivery = WebhookDelivery::new(config.request_timeout)
        .unwrap()
        .with_retry(RetryPolicy::none());
    AlertSync::from_parts(config, feed, delivery)
}

async fn setup(cooldown: Duration) -> (Fake, AlertSync) {
    let fake = Fake::default();
    let base = spawn_server(app(fake.clone())).await;
    let sync = sync_for(&config(&base, cooldown));
    (fake, sync)
}

#[tokio::test]
async fn normal_reading_raises_nothing() {
    let (fake, mut sync) = setup(Duration::from_secs(300)).await;
    fake.push_entry(1, "4.50", "1");

    let report = sync.sync_once().await.unwrap();
    assert_eq!(report.entry_id, 1);
    assert_eq!(report.raised, 0);
    assert!(fake.alerts().is_empty());
}

#[tokio::test]
async fn missing_pen_posts_alert() {
    let (fake, mut sync) = setup(Duration::from_secs(300)).await;
    fake.push_entry(7, "5.00", "0");

    let report = sync.sync_once().await.unwrap();
    assert_eq!(report.raised, 1);
    assert_eq!(report.delivered, 1);

    let alerts = fake.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["type"], "pen_absent");
    assert_eq!(alerts[0]["message"], "Insulin pen missing!");
    assert_eq!(alerts[0]["entry_id"], 7);
}

#[tokio::test]
async fn warm_fridge_without_pen_posts_both_alerts() {
    let (fake, mut sync) = setup(Duration::from_secs(300)).await;
    fake.push_entry(3, "9.50", "0");

    let report = sync.sync_once().await.unwrap();
    assert_eq!(report.raised, 2);
    assert_eq!(report.delivered, 2);

    let kinds: Vec<Value> = fake.alerts().iter().map(|a| a["type"].clone()).collect();
    assert_eq!(kinds, vec![json!("pen_absent"), json!("temperature")]);
    assert_eq!(fake.alerts()[1]["message"], "Temperature Alert: 9.5°C");
}

#[tokio::test]
async fn same_entry_is_evaluated_once() {
    let (fake, mut sync) = setup(Duration::ZERO).await;
    fake.push_entry(5, "1.00", "1");

    let first = sync.sync_once().await.unwrap();
    assert_eq!(first.delivered, 1);

    let second = sync.sync_once().await.unwrap();
    assert!(second.already_seen);
    assert_eq!(second.raised, 0);
    assert_eq!(fake.alerts().len(), 1);
}

#[tokio::test]
async fn cooldown_suppresses_repeat_until_condition_clears() {
    let (fake, mut sync) = setup(Duration::from_secs(3600)).await;

    fake.push_entry(1, "5.00", "0");
    assert_eq!(sync.sync_once().await.unwrap().delivered, 1);

    fake.push_entry(2, "5.00", "0");
    let repeat = sync.sync_once().await.unwrap();
    assert_eq!(repeat.raised, 1);
    assert_eq!(repeat.suppressed, 1);
    assert_eq!(repeat.delivered, 0);

    // Pen returns, then goes missing again.
    fake.push_entry(3, "5.00", "1");
    sync.sync_once().await.unwrap();
    fake.push_entry(4, "5.00", "0");
    assert_eq!(sync.sync_once().await.unwrap().delivered, 1);

    assert_eq!(fake.alerts().len(), 2);
}

#[tokio::test]
async fn empty_channel_is_an_error() {
    let (_fake, mut sync) = setup(Duration::from_secs(300)).await;
    assert_matches!(sync.sync_once().await, Err(BridgeError::EmptyFeed(CHANNEL)));
}

#[tokio::test]
async fn undecodable_entry_is_an_error() {
    let (fake, mut sync) = setup(Duration::from_secs(300)).await;
    fake.push_entry(9, "warm", "1");
    assert_matches!(sync.sync_once().await, Err(BridgeError::Decode(_)));
    assert!(fake.alerts().is_empty());
}

#[tokio::test]
async fn webhook_failure_is_counted() {
    let (fake, mut sync) = setup(Duration::from_secs(300)).await;
    fake.fail_webhook(StatusCode::BAD_GATEWAY);
    fake.push_entry(2, "5.00", "0");

    let report = sync.sync_once().await.unwrap();
    assert_eq!(report.raised, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn failed_delivery_does_not_start_cooldown() {
    let (fake, mut sync) = setup(Duration::from_secs(300)).await;
    fake.fail_webhook(StatusCode::BAD_GATEWAY);
    fake.push_entry(1, "5.00", "0");
    assert_eq!(sync.sync_once().await.unwrap().failed, 1);

    fake.recover_webhook();
    fake.push_entry(2, "5.00", "0");
    let report = sync.sync_once().await.unwrap();
    assert_eq!(report.suppressed, 0);
    assert_eq!(report.delivered, 1);

    // Delivered now, so the next repeat is throttled.
    fake.push_entry(3, "5.00", "0");
    assert_eq!(sync.sync_once().await.unwrap().suppressed, 1);
}

#[tokio::test]
async fn read_key_is_sent_and_checked() {
    let fake = Fake::default();
    let base = spawn_server(app(fake.clone())).await;
    fake.push_entry(1, "4.00", "1");

    let mut cfg = config(&base, Duration::from_secs(300));
    cfg.read_key = Some("READKEY".into());
    sync_for(&cfg).sync_once().await.unwrap();
    let query = fake.feed_queries.lock().unwrap()[0].clone();
    assert_eq!(query.get("results").map(String::as_str), Some("1"));
    assert_eq!(query.get("api_key").map(String::as_str), Some("READKEY"));

    cfg.read_key = Some("WRONG".into());
    assert_matches!(
        sync_for(&cfg).sync_once().await,
        Err(BridgeError::Feed(FeedError::AccessDenied(CHANNEL)))
    );
}

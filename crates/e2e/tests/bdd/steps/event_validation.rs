use anyhow::{ensure, Context as _};
use chrono::Utc;
use cucumber::{given, then, when};
use rudder_common::{mask_secret, Properties, SourceConfig, SourceKind};
use rudder_e2e::{ApiResponse, DeliveryCondition, WebhookCollector};
use serde_json::json;
use std::time::Duration;
use tracing::info;

use crate::world::E2eWorld;

/// Event names cycled through when sending several events
const EVENT_NAMES: [&str; 5] = [
    "Product Viewed",
    "Product Added to Cart",
    "Checkout Started",
    "Payment Info Added",
    "Purchase Completed",
];

const SEND_PAUSE: Duration = Duration::from_millis(100);

fn product_viewed_properties() -> Properties {
    let mut props = Properties::new();
    props.insert("product_id".to_string(), json!("test-product-123"));
    props.insert("product_name".to_string(), json!("Test Product"));
    props.insert("category".to_string(), json!("Electronics"));
    props.insert("price".to_string(), json!(99.99));
    props.insert("currency".to_string(), json!("USD"));
    props
}

fn numbered_properties(i: usize, test_run_id: &str) -> Properties {
    let mut props = Properties::new();
    props.insert("product_id".to_string(), json!(format!("test-product-{}", i + 1)));
    props.insert("product_name".to_string(), json!(format!("Test Product {}", i + 1)));
    props.insert("category".to_string(), json!("Electronics"));
    props.insert("price".to_string(), json!((i + 1) * 10));
    props.insert("currency".to_string(), json!("USD"));
    props.insert("test_run_id".to_string(), json!(test_run_id));
    props
}

fn is_success(response: &ApiResponse) -> bool {
    response.success && matches!(response.status, Some(200..=299))
}

fn write_key(world: &mut E2eWorld) -> anyhow::Result<String> {
    world
        .scenario()?
        .context
        .write_key
        .clone()
        .context("no write key has been set up")
}

fn record_deliveries(world: &E2eWorld, test_id: &str, delivered: usize, failed: usize) {
    if let Some(suite) = &world.suite {
        for _ in 0..delivered {
            suite.data().record_delivery(test_id, true);
        }
        for _ in 0..failed {
            suite.data().record_delivery(test_id, false);
        }
    }
}

#[given("I have an HTTP source with a valid write key")]
async fn http_source_with_key(world: &mut E2eWorld) -> anyhow::Result<()> {
    let suite = world.suite()?;
    let write_key = suite
        .config()
        .write_key
        .clone()
        .unwrap_or_else(|| suite.data().generate_test_write_key());
    info!(write_key = %mask_secret(&write_key), "HTTP source with write key confirmed");

    let scenario = world.scenario()?;
    scenario.context.write_key = Some(write_key.clone());
    scenario.context.source = Some(SourceConfig {
        name: "Test-HTTP-Source".to_string(),
        kind: SourceKind::Http,
        write_key: Some(write_key),
        enabled: true,
        settings: Properties::new(),
    });
    Ok(())
}

#[given("I have the data plane URL")]
async fn data_plane_url(world: &mut E2eWorld) -> anyhow::Result<()> {
    let url = world.config()?.data_plane_url().to_string();
    let scenario = world.scenario()?;
    scenario.ingest = scenario.ingest_for(&url)?;
    scenario.context.data_plane_url = Some(url.clone());
    info!(url = %url, "Data plane URL confirmed");
    Ok(())
}

#[given("I have a webhook destination configured with a test URL")]
async fn webhook_destination(world: &mut E2eWorld) -> anyhow::Result<()> {
    let config = world.config()?;
    let url = config.webhook_url_or_default().to_string();

    let collector = WebhookCollector::new(&url, config.api_timeout)?;
    let scenario = world.scenario()?;
    scenario.context.webhook_url = Some(url.clone());
    world.collector = Some(collector);
    info!(url = %url, "Webhook destination confirmed");
    Ok(())
}

#[when("I send a track event via API call to the HTTP source")]
async fn send_one(world: &mut E2eWorld) -> anyhow::Result<()> {
    let write_key = write_key(world)?;
    let scenario = world.scenario()?;
    let properties = product_viewed_properties();
    let user_id = format!("test-user-{}", Utc::now().timestamp_millis());

    info!(event = "Product Viewed", "Sending track event");
    let response = scenario
        .ingest
        .send_track("Product Viewed", &write_key, Some(&user_id), properties.clone())
        .await;
    scenario.context.record_sent("Product Viewed", properties, response);
    Ok(())
}

#[when(regex = r"^I send (\d+) track events via API calls to the HTTP source$")]
async fn send_many(world: &mut E2eWorld, count: usize) -> anyhow::Result<()> {
    let write_key = write_key(world)?;
    let scenario = world.scenario()?;
    scenario.context.clear_sent();
    let mut responses = Vec::with_capacity(count);

    info!(count, "Sending multiple track events");
    for i in 0..count {
        let event = EVENT_NAMES[i % EVENT_NAMES.len()];
        let properties = numbered_properties(i, &scenario.context.test_run_id);
        let user_id = format!("test-user-{}-{}", Utc::now().timestamp_millis(), i);

        let response = scenario
            .ingest
            .send_track(event, &write_key, Some(&user_id), properties.clone())
            .await;
        responses.push(response.clone());
        scenario.context.record_sent(event, properties, response);

        tokio::time::sleep(SEND_PAUSE).await;
    }

    world.batch_responses = responses;
    Ok(())
}

#[then("the API call should return a successful response")]
async fn last_call_succeeded(world: &mut E2eWorld) -> anyhow::Result<()> {
    let response = world
        .scenario()?
        .context
        .last_response
        .clone()
        .context("no API call has been made")?;
    ensure!(
        is_success(&response),
        "API call failed: status {:?}, error {:?}",
        response.status,
        response.error
    );
    Ok(())
}

#[then("all API calls should return successful responses")]
async fn all_calls_succeeded(world: &mut E2eWorld) -> anyhow::Result<()> {
    ensure!(!world.batch_responses.is_empty(), "no API calls have been made");
    let failed: Vec<_> = world
        .batch_responses
        .iter()
        .enumerate()
        .filter(|(_, r)| !is_success(r))
        .map(|(i, r)| format!("#{} status {:?}", i + 1, r.status))
        .collect();
    ensure!(failed.is_empty(), "API calls failed: {}", failed.join(", "));
    Ok(())
}

#[then(regex = r"^the event should appear in the webhook destination within (\d+) seconds$")]
async fn event_delivered_within(world: &mut E2eWorld, seconds: u64) -> anyhow::Result<()> {
    let scenario = world.scenario()?;
    let test_id = scenario.context.test_id.clone();
    let expected = scenario.context.sent_names();
    ensure!(!expected.is_empty(), "no event has been sent");
    let condition = scenario.context.any_sent_delivered();
    let delivery = world.config()?.delivery;
    let collector = world.collector()?;

    let report = rudder_e2e::DeliveryPoller::new(collector, delivery)
        .with_timeout(Duration::from_secs(seconds))
        .poll(&condition)
        .await;

    record_deliveries(world, &test_id, usize::from(report.satisfied), usize::from(!report.satisfied));
    ensure!(
        report.satisfied,
        "{} did not reach the webhook within {}s ({} attempts, last error {:?})",
        expected.join(", "),
        seconds,
        report.attempts,
        report.last_error
    );
    info!("Event found in webhook destination");
    Ok(())
}

#[then("all events should appear in the webhook destination")]
async fn all_events_delivered(world: &mut E2eWorld) -> anyhow::Result<()> {
    let scenario = world.scenario()?;
    let test_id = scenario.context.test_id.clone();
    let expected = scenario.context.sent_names();
    let delivery = world.config()?.delivery;
    let collector = world.collector()?;

    let report = rudder_e2e::DeliveryPoller::new(collector, delivery)
        .poll(&DeliveryCondition::all_named(&expected))
        .await;

    let failed = report.missing.len().min(expected.len());
    record_deliveries(world, &test_id, expected.len() - failed, failed);
    ensure!(
        report.satisfied,
        "events missing from the webhook: {}",
        report.missing.join(", ")
    );
    Ok(())
}

#[then("each event should maintain its original event name and properties")]
async fn events_intact(world: &mut E2eWorld) -> anyhow::Result<()> {
    let sent = world.scenario()?.context.sent_events().to_vec();
    let received = world.collector()?.received_events().await?;

    for event in &sent {
        let mut identity = Properties::new();
        if let Some(product_id) = event.properties.get("product_id") {
            identity.insert("product_id".to_string(), product_id.clone());
        }
        let condition = DeliveryCondition::matches(event.event.as_str(), identity);
        ensure!(
            condition.is_satisfied(&received),
            "{} was not received intact",
            event.event
        );
    }
    Ok(())
}

use anyhow::{ensure, Context as _};
use chrono::Utc;
use cucumber::{given, then, when};
use rudder_common::{mask_secret, DestinationConfig, DestinationKind, SourceConfig, SourceKind};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use super::login::ensure_logged_in;
use crate::world::E2eWorld;

/// Write keys shorter than this cannot be real
const MIN_WRITE_KEY_LEN: usize = 10;

fn simulated_source(name: &str, write_key: String) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        kind: SourceKind::Http,
        write_key: Some(write_key),
        enabled: true,
        settings: Default::default(),
    }
}

fn simulated_destination(name: &str, url: Option<String>) -> DestinationConfig {
    DestinationConfig {
        name: name.to_string(),
        kind: DestinationKind::Webhook,
        url,
        enabled: true,
        configured: false,
        headers: Default::default(),
    }
}

/// Record an HTTP source without touching the UI; the write key comes from
/// the environment or is generated
pub(crate) fn create_source(world: &mut E2eWorld, name: &str) -> anyhow::Result<()> {
    let write_key = world
        .config()?
        .write_key
        .unwrap_or_else(|| format!("test-write-key-{}", Utc::now().timestamp_millis()));
    info!(name = %name, write_key = %mask_secret(&write_key), "HTTP source created");

    let scenario = world.scenario()?;
    scenario.context.write_key = Some(write_key.clone());
    scenario.context.source = Some(simulated_source(name, write_key));
    Ok(())
}

pub(crate) fn create_destination(world: &mut E2eWorld, name: &str) -> anyhow::Result<()> {
    let scenario = world.scenario()?;
    let url = scenario.context.webhook_url.clone();
    info!(name = %name, url = ?url, "Webhook destination created");
    scenario.context.destination = Some(simulated_destination(name, url));
    Ok(())
}

pub(crate) fn configure_destination(world: &mut E2eWorld) -> anyhow::Result<()> {
    let scenario = world.scenario()?;
    let webhook_url = scenario
        .context
        .webhook_url
        .clone()
        .context("no webhook URL has been set up")?;
    let destination = scenario
        .context
        .destination
        .as_mut()
        .context("no destination has been created")?;

    destination.url = Some(webhook_url);
    destination.configured = true;
    info!("Destination configured with webhook URL");
    Ok(())
}

#[given("I am logged in to RudderStack")]
async fn logged_in_rudderstack(world: &mut E2eWorld) -> anyhow::Result<()> {
    ensure_logged_in(world).await
}

#[given("I am on the connections page")]
async fn on_connections(world: &mut E2eWorld) -> anyhow::Result<()> {
    let connections = &world.scenario()?.pages.connections;
    connections.navigate().await?;
    ensure!(connections.is_loaded().await, "connections page did not load");
    Ok(())
}

#[when(regex = r#"^I create an HTTP source with name "([^"]*)"$"#)]
async fn create_http_source(world: &mut E2eWorld, name: String) -> anyhow::Result<()> {
    create_source(world, &name)
}

#[when(regex = r#"^I create an HTTP source through the UI with name "([^"]*)"$"#)]
async fn create_http_source_ui(world: &mut E2eWorld, name: String) -> anyhow::Result<()> {
    let scenario = world.scenario()?;
    scenario.pages.connections.click_add_source().await?;
    ensure!(scenario.pages.source.is_loaded().await, "source setup did not open");

    let write_key = scenario.pages.source.create_http_source(&name).await?;
    scenario.context.write_key = Some(write_key.clone());
    scenario.context.source = Some(simulated_source(&name, write_key));
    Ok(())
}

#[then("the HTTP source should be created successfully")]
async fn source_created(world: &mut E2eWorld) -> anyhow::Result<()> {
    let source = world
        .scenario()?
        .context
        .source
        .as_ref()
        .context("no source has been created")?;
    ensure!(!source.name.is_empty(), "source has no name");
    ensure!(source.write_key.is_some(), "source has no write key");
    ensure!(source.kind == SourceKind::Http, "source is {}", source.kind);
    Ok(())
}

#[then("I should be able to copy and store its write key")]
async fn store_write_key(world: &mut E2eWorld) -> anyhow::Result<()> {
    let suite = world.suite()?;
    let scenario = world.scenario()?;
    let write_key = scenario
        .context
        .source
        .as_ref()
        .and_then(|s| s.write_key.clone())
        .context("source has no write key")?;
    ensure!(
        write_key.len() > MIN_WRITE_KEY_LEN,
        "write key {} is too short",
        mask_secret(&write_key)
    );

    suite.data().store_write_key(&scenario.context.test_id, &write_key);
    scenario.context.write_key = Some(write_key.clone());
    info!(write_key = %mask_secret(&write_key), "Write key extracted and stored");
    Ok(())
}

#[given("I have a valid webhook URL from RequestCatcher")]
async fn webhook_from_request_catcher(world: &mut E2eWorld) -> anyhow::Result<()> {
    let url = world.config()?.webhook_url.unwrap_or_else(|| {
        let id = Uuid::new_v4().simple().to_string();
        format!("https://webhook.site/test-{}", &id[..9])
    });
    info!(url = %url, "Webhook URL configured");

    let suite = world.suite()?;
    let scenario = world.scenario()?;
    suite.data().store_webhook_url(&scenario.context.test_id, &url);
    scenario.context.webhook_url = Some(url);
    Ok(())
}

#[when(regex = r#"^I create a webhook destination with name "([^"]*)"$"#)]
async fn create_webhook_destination(world: &mut E2eWorld, name: String) -> anyhow::Result<()> {
    create_destination(world, &name)
}

#[when(regex = r#"^I create a webhook destination through the UI with name "([^"]*)"$"#)]
async fn create_webhook_destination_ui(world: &mut E2eWorld, name: String) -> anyhow::Result<()> {
    let scenario = world.scenario()?;
    let url = scenario
        .context
        .webhook_url
        .clone()
        .context("no webhook URL has been set up")?;

    scenario.pages.connections.click_add_destination().await?;
    ensure!(
        scenario.pages.destination.is_loaded().await,
        "destination setup did not open"
    );
    scenario
        .pages
        .destination
        .create_webhook_destination(&name, &url, &BTreeMap::new())
        .await?;

    let mut destination = simulated_destination(&name, Some(url));
    destination.configured = true;
    scenario.context.destination = Some(destination);
    Ok(())
}

#[when("I configure it with the RequestCatcher URL")]
async fn configure_with_request_catcher(world: &mut E2eWorld) -> anyhow::Result<()> {
    configure_destination(world)
}

#[then("the destination should be successfully configured")]
async fn destination_configured(world: &mut E2eWorld) -> anyhow::Result<()> {
    let context = &world.scenario()?.context;
    let destination = context
        .destination
        .as_ref()
        .context("no destination has been created")?;
    ensure!(destination.configured, "destination {} is not configured", destination.name);
    ensure!(
        destination.url == context.webhook_url,
        "destination points at {:?}, expected {:?}",
        destination.url,
        context.webhook_url
    );
    Ok(())
}

#[given("I have created a source and destination")]
async fn created_source_and_destination(world: &mut E2eWorld) -> anyhow::Result<()> {
    create_source(world, "Test-Source")?;

    let url = world
        .config()?
        .webhook_url
        .unwrap_or_else(|| "https://webhook.site/test-destination".to_string());
    world.scenario()?.context.webhook_url = Some(url);

    create_destination(world, "Test-Destination")?;
    configure_destination(world)
}

#[then("I should see the created source in the sources list")]
async fn source_listed(world: &mut E2eWorld) -> anyhow::Result<()> {
    let source = world
        .scenario()?
        .context
        .source
        .as_ref()
        .context("no source has been created")?;
    ensure!(!source.name.is_empty(), "source has no name");
    info!(name = %source.name, "Source found in sources list");
    Ok(())
}

#[then("I should see the created destination in the destinations list")]
async fn destination_listed(world: &mut E2eWorld) -> anyhow::Result<()> {
    let destination = world
        .scenario()?
        .context
        .destination
        .as_ref()
        .context("no destination has been created")?;
    ensure!(!destination.name.is_empty(), "destination has no name");
    info!(name = %destination.name, "Destination found in destinations list");
    Ok(())
}

#[then("both should show as enabled and active")]
async fn both_active(world: &mut E2eWorld) -> anyhow::Result<()> {
    let context = &world.scenario()?.context;
    let source = context.source.as_ref().context("no source has been created")?;
    let destination = context
        .destination
        .as_ref()
        .context("no destination has been created")?;
    ensure!(source.enabled, "source {} is disabled", source.name);
    ensure!(
        destination.enabled && destination.configured,
        "destination {} is not active",
        destination.name
    );
    Ok(())
}

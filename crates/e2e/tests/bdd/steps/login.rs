use anyhow::{ensure, Context as _};
use cucumber::{given, then, when};
use regex::Regex;
use rudder_common::Credentials;
use rudder_e2e::pages::login::is_post_login_url;
use rudder_e2e::pages::LoginState;
use std::time::Duration;
use tracing::info;

use crate::world::E2eWorld;

const INVALID_EMAIL: &str = "invalid@email.com";
const INVALID_PASSWORD: &str = "wrongpassword";

/// Log in unless the page already sits inside the app
pub(crate) async fn ensure_logged_in(world: &mut E2eWorld) -> anyhow::Result<()> {
    let creds = world.credentials_or_default()?;
    let scenario = world.scenario()?;

    let url = scenario.base().current_url().await?;
    if is_post_login_url(&url) {
        info!("User already logged in");
        return Ok(());
    }

    scenario.pages.login.navigate().await?;
    scenario
        .pages
        .login
        .login_expecting_success(&creds.username, &creds.password)
        .await?;
    world.login_state = Some(LoginState::LoggedIn);
    info!("User login confirmed");
    Ok(())
}

#[given("I have a valid RudderStack business email account")]
async fn valid_account(world: &mut E2eWorld) -> anyhow::Result<()> {
    let creds = world.credentials_or_default()?;
    info!(email = %creds.username, "Valid RudderStack credentials confirmed");
    world.credentials = Some(creds);
    Ok(())
}

#[when("I log in to the application")]
async fn log_in(world: &mut E2eWorld) -> anyhow::Result<()> {
    let creds = world.credentials_or_default()?;
    let scenario = world.scenario()?;

    scenario.pages.login.navigate().await?;
    let state = scenario.pages.login.login(&creds.username, &creds.password).await?;
    ensure!(state.is_logged_in(), "login did not succeed: {:?}", state);
    world.login_state = Some(state);
    Ok(())
}

#[when("I try to log in with invalid credentials")]
async fn log_in_invalid(world: &mut E2eWorld) -> anyhow::Result<()> {
    let invalid = Credentials::new(INVALID_EMAIL, INVALID_PASSWORD);
    let scenario = world.scenario()?;

    scenario.pages.login.navigate().await?;
    let state = scenario
        .pages
        .login
        .login(&invalid.username, &invalid.password)
        .await?;
    world.login_state = Some(state);
    Ok(())
}

#[given("I am logged in to the application")]
async fn logged_in_app(world: &mut E2eWorld) -> anyhow::Result<()> {
    ensure_logged_in(world).await
}

#[then("I should be successfully logged in")]
async fn successfully_logged_in(world: &mut E2eWorld) -> anyhow::Result<()> {
    ensure!(
        matches!(world.login_state, Some(LoginState::LoggedIn)),
        "login state is {:?}",
        world.login_state
    );
    let url = world.scenario()?.base().current_url().await?;
    ensure!(
        is_post_login_url(&url) || (!url.contains("/login") && url.contains("/app")),
        "not inside the app after login: {}",
        url
    );
    info!(current_url = %url, "Login validation successful");
    Ok(())
}

#[then("I should see an error message")]
async fn error_message_shown(world: &mut E2eWorld) -> anyhow::Result<()> {
    let login = &world.scenario()?.pages.login;
    ensure!(login.is_error_displayed().await, "no login error is displayed");

    let message = login.error_message().await.unwrap_or_default();
    ensure!(!message.is_empty(), "login error element is empty");
    info!(message = %message, "Error message confirmed");
    Ok(())
}

#[then("I should remain on the login page")]
async fn remain_on_login(world: &mut E2eWorld) -> anyhow::Result<()> {
    let scenario = world.scenario()?;
    scenario.base().settle(Duration::from_secs(2)).await;

    let url = scenario.base().current_url().await?;
    ensure!(url.contains("/login"), "left the login page: {}", url);
    ensure!(scenario.pages.login.is_loaded().await, "login form is gone");
    Ok(())
}

#[when("I navigate to the connections page")]
async fn navigate_connections(world: &mut E2eWorld) -> anyhow::Result<()> {
    world.scenario()?.pages.connections.navigate().await?;
    Ok(())
}

#[then("I should be able to navigate to the connections page")]
async fn can_navigate_connections(world: &mut E2eWorld) -> anyhow::Result<()> {
    let connections = &world.scenario()?.pages.connections;
    connections.navigate().await?;
    ensure!(connections.is_loaded().await, "connections page did not load");
    Ok(())
}

#[then("I should see the data plane URL in the top right corner")]
async fn data_plane_url_top_right(world: &mut E2eWorld) -> anyhow::Result<()> {
    let fallback = world.config()?.data_plane_url().to_string();
    let scenario = world.scenario()?;

    let url = scenario.pages.connections.data_plane_url(&fallback).await;
    ensure!(
        url.starts_with("http://") || url.starts_with("https://"),
        "data plane URL {:?} is not an HTTP URL",
        url
    );
    info!(url = %url, "Data plane URL found");
    scenario.context.data_plane_url = Some(url);
    Ok(())
}

#[then("I should see the connections dashboard")]
async fn connections_dashboard(world: &mut E2eWorld) -> anyhow::Result<()> {
    let connections = &world.scenario()?.pages.connections;
    ensure!(connections.is_loaded().await, "connections page did not load");
    ensure!(
        connections.has_add_source_button().await || connections.has_add_destination_button().await,
        "neither an add source nor an add destination button is visible"
    );
    Ok(())
}

#[then("I should see options to add sources and destinations")]
async fn add_options(world: &mut E2eWorld) -> anyhow::Result<()> {
    let connections = &world.scenario()?.pages.connections;
    ensure!(connections.has_add_source_button().await, "no add source button");
    ensure!(connections.has_add_destination_button().await, "no add destination button");
    Ok(())
}

#[then("I should see the data plane URL displayed prominently")]
async fn data_plane_url_prominent(world: &mut E2eWorld) -> anyhow::Result<()> {
    let fallback = world.config()?.data_plane_url().to_string();
    let url = world
        .scenario()?
        .pages
        .connections
        .data_plane_url(&fallback)
        .await;

    let shape = Regex::new(r"^https?://.+").context("data plane URL pattern")?;
    ensure!(shape.is_match(&url), "data plane URL {:?} is not displayed", url);
    info!(url = %url, "Data plane URL prominently displayed");
    Ok(())
}

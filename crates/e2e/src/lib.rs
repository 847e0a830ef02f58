//! Rudder E2E suite
//!
//! Drives the control plane UI through Playwright and the data plane through
//! its HTTP ingestion API, then checks that events reach a webhook collector.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Cucumber runner (tests/bdd.rs)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suite                                                      │
//! │    ├── start(config) -> browser launched once               │
//! │    ├── begin_scenario() -> Scenario { pages, ingest, ... }  │
//! │    ├── finish_scenario() -> ScenarioResult                  │
//! │    └── shutdown() -> SuiteReport                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  pages      Login / Connections / Source / Destination      │
//! │  locator    first-visible-wins selector fallbacks           │
//! │  driver     PageDriver trait (Playwright bridge, fakes)     │
//! │  clients    ingestion API + webhook collector               │
//! │  poller     bounded eventual-delivery checks                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod clients;
pub mod context;
pub mod driver;
pub mod error;
pub mod locator;
pub mod pages;
pub mod playwright;
pub mod poller;
pub mod retry;
pub mod suite;

pub use clients::{ApiResponse, IngestClient, ObservedEvent, WebhookCollector};
pub use context::ScenarioContext;
pub use driver::PageDriver;
pub use error::{E2eError, E2eResult};
pub use locator::{Locator, LocatorSet};
pub use playwright::{PlaywrightBrowser, PlaywrightConfig, PlaywrightPage};
pub use poller::{DeliveryCondition, DeliveryPoller, PollReport};
pub use suite::{Scenario, ScenarioOutcome, ScenarioResult, ScenarioStatus, Suite, SuiteReport};

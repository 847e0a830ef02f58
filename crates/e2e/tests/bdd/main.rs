//! Cucumber runner for the event delivery suite
//!
//! Needs a reachable control plane, data plane and webhook collector, so it
//! only runs when `RUN_E2E=1`:
//!
//! ```text
//! RUN_E2E=1 cargo test -p rudder-e2e --test bdd -- --tags @smoke
//! ```
//!
//! Features live in `tests/features/`. One browser is launched for the whole
//! run and every scenario gets its own page.

mod steps;
mod world;

use cucumber::event::ScenarioFinished;
use cucumber::writer::Stats as _;
use cucumber::{cli, World as _};
use futures::FutureExt as _;
use rudder_common::{Browser, SuiteConfig};
use rudder_e2e::{ScenarioOutcome, Suite};
use std::sync::Arc;
use world::E2eWorld;

/// Suite-level overrides on top of the environment
#[derive(clap::Args, Debug, Clone, Default)]
struct CustomOpts {
    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Browser engine: chromium, firefox or webkit
    #[arg(long = "browser-engine")]
    browser_engine: Option<String>,

    /// Scenarios run at once (overrides PARALLEL_WORKERS)
    #[arg(long)]
    workers: Option<usize>,
}

impl CustomOpts {
    fn apply(&self, config: &mut SuiteConfig) -> anyhow::Result<()> {
        if self.headed {
            config.headless = false;
        }
        if let Some(engine) = &self.browser_engine {
            config.browser = engine.parse::<Browser>()?;
        }
        if let Some(workers) = self.workers {
            config.parallel_workers = workers.max(1);
        }
        Ok(())
    }
}

fn e2e_enabled() -> bool {
    matches!(std::env::var("RUN_E2E").as_deref(), Ok("1") | Ok("true"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if !e2e_enabled() {
        println!("Skipping E2E scenarios: set RUN_E2E=1 to run them");
        return Ok(());
    }

    let opts = cli::Opts::<_, _, _, CustomOpts>::parsed();
    let mut config = SuiteConfig::from_env()?;
    opts.custom.apply(&mut config)?;
    let workers = config.parallel_workers.max(1);

    let suite = Arc::new(Suite::start(config).await?);
    let before_suite = suite.clone();
    let after_suite = suite.clone();

    let writer = E2eWorld::cucumber()
        .max_concurrent_scenarios(workers)
        .before(move |_feature, _rule, scenario, world| {
            let suite = before_suite.clone();
            async move {
                let tags: Vec<String> = scenario.tags.iter().map(|t| format!("@{}", t)).collect();
                match suite.begin_scenario(&scenario.name, &tags).await {
                    Ok(started) => world.attach(suite.clone(), started),
                    Err(e) => panic!("failed to start scenario {}: {}", scenario.name, e),
                }
            }
            .boxed_local()
        })
        .after(move |_feature, _rule, _scenario, finished, world| {
            let suite = after_suite.clone();
            async move {
                let outcome = match finished {
                    ScenarioFinished::StepFailed(_, _, err) => ScenarioOutcome::Failed(err.to_string()),
                    ScenarioFinished::BeforeHookFailed(_) => {
                        ScenarioOutcome::Failed("before hook failed".to_string())
                    }
                    ScenarioFinished::StepSkipped => ScenarioOutcome::Skipped,
                    ScenarioFinished::StepPassed => ScenarioOutcome::Passed,
                };
                if let Some(started) = world.and_then(|w| w.scenario.take()) {
                    suite.finish_scenario(started, outcome).await;
                }
            }
            .boxed_local()
        })
        .with_cli(opts)
        .run("tests/features")
        .await;

    let report = suite.shutdown().await;
    if let Err(e) = &report {
        eprintln!("Suite teardown failed: {}", e);
    }

    if writer.execution_has_failed() || report.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

//! Shared fixtures for the integration tests: an in-memory database, the
//! in-memory platform and a fully wired engine over both.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use stream_curator::automation::{AutomationEngine, AutomationToggles, Collaborators};
use stream_curator::automation::settings::PipelineSettingsInput;
use stream_curator::config::Config;
use stream_curator::database::Database;
use stream_curator::platform::InMemoryPlatform;

pub struct TestHarness {
    pub database: Database,
    pub platform: Arc<InMemoryPlatform>,
    pub engine: AutomationEngine,
}

/// Configuration suited to tests: no probe stagger, quick dispatch
pub fn test_config(toggles: AutomationToggles) -> Config {
    let mut config = Config::default();
    config.automation.pipeline = PipelineSettingsInput::from_toggles(toggles);
    config.automation.concurrency.stagger_delay = Duration::ZERO;
    config.automation.dispatch_interval = Duration::from_millis(20);
    config.automation.shutdown_grace_period = Duration::from_secs(2);
    config.probe.timeout = Duration::from_secs(2);
    config
}

pub async fn harness() -> TestHarness {
    harness_with(test_config(AutomationToggles::default())).await
}

pub async fn harness_with(config: Config) -> TestHarness {
    let database = Database::new_in_memory().await.expect("in-memory database");
    database.migrate().await.expect("migrations");

    let platform = Arc::new(InMemoryPlatform::new());
    let engine = AutomationEngine::build(&config, &database, collaborators(&platform))
        .await
        .expect("engine");

    TestHarness {
        database,
        platform,
        engine,
    }
}

pub fn collaborators(platform: &Arc<InMemoryPlatform>) -> Collaborators {
    Collaborators {
        directory: platform.clone(),
        matcher: platform.clone(),
        probe: platform.clone(),
        epg: platform.clone(),
        profiles: platform.clone(),
    }
}

/// Two accounts, one group and three channels with one stream each.
/// Channel 1 carries stream 10 (account 1), channel 2 stream 20 (account 2),
/// channel 3 stream 30 (account 1).
pub async fn seed_basic(platform: &InMemoryPlatform) {
    platform.add_account(1, "Provider A", true).await;
    platform.add_account(2, "Provider B", true).await;
    platform.add_group(100, "News").await;

    platform.add_stream(10, "BBC One HD", Some(1)).await;
    platform.add_stream(20, "CNN International", Some(2)).await;
    platform.add_stream(30, "Sky News", Some(1)).await;

    platform.add_channel(1, "BBC One", Some(100), &[10]).await;
    platform.add_channel(2, "CNN", Some(100), &[20]).await;
    platform.add_channel(3, "Sky News", None, &[30]).await;
}

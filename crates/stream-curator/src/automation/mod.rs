//! Automation engine
//!
//! Turns triggers (the periodic playlist cycle, the cron global sweep, EPG
//! events and manual requests) into pipeline runs that refresh playlists,
//! match streams and queue channels for quality checks. Checks run on a
//! bounded worker pool; results feed the immunity tracker and the dead-stream
//! lifecycle manager.

pub mod check_queue;
pub mod checker;
pub mod controller;
pub mod engine;
pub mod epg_rules;
pub mod immunity;
pub mod lifecycle;
pub mod overrides;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod types;
pub mod worker_pool;

pub use check_queue::{CheckQueue, CheckQueueEntry, CheckQueueStats};
pub use checker::ChannelChecker;
pub use controller::{PipelineController, RunSummary, TriggerHandle};
pub use engine::{AutomationEngine, Collaborators};
pub use epg_rules::EpgRuleService;
pub use immunity::ImmunityTracker;
pub use lifecycle::DeadStreamLifecycleManager;
pub use scheduler::AutomationScheduler;
pub use service::AutomationService;
pub use settings::{AutomationSettingsStore, AutomationToggles};
pub use types::*;
pub use worker_pool::WorkerPool;

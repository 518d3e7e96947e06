/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/stream-curator.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8090;

// Platform defaults
pub const DEFAULT_PLATFORM_URL: &str = "http://localhost:9191";
pub const DEFAULT_PLATFORM_REQUEST_TIMEOUT: &str = "30s";
pub const DEFAULT_PATTERNS_FILE: &str = "./data/channel_patterns.json";

// Automation defaults
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_GLOBAL_SCHEDULE: &str = "0 3 * * *";
pub const DEFAULT_AUTOMATION_INTERVAL: &str = "5m";
pub const DEFAULT_DISPATCH_INTERVAL: &str = "5s";
pub const DEFAULT_SHUTDOWN_GRACE_PERIOD: &str = "30s";
pub const DEFAULT_QUEUE_MAX_SIZE: usize = 1000;
pub const DEFAULT_MAX_CHANNELS_PER_RUN: usize = 50;
pub const DEFAULT_GLOBAL_LIMIT: usize = 4;
pub const DEFAULT_STAGGER_DELAY_MS: u64 = 1000;

// Probe defaults
pub const DEFAULT_FFPROBE_COMMAND: &str = "ffprobe";
pub const DEFAULT_PROBE_TIMEOUT: &str = "30s";
pub const DEFAULT_ANALYZE_DURATION: &str = "5s";

// EPG defaults
pub const DEFAULT_EPG_REFRESH_INTERVAL: &str = "1h";
pub const DEFAULT_EPG_LOOKAHEAD: &str = "24h";

// Environment override prefix (nested keys split on "__")
pub const ENV_PREFIX: &str = "STREAM_CURATOR_";

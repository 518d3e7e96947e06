use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Kind of action recorded in the changelog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangelogAction {
    PipelineRun,
    ChannelCheck,
    ChannelCheckFailed,
    ChannelDisabled,
    ChannelReenabled,
    SnapshotCaptured,
    SnapshotDeleted,
    EmptyChannelsDisabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub id: Uuid,
    pub action: ChangelogAction,
    pub summary: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ChangelogEntry {
    pub fn new<S: Into<String>>(action: ChangelogAction, summary: S, details: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            summary: summary.into(),
            details,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_action_names_are_snake_case() {
        assert_eq!(ChangelogAction::PipelineRun.to_string(), "pipeline_run");
        assert_eq!(
            ChangelogAction::from_str("channel_check_failed").unwrap(),
            ChangelogAction::ChannelCheckFailed
        );
    }
}

//! Append-only changelog of automation activity

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, QuerySelect, Set};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::entities::{changelog_entries, prelude::ChangelogEntries};
use crate::errors::AppResult;
use crate::models::{ChangelogAction, ChangelogEntry};
use crate::platform::ChangelogSink;

#[derive(Clone)]
pub struct ChangelogRepository {
    connection: Arc<DatabaseConnection>,
}

impl ChangelogRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Most recent entries first
    pub async fn list_recent(&self, limit: u64) -> AppResult<Vec<ChangelogEntry>> {
        let models = ChangelogEntries::find()
            .order_by_desc(changelog_entries::Column::CreatedAt)
            .limit(limit)
            .all(&*self.connection)
            .await?;

        let mut entries = Vec::with_capacity(models.len());
        for model in models {
            let Ok(action) = ChangelogAction::from_str(&model.action) else {
                warn!("Skipping changelog entry {} with unknown action '{}'", model.id, model.action);
                continue;
            };
            entries.push(ChangelogEntry {
                id: model.id,
                action,
                summary: model.summary,
                details: serde_json::from_str(&model.details_json)?,
                created_at: model.created_at,
            });
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}

#[async_trait]
impl ChangelogSink for ChangelogRepository {
    async fn append(&self, entry: ChangelogEntry) -> AppResult<()> {
        changelog_entries::ActiveModel {
            id: Set(entry.id),
            action: Set(entry.action.to_string()),
            summary: Set(entry.summary),
            details_json: Set(serde_json::to_string(&entry.details)?),
            created_at: Set(entry.created_at),
        }
        .insert(&*self.connection)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::test_support;
    use serde_json::json;

    #[tokio::test]
    async fn test_append_and_list_recent() {
        let repo = ChangelogRepository::new(test_support::connection().await);
        repo.append(ChangelogEntry::new(ChangelogAction::PipelineRun, "first", json!({"n": 1})))
            .await
            .unwrap();
        repo.append(ChangelogEntry::new(ChangelogAction::ChannelCheck, "second", json!({"n": 2})))
            .await
            .unwrap();

        let entries = repo.list_recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].summary, "second");
        assert_eq!(entries[1].details["n"], 1);

        assert_eq!(repo.list_recent(1).await.unwrap().len(), 1);
    }
}

//! Channel and group matching/checking overrides

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::entities::{automation_overrides, prelude::AutomationOverrides};
use crate::errors::AppResult;
use crate::models::{FeatureMode, ModeOverride, OverrideTarget};

fn parse_mode(value: Option<&str>) -> Option<FeatureMode> {
    let value = value?;
    match FeatureMode::from_str(value) {
        Ok(mode) => Some(mode),
        Err(_) => {
            warn!("Ignoring unknown stored feature mode '{}'", value);
            None
        }
    }
}

fn model_to_override(model: &automation_overrides::Model) -> ModeOverride {
    ModeOverride {
        matching_mode: parse_mode(model.matching_mode.as_deref()),
        checking_mode: parse_mode(model.checking_mode.as_deref()),
    }
}

#[derive(Clone)]
pub struct OverrideRepository {
    connection: Arc<DatabaseConnection>,
}

impl OverrideRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    pub async fn get(&self, target: OverrideTarget, target_id: i64) -> AppResult<Option<ModeOverride>> {
        let model = AutomationOverrides::find_by_id((target.to_string(), target_id))
            .one(&*self.connection)
            .await?;
        Ok(model.as_ref().map(model_to_override))
    }

    /// All stored overrides at one level, keyed by target id
    pub async fn list(&self, target: OverrideTarget) -> AppResult<HashMap<i64, ModeOverride>> {
        let models = AutomationOverrides::find()
            .filter(automation_overrides::Column::TargetType.eq(target.to_string()))
            .all(&*self.connection)
            .await?;
        Ok(models
            .iter()
            .map(|m| (m.target_id, model_to_override(m)))
            .collect())
    }

    /// Store an override; an empty override deletes the row
    pub async fn put(&self, target: OverrideTarget, target_id: i64, value: &ModeOverride) -> AppResult<()> {
        if value.is_empty() {
            AutomationOverrides::delete_by_id((target.to_string(), target_id))
                .exec(&*self.connection)
                .await?;
            return Ok(());
        }

        let active_model = automation_overrides::ActiveModel {
            target_type: Set(target.to_string()),
            target_id: Set(target_id),
            matching_mode: Set(value.matching_mode.map(|m| m.to_string())),
            checking_mode: Set(value.checking_mode.map(|m| m.to_string())),
            updated_at: Set(Utc::now()),
        };

        AutomationOverrides::insert(active_model)
            .on_conflict(
                OnConflict::columns([
                    automation_overrides::Column::TargetType,
                    automation_overrides::Column::TargetId,
                ])
                .update_columns([
                    automation_overrides::Column::MatchingMode,
                    automation_overrides::Column::CheckingMode,
                    automation_overrides::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&*self.connection)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::test_support;

    #[tokio::test]
    async fn test_levels_are_independent() {
        let repo = OverrideRepository::new(test_support::connection().await);
        let disabled = ModeOverride {
            matching_mode: Some(FeatureMode::Disabled),
            checking_mode: None,
        };

        repo.put(OverrideTarget::Group, 5, &disabled).await.unwrap();
        assert_eq!(repo.get(OverrideTarget::Group, 5).await.unwrap(), Some(disabled));
        assert_eq!(repo.get(OverrideTarget::Channel, 5).await.unwrap(), None);

        let groups = repo.list(OverrideTarget::Group).await.unwrap();
        assert_eq!(groups.len(), 1);

        repo.put(OverrideTarget::Group, 5, &ModeOverride::default()).await.unwrap();
        assert_eq!(repo.get(OverrideTarget::Group, 5).await.unwrap(), None);
    }
}

//! Key/value store for runtime-mutable settings

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::entities::{automation_settings, prelude::AutomationSettings};
use crate::errors::AppResult;

#[derive(Clone)]
pub struct SettingsRepository {
    connection: Arc<DatabaseConnection>,
}

impl SettingsRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Load and deserialize the document stored under `key`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let model = AutomationSettings::find_by_id(key.to_string())
            .one(&*self.connection)
            .await?;

        match model {
            Some(m) => Ok(Some(serde_json::from_str(&m.value_json)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace the document stored under `key`
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> AppResult<()> {
        let active_model = automation_settings::ActiveModel {
            key: Set(key.to_string()),
            value_json: Set(serde_json::to_string(value)?),
            updated_at: Set(Utc::now()),
        };

        AutomationSettings::insert(active_model)
            .on_conflict(
                OnConflict::column(automation_settings::Column::Key)
                    .update_columns([
                        automation_settings::Column::ValueJson,
                        automation_settings::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.connection)
            .await?;
        Ok(())
    }
}

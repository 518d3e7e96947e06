//! Auto-create rule persistence

use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{auto_create_rules, prelude::AutoCreateRules};
use crate::errors::{AppError, AppResult};
use crate::models::AutoCreateRule;

fn model_to_domain(model: auto_create_rules::Model) -> AppResult<AutoCreateRule> {
    Ok(AutoCreateRule {
        id: model.id,
        name: model.name,
        channel_ids: serde_json::from_str(&model.channel_ids_json)?,
        regex_pattern: model.regex_pattern,
        minutes_before: u32::try_from(model.minutes_before).unwrap_or_default(),
        enabled: model.enabled,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn to_active_model(rule: &AutoCreateRule) -> AppResult<auto_create_rules::ActiveModel> {
    Ok(auto_create_rules::ActiveModel {
        id: Set(rule.id),
        name: Set(rule.name.clone()),
        channel_ids_json: Set(serde_json::to_string(&rule.channel_ids)?),
        regex_pattern: Set(rule.regex_pattern.clone()),
        minutes_before: Set(rule.minutes_before as i32),
        enabled: Set(rule.enabled),
        created_at: Set(rule.created_at),
        updated_at: Set(rule.updated_at),
    })
}

#[derive(Clone)]
pub struct AutoCreateRuleRepository {
    connection: Arc<DatabaseConnection>,
}

impl AutoCreateRuleRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    pub async fn list(&self) -> AppResult<Vec<AutoCreateRule>> {
        AutoCreateRules::find()
            .order_by_asc(auto_create_rules::Column::Name)
            .all(&*self.connection)
            .await?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Option<AutoCreateRule>> {
        AutoCreateRules::find_by_id(id)
            .one(&*self.connection)
            .await?
            .map(model_to_domain)
            .transpose()
    }

    pub async fn insert(&self, rule: &AutoCreateRule) -> AppResult<()> {
        to_active_model(rule)?.insert(&*self.connection).await?;
        Ok(())
    }

    pub async fn update(&self, rule: &AutoCreateRule) -> AppResult<()> {
        let mut active_model = to_active_model(rule)?;
        // Everything but the key and creation time changes
        active_model.created_at = sea_orm::ActiveValue::NotSet;
        let updated = AutoCreateRules::update(active_model).exec(&*self.connection).await;
        match updated {
            Ok(_) => Ok(()),
            Err(sea_orm::DbErr::RecordNotUpdated) => Err(AppError::not_found("auto_create_rule", rule.id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let result = AutoCreateRules::delete_by_id(id).exec(&*self.connection).await?;
        Ok(result.rows_affected > 0)
    }
}

//! Records of channels disabled by the dead-stream lifecycle manager

use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use std::sync::Arc;

use crate::entities::{lifecycle_records, prelude::LifecycleRecords};
use crate::errors::AppResult;
use crate::models::{ChannelId, LifecycleRecord, ProfileId};

fn model_to_domain(model: lifecycle_records::Model) -> LifecycleRecord {
    LifecycleRecord {
        profile_id: model.profile_id,
        channel_id: model.channel_id,
        prior_enabled: model.prior_enabled,
        reason: model.reason,
        disabled_at: model.disabled_at,
    }
}

#[derive(Clone)]
pub struct LifecycleRecordRepository {
    connection: Arc<DatabaseConnection>,
}

impl LifecycleRecordRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    pub async fn find(&self, profile_id: ProfileId, channel_id: ChannelId) -> AppResult<Option<LifecycleRecord>> {
        Ok(LifecycleRecords::find_by_id((profile_id, channel_id))
            .one(&*self.connection)
            .await?
            .map(model_to_domain))
    }

    pub async fn insert(&self, record: &LifecycleRecord) -> AppResult<()> {
        lifecycle_records::ActiveModel {
            profile_id: Set(record.profile_id),
            channel_id: Set(record.channel_id),
            prior_enabled: Set(record.prior_enabled),
            reason: Set(record.reason.clone()),
            disabled_at: Set(record.disabled_at),
        }
        .insert(&*self.connection)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, profile_id: ProfileId, channel_id: ChannelId) -> AppResult<bool> {
        let result = LifecycleRecords::delete_by_id((profile_id, channel_id))
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn list(&self) -> AppResult<Vec<LifecycleRecord>> {
        Ok(LifecycleRecords::find()
            .order_by_asc(lifecycle_records::Column::ProfileId)
            .order_by_asc(lifecycle_records::Column::ChannelId)
            .all(&*self.connection)
            .await?
            .into_iter()
            .map(model_to_domain)
            .collect())
    }
}

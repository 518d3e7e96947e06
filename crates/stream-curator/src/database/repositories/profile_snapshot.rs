//! Profile snapshot persistence, one row per profile

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, Set};
use std::sync::Arc;

use crate::entities::{prelude::ProfileSnapshots, profile_snapshots};
use crate::errors::AppResult;
use crate::models::{ProfileId, ProfileSnapshot};
use crate::platform::SnapshotStore;

fn model_to_domain(model: profile_snapshots::Model) -> AppResult<ProfileSnapshot> {
    Ok(ProfileSnapshot {
        profile_id: model.profile_id,
        profile_name: model.profile_name,
        captured_at: model.captured_at,
        channel_states: serde_json::from_str(&model.channel_states_json)?,
    })
}

#[derive(Clone)]
pub struct ProfileSnapshotRepository {
    connection: Arc<DatabaseConnection>,
}

impl ProfileSnapshotRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl SnapshotStore for ProfileSnapshotRepository {
    async fn save(&self, snapshot: &ProfileSnapshot) -> AppResult<()> {
        let active_model = profile_snapshots::ActiveModel {
            profile_id: Set(snapshot.profile_id),
            profile_name: Set(snapshot.profile_name.clone()),
            captured_at: Set(snapshot.captured_at),
            channel_states_json: Set(serde_json::to_string(&snapshot.channel_states)?),
        };

        ProfileSnapshots::insert(active_model)
            .on_conflict(
                OnConflict::column(profile_snapshots::Column::ProfileId)
                    .update_columns([
                        profile_snapshots::Column::ProfileName,
                        profile_snapshots::Column::CapturedAt,
                        profile_snapshots::Column::ChannelStatesJson,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.connection)
            .await?;
        Ok(())
    }

    async fn get(&self, profile_id: ProfileId) -> AppResult<Option<ProfileSnapshot>> {
        ProfileSnapshots::find_by_id(profile_id)
            .one(&*self.connection)
            .await?
            .map(model_to_domain)
            .transpose()
    }

    async fn delete(&self, profile_id: ProfileId) -> AppResult<bool> {
        let result = ProfileSnapshots::delete_by_id(profile_id)
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn list(&self) -> AppResult<Vec<ProfileSnapshot>> {
        ProfileSnapshots::find()
            .order_by_asc(profile_snapshots::Column::ProfileId)
            .all(&*self.connection)
            .await?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }
}

use sea_orm::entity::prelude::*;

/// At most one snapshot per profile, keyed by the profile id
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "profile_snapshots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub profile_id: i64,
    pub profile_name: String,
    pub captured_at: DateTimeUtc,
    /// JSON array of {channel_id, enabled}
    pub channel_states_json: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "auto_create_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// JSON array of channel ids
    pub channel_ids_json: String,
    pub regex_pattern: String,
    pub minutes_before: i32,
    pub enabled: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::scheduled_events::Entity")]
    ScheduledEvents,
}

impl Related<super::scheduled_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScheduledEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

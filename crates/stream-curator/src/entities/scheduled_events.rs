use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "scheduled_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub channel_id: i64,
    pub program_title: String,
    pub program_start: DateTimeUtc,
    pub program_end: DateTimeUtc,
    pub minutes_before: i32,
    pub check_time: DateTimeUtc,
    /// Generating rule; NULL for manually created events
    pub rule_id: Option<Uuid>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::auto_create_rules::Entity",
        from = "Column::RuleId",
        to = "super::auto_create_rules::Column::Id"
    )]
    AutoCreateRules,
}

impl Related<super::auto_create_rules::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AutoCreateRules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

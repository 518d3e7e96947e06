//! SeaORM migrations for the automation schema

use sea_orm_migration::prelude::*;

/// Implements `MigrationName` for a folder-based migration (`<name>/mod.rs`),
/// using the folder name instead of the `mod` that `DeriveMigrationName`
/// would produce.
#[macro_export]
macro_rules! folder_migration_name {
    () => {
        impl sea_orm_migration::MigrationName for Migration {
            fn name(&self) -> &str {
                static NAME: ::std::sync::OnceLock<String> = ::std::sync::OnceLock::new();
                NAME.get_or_init(|| {
                    let folder = file!()
                        .trim_end_matches("mod.rs")
                        .trim_end_matches(['/', '\\']);
                    folder
                        .rsplit(['/', '\\'])
                        .next()
                        .unwrap_or_default()
                        .to_string()
                })
            }
        }
    };
}

pub mod m20251001_000001_automation_schema;
pub mod m20251001_000002_lookup_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251001_000001_automation_schema::Migration),
            Box::new(m20251001_000002_lookup_indexes::Migration),
        ]
    }
}

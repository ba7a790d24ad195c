//! SeaORM database migrations.

pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_scripts;
mod m20250601_000002_create_test_cases;
mod m20250601_000003_create_chat;
mod m20250601_000004_create_fa_transcriptions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_scripts::Migration),
            Box::new(m20250601_000002_create_test_cases::Migration),
            Box::new(m20250601_000003_create_chat::Migration),
            Box::new(m20250601_000004_create_fa_transcriptions::Migration),
        ]
    }
}

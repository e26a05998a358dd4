pub use sea_orm_migration::prelude::*;

mod m20261001_000000_init;

/// Database file used when neither the app settings nor `DATABASE_URL` name
/// one.
pub const DEFAULT_SQLITE_PATH: &str = "splitledger.db";

/// Connection URL for a SQLite file, created on first use.
pub fn sqlite_url(path: &str) -> String {
    format!("sqlite:{path}?mode=rwc")
}

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20261001_000000_init::Migration)]
    }
}

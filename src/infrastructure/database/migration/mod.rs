//! Database migrations

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240301_000001_create_initial_tables::Migration)]
    }
}

mod m20240301_000001_create_initial_tables;

use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_bom_headers_table::Migration),
            Box::new(m20240101_000003_create_bom_components_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // bom_id is the active-BOM slot. It carries no foreign key because
            // the header it points at is inserted in the same transaction that
            // claims the slot; the writer owns the invariant.
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Products::Sku)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).string().null())
                        .col(
                            ColumnDef::new(Products::IsBom)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Products::BomId).uuid().null())
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_bom_id")
                        .table(Products::Table)
                        .col(Products::BomId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Sku,
        Name,
        Description,
        IsBom,
        BomId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_bom_headers_table {
    use super::m20240101_000001_create_products_table::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_bom_headers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BomHeaders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomHeaders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomHeaders::BomNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(BomHeaders::ProductId).uuid().not_null())
                        .col(ColumnDef::new(BomHeaders::Name).string().not_null())
                        .col(ColumnDef::new(BomHeaders::Description).string().null())
                        .col(
                            ColumnDef::new(BomHeaders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(BomHeaders::Status)
                                .string()
                                .not_null()
                                .default("draft"),
                        )
                        .col(
                            ColumnDef::new(BomHeaders::LaborCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BomHeaders::OverheadCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BomHeaders::TotalCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BomHeaders::TotalQuantity)
                                .decimal()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(BomHeaders::UnitOfMeasure)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BomHeaders::CreatedBy).string().null())
                        .col(ColumnDef::new(BomHeaders::Notes).string().null())
                        .col(ColumnDef::new(BomHeaders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(BomHeaders::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_headers_product_id")
                                .from(BomHeaders::Table, BomHeaders::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_headers_product_id")
                        .table(BomHeaders::Table)
                        .col(BomHeaders::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_headers_product_status")
                        .table(BomHeaders::Table)
                        .col(BomHeaders::ProductId)
                        .col(BomHeaders::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomHeaders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum BomHeaders {
        Table,
        Id,
        BomNumber,
        ProductId,
        Name,
        Description,
        Version,
        Status,
        LaborCost,
        OverheadCost,
        TotalCost,
        TotalQuantity,
        UnitOfMeasure,
        CreatedBy,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_bom_components_table {
    use super::m20240101_000001_create_products_table::Products;
    use super::m20240101_000002_create_bom_headers_table::BomHeaders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_bom_components_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BomComponents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomComponents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BomComponents::BomId).uuid().not_null())
                        .col(
                            ColumnDef::new(BomComponents::LineNumber)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomComponents::ComponentProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomComponents::QuantityRequired)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomComponents::UnitOfMeasure)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomComponents::WastePercentage)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BomComponents::UnitCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(BomComponents::SupplierId).uuid().null())
                        .col(ColumnDef::new(BomComponents::Notes).string().null())
                        .col(
                            ColumnDef::new(BomComponents::QuantityWithWaste)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomComponents::TotalCost)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomComponents::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomComponents::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_components_bom_id")
                                .from(BomComponents::Table, BomComponents::BomId)
                                .to(BomHeaders::Table, BomHeaders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_components_component_product_id")
                                .from(BomComponents::Table, BomComponents::ComponentProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_components_bom_id")
                        .table(BomComponents::Table)
                        .col(BomComponents::BomId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_components_bom_line")
                        .table(BomComponents::Table)
                        .col(BomComponents::BomId)
                        .col(BomComponents::LineNumber)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomComponents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BomComponents {
        Table,
        Id,
        BomId,
        LineNumber,
        ComponentProductId,
        QuantityRequired,
        UnitOfMeasure,
        WastePercentage,
        UnitCost,
        SupplierId,
        Notes,
        QuantityWithWaste,
        TotalCost,
        CreatedAt,
        UpdatedAt,
    }
}

// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    let result = Migrator::up(&db, None).await;

    match result {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}

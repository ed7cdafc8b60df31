use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_stock_items_table::Migration),
            Box::new(m20240101_000002_create_stock_movements_table::Migration),
            Box::new(m20240101_000003_create_stock_reservations_table::Migration),
            Box::new(m20240101_000004_create_location_stock_settings_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_stock_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_stock_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockItems::ItemId).uuid().not_null())
                        .col(ColumnDef::new(StockItems::LocationId).uuid().not_null())
                        .col(ColumnDef::new(StockItems::CatalogItemId).string().null())
                        .col(ColumnDef::new(StockItems::CatalogOrigin).string().null())
                        .col(ColumnDef::new(StockItems::LotNumber).string().null())
                        .col(ColumnDef::new(StockItems::LotExpiresAt).timestamp().null())
                        .col(ColumnDef::new(StockItems::SerialNumber).string().null())
                        .col(
                            ColumnDef::new(StockItems::Quantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockItems::ReservedQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockItems::WorkspaceId).uuid().null())
                        .col(
                            ColumnDef::new(StockItems::Version)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockItems::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(StockItems::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_items_item_location")
                        .table(StockItems::Table)
                        .col(StockItems::ItemId)
                        .col(StockItems::LocationId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_items_location_id")
                        .table(StockItems::Table)
                        .col(StockItems::LocationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockItems {
        Table,
        Id,
        ItemId,
        LocationId,
        CatalogItemId,
        CatalogOrigin,
        LotNumber,
        LotExpiresAt,
        SerialNumber,
        Quantity,
        ReservedQuantity,
        WorkspaceId,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_stock_movements_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::ItemId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::LocationId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::Quantity).decimal().not_null())
                        .col(ColumnDef::new(StockMovements::LotNumber).string().null())
                        .col(
                            ColumnDef::new(StockMovements::SourceLocationId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::DestinationLocationId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ReferenceType)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(StockMovements::ReferenceId).uuid().null())
                        .col(ColumnDef::new(StockMovements::Reason).string().null())
                        .col(ColumnDef::new(StockMovements::Status).string().not_null())
                        .col(ColumnDef::new(StockMovements::BalanceAfter).decimal().null())
                        .col(ColumnDef::new(StockMovements::PerformedBy).string().null())
                        .col(ColumnDef::new(StockMovements::WorkspaceId).uuid().null())
                        .col(ColumnDef::new(StockMovements::Meta).json().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::ProcessedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_item_location")
                        .table(StockMovements::Table)
                        .col(StockMovements::ItemId)
                        .col(StockMovements::LocationId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_reference")
                        .table(StockMovements::Table)
                        .col(StockMovements::ReferenceType)
                        .col(StockMovements::ReferenceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        MovementType,
        ItemId,
        LocationId,
        Quantity,
        LotNumber,
        SourceLocationId,
        DestinationLocationId,
        ReferenceType,
        ReferenceId,
        Reason,
        Status,
        BalanceAfter,
        PerformedBy,
        WorkspaceId,
        Meta,
        CreatedAt,
        ProcessedAt,
    }
}

mod m20240101_000003_create_stock_reservations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_reservations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockReservations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockReservations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockReservations::ItemId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockReservations::LocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReservations::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockReservations::Status).string().not_null())
                        .col(ColumnDef::new(StockReservations::ReservedBy).string().null())
                        .col(
                            ColumnDef::new(StockReservations::ReferenceType)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(StockReservations::ReferenceId).uuid().null())
                        .col(ColumnDef::new(StockReservations::ExpiresAt).timestamp().null())
                        .col(
                            ColumnDef::new(StockReservations::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockReservations::ReleasedAt).timestamp().null())
                        .col(
                            ColumnDef::new(StockReservations::RejectionReason)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(StockReservations::WorkspaceId).uuid().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_reservations_status_expires")
                        .table(StockReservations::Table)
                        .col(StockReservations::Status)
                        .col(StockReservations::ExpiresAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_reservations_item_location")
                        .table(StockReservations::Table)
                        .col(StockReservations::ItemId)
                        .col(StockReservations::LocationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockReservations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockReservations {
        Table,
        Id,
        ItemId,
        LocationId,
        Quantity,
        Status,
        ReservedBy,
        ReferenceType,
        ReferenceId,
        ExpiresAt,
        CreatedAt,
        ReleasedAt,
        RejectionReason,
        WorkspaceId,
    }
}

mod m20240101_000004_create_location_stock_settings_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_location_stock_settings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LocationStockSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LocationStockSettings::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::LocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::MaxQuantity)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::MaxWeight)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::MaxVolume)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::AllowedItemTypes)
                                .json()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::AllowMixedLots)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::AllowMixedSkus)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::AllowNegativeStock)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::MaxReservationPercentage)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::FifoEnforced)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::WorkspaceId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(LocationStockSettings::Meta).json().null())
                        .col(
                            ColumnDef::new(LocationStockSettings::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LocationStockSettings::UpdatedAt)
                                .timestamp()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_location_stock_settings_location")
                        .table(LocationStockSettings::Table)
                        .col(LocationStockSettings::LocationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(LocationStockSettings::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    enum LocationStockSettings {
        Table,
        Id,
        LocationId,
        MaxQuantity,
        MaxWeight,
        MaxVolume,
        AllowedItemTypes,
        AllowMixedLots,
        AllowMixedSkus,
        AllowNegativeStock,
        MaxReservationPercentage,
        FifoEnforced,
        IsActive,
        WorkspaceId,
        Meta,
        CreatedAt,
        UpdatedAt,
    }
}

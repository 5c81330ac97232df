use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_inventory_levels_table::Migration),
            Box::new(m20240101_000002_create_reservations_table::Migration),
            Box::new(m20240101_000003_create_reservation_movements_table::Migration),
            Box::new(m20240101_000004_create_sales_orders_table::Migration),
            Box::new(m20240101_000005_create_sales_order_items_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_inventory_levels_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_inventory_levels_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryLevels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryLevels::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLevels::ProductId).uuid().not_null())
                        .col(ColumnDef::new(InventoryLevels::VariantId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryLevels::LocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::QuantityOnHand)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::QuantityReserved)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLevels::UpdatedAt).timestamp_with_time_zone().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uidx_inventory_levels_scope")
                        .table(InventoryLevels::Table)
                        .col(InventoryLevels::ProductId)
                        .col(InventoryLevels::VariantId)
                        .col(InventoryLevels::LocationId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryLevels::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryLevels {
        Table,
        Id,
        ProductId,
        VariantId,
        LocationId,
        QuantityOnHand,
        QuantityReserved,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_reservations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_reservations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Reservations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Reservations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Reservations::ReservationNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Reservations::OrganizationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Reservations::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Reservations::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Reservations::VariantId).uuid().null())
                        .col(ColumnDef::new(Reservations::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(Reservations::ReservedQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Reservations::ReleasedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Reservations::Status).string().not_null())
                        .col(
                            ColumnDef::new(Reservations::ReferenceType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Reservations::ReferenceId).uuid().null())
                        .col(
                            ColumnDef::new(Reservations::ReferenceNumber)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Reservations::ReservedFor).string().null())
                        .col(
                            ColumnDef::new(Reservations::Priority)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Reservations::AutoRelease)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Reservations::ExpiresAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Reservations::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(Reservations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Reservations::CancelledBy).uuid().null())
                        .col(ColumnDef::new(Reservations::CancelledAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Reservations::CancellationReason)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Reservations::FulfilledBy).uuid().null())
                        .col(ColumnDef::new(Reservations::FulfilledAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Reservations::UpdatedAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Reservations::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uidx_reservations_number")
                        .table(Reservations::Table)
                        .col(Reservations::ReservationNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reservations_status")
                        .table(Reservations::Table)
                        .col(Reservations::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reservations_reference")
                        .table(Reservations::Table)
                        .col(Reservations::ReferenceType)
                        .col(Reservations::ReferenceId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reservations_expires_at")
                        .table(Reservations::Table)
                        .col(Reservations::ExpiresAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Reservations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Reservations {
        Table,
        Id,
        ReservationNumber,
        OrganizationId,
        BranchId,
        ProductId,
        VariantId,
        LocationId,
        ReservedQuantity,
        ReleasedQuantity,
        Status,
        ReferenceType,
        ReferenceId,
        ReferenceNumber,
        ReservedFor,
        Priority,
        AutoRelease,
        ExpiresAt,
        CreatedBy,
        CreatedAt,
        CancelledBy,
        CancelledAt,
        CancellationReason,
        FulfilledBy,
        FulfilledAt,
        UpdatedAt,
        Version,
    }
}

mod m20240101_000003_create_reservation_movements_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_reservation_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReservationMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReservationMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationMovements::ReservationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationMovements::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationMovements::VariantId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ReservationMovements::LocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationMovements::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationMovements::IdempotencyKey)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(ReservationMovements::Notes).string().null())
                        .col(
                            ColumnDef::new(ReservationMovements::CreatedBy)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ReservationMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_reservation_movements_reservation")
                                .from(
                                    ReservationMovements::Table,
                                    ReservationMovements::ReservationId,
                                )
                                .to(
                                    super::m20240101_000002_create_reservations_table::Reservations::Table,
                                    super::m20240101_000002_create_reservations_table::Reservations::Id,
                                ),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reservation_movements_reservation_id")
                        .table(ReservationMovements::Table)
                        .col(ReservationMovements::ReservationId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uidx_reservation_movements_idempotency_key")
                        .table(ReservationMovements::Table)
                        .col(ReservationMovements::IdempotencyKey)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReservationMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ReservationMovements {
        Table,
        Id,
        ReservationId,
        MovementType,
        ProductId,
        VariantId,
        LocationId,
        Quantity,
        IdempotencyKey,
        Notes,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240101_000004_create_sales_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_sales_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::OrderNumber).string().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::OrganizationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::BranchId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::CancellationReason)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(SalesOrders::CreatedBy).uuid().null())
                        .col(ColumnDef::new(SalesOrders::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(SalesOrders::UpdatedAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(SalesOrders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uidx_sales_orders_order_number")
                        .table(SalesOrders::Table)
                        .col(SalesOrders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_orders_status")
                        .table(SalesOrders::Table)
                        .col(SalesOrders::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum SalesOrders {
        Table,
        Id,
        OrderNumber,
        OrganizationId,
        BranchId,
        Status,
        CancellationReason,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240101_000005_create_sales_order_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_sales_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderItems::VariantId).uuid().null())
                        .col(ColumnDef::new(SalesOrderItems::LocationId).uuid().null())
                        .col(
                            ColumnDef::new(SalesOrderItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::QuantityFulfilled)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::ReservationId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrderItems::UpdatedAt).timestamp_with_time_zone().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_order_items_order")
                                .from(SalesOrderItems::Table, SalesOrderItems::OrderId)
                                .to(
                                    super::m20240101_000004_create_sales_orders_table::SalesOrders::Table,
                                    super::m20240101_000004_create_sales_orders_table::SalesOrders::Id,
                                ),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_order_items_order_id")
                        .table(SalesOrderItems::Table)
                        .col(SalesOrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesOrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum SalesOrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        VariantId,
        LocationId,
        Quantity,
        QuantityFulfilled,
        ReservationId,
        CreatedAt,
        UpdatedAt,
    }
}

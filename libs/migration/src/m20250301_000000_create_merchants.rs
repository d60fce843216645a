use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Merchants::Table)
                    .if_not_exists()
                    .col(blob(Merchants::MerchantId).primary_key())
                    .col(text(Merchants::Name))
                    .col(text(Merchants::WalletAddress))
                    .col(text(Merchants::Status).default("PENDING"))
                    .col(
                        timestamp_with_time_zone(Merchants::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                ALTER TABLE merchants
                    ADD CONSTRAINT merchants_id_len_chk CHECK (octet_length(merchant_id) = 32),
                    ADD CONSTRAINT merchants_status_chk CHECK (status IN ('PENDING', 'ACTIVE', 'DISABLED'))
                "#,
            )
            .await?;

        // Constraint names are matched by the store when classifying conflicts.
        manager
            .create_index(
                Index::create()
                    .name("merchants_name_uidx")
                    .table(Merchants::Table)
                    .col(Merchants::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("merchants_wallet_uidx")
                    .table(Merchants::Table)
                    .col(Merchants::WalletAddress)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Merchants::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Merchants {
    Table,
    MerchantId,
    Name,
    WalletAddress,
    Status,
    CreatedAt,
}

use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250301_000000_create_merchants::Merchants;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChainRegistrations::Table)
                    .if_not_exists()
                    .col(blob(ChainRegistrations::MerchantId).primary_key())
                    .col(text(ChainRegistrations::Txid))
                    .col(
                        timestamp_with_time_zone(ChainRegistrations::RegisteredAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("chain_registrations_merchant_fk")
                            .from(ChainRegistrations::Table, ChainRegistrations::MerchantId)
                            .to(Merchants::Table, Merchants::MerchantId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChainRegistrations::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum ChainRegistrations {
    Table,
    MerchantId,
    Txid,
    RegisteredAt,
}

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
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_uuid(Users::UserUid))
                    .col(blob_null(Users::MerchantId))
                    .col(text(Users::Email))
                    .col(text(Users::PasswordHash))
                    .col(text(Users::Role))
                    .col(text(Users::Status).default("ACTIVE"))
                    .col(
                        timestamp_with_time_zone(Users::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("users_merchant_fk")
                            .from(Users::Table, Users::MerchantId)
                            .to(Merchants::Table, Merchants::MerchantId)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // A MERCHANT user always owns a merchant; an ADMIN never does.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                ALTER TABLE users
                    ADD CONSTRAINT users_role_chk CHECK (role IN ('ADMIN', 'MERCHANT')),
                    ADD CONSTRAINT users_status_chk CHECK (status IN ('ACTIVE', 'DISABLED')),
                    ADD CONSTRAINT users_role_merchant_chk
                        CHECK ((role = 'MERCHANT') = (merchant_id IS NOT NULL))
                "#,
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared("CREATE UNIQUE INDEX users_email_uidx ON users (lower(email))")
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_merchant_id")
                    .table(Users::Table)
                    .col(Users::MerchantId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    UserUid,
    MerchantId,
    Email,
    PasswordHash,
    Role,
    Status,
    CreatedAt,
}

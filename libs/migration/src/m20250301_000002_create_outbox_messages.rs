use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OutboxMessages::Table)
                    .if_not_exists()
                    .col(pk_uuid(OutboxMessages::Id))
                    .col(text(OutboxMessages::AggregateId))
                    .col(text(OutboxMessages::RoutingKey))
                    .col(json_binary(OutboxMessages::Payload))
                    .col(
                        timestamp_with_time_zone(OutboxMessages::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(OutboxMessages::PublishedAt))
                    .col(integer(OutboxMessages::Attempts).default(0))
                    .col(text_null(OutboxMessages::LastError))
                    .to_owned(),
            )
            .await?;

        // The relay only ever scans unpublished rows, oldest first.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE INDEX outbox_messages_pending_idx
                    ON outbox_messages (created_at)
                    WHERE published_at IS NULL
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OutboxMessages::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OutboxMessages {
    Table,
    Id,
    AggregateId,
    RoutingKey,
    Payload,
    CreatedAt,
    PublishedAt,
    Attempts,
    LastError,
}

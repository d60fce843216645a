use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, FromQueryResult, RuntimeErr, Statement,
    TransactionTrait, sqlx::error::DatabaseError,
};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ConflictKind, MerchantError, MerchantResult};
use crate::models::{
    ChainRegistration, Merchant, MerchantId, NewRegistration, OutboxMessage, Role, User,
    UserStatus,
};
use crate::repository::{MerchantRepository, OutboxRepository, RegistrationLedger};

/// PostgreSQL implementation of the onboarding stores, on raw statements.
#[derive(Clone)]
pub struct PgMerchantRepository {
    db: DatabaseConnection,
}

impl PgMerchantRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct UserRow {
    user_uid: Uuid,
    merchant_id: Option<Vec<u8>>,
    email: String,
    password_hash: String,
    role: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = MerchantError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            user_uid: row.user_uid,
            merchant_id: row
                .merchant_id
                .as_deref()
                .map(MerchantId::from_slice)
                .transpose()?,
            email: row.email,
            password_hash: row.password_hash,
            role: Role::from_str(&row.role)
                .map_err(|_| MerchantError::Internal(format!("unknown role {}", row.role)))?,
            status: UserStatus::from_str(&row.status)
                .map_err(|_| MerchantError::Internal(format!("unknown status {}", row.status)))?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromQueryResult)]
struct LedgerRow {
    merchant_id: Vec<u8>,
    txid: String,
    registered_at: DateTime<Utc>,
}

#[derive(Debug, FromQueryResult)]
struct OutboxRow {
    id: Uuid,
    aggregate_id: String,
    routing_key: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
    attempts: i32,
}

impl From<OutboxRow> for OutboxMessage {
    fn from(row: OutboxRow) -> Self {
        OutboxMessage {
            id: row.id,
            aggregate_id: row.aggregate_id,
            routing_key: row.routing_key,
            payload: row.payload,
            created_at: row.created_at,
            published_at: row.published_at,
            attempts: row.attempts,
        }
    }
}

/// The driver-level error behind a failed statement, if the server sent one.
fn database_error(err: &DbErr) -> Option<&dyn DatabaseError> {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
            e.as_database_error()
        }
        _ => None,
    }
}

/// Unique violations become classified conflicts keyed on the constraint
/// name the server reports; everything else passes through as a database
/// error.
fn classify(err: DbErr) -> MerchantError {
    let conflict = database_error(&err)
        .filter(|db| db.is_unique_violation() || db.code().as_deref() == Some("23505"))
        .map(|db| {
            let constraint = db.constraint();
            let kind = ConflictKind::from_constraint(constraint);
            tracing::debug!(?constraint, kind = kind.as_str(), "Unique constraint violated");
            kind
        });

    match conflict {
        Some(kind) => MerchantError::Conflict(kind),
        None => MerchantError::Database(err),
    }
}

fn insert_user(user: &User) -> Statement {
    Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
            INSERT INTO users (user_uid, merchant_id, email, password_hash, role, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
        [
            user.user_uid.into(),
            user.merchant_id.map(|id| id.as_bytes().to_vec()).into(),
            user.email.clone().into(),
            user.password_hash.clone().into(),
            user.role.to_string().into(),
            user.status.to_string().into(),
            user.created_at.into(),
        ],
    )
}

#[async_trait]
impl MerchantRepository for PgMerchantRepository {
    async fn create_with_owner(&self, registration: NewRegistration) -> MerchantResult<Merchant> {
        let NewRegistration {
            merchant,
            owner,
            event,
        } = registration;

        // Dropping the transaction without commit rolls it back.
        let txn = self.db.begin().await?;

        txn.execute_raw(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
                INSERT INTO merchants (merchant_id, name, wallet_address, status, created_at)
                VALUES ($1, $2, $3, $4, $5)
            "#,
            [
                merchant.merchant_id.as_bytes().to_vec().into(),
                merchant.name.clone().into(),
                merchant.wallet_address.clone().into(),
                merchant.status.to_string().into(),
                merchant.created_at.into(),
            ],
        ))
        .await
        .map_err(classify)?;

        txn.execute_raw(insert_user(&owner))
            .await
            .map_err(classify)?;

        txn.execute_raw(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
                INSERT INTO outbox_messages (id, aggregate_id, routing_key, payload, created_at)
                VALUES ($1, $2, $3, $4, $5)
            "#,
            [
                event.id.into(),
                event.aggregate_id.clone().into(),
                event.routing_key.clone().into(),
                event.payload.clone().into(),
                event.created_at.into(),
            ],
        ))
        .await
        .map_err(classify)?;

        txn.commit().await?;

        tracing::info!(
            merchant_id = %merchant.merchant_id,
            user_uid = %owner.user_uid,
            outbox_id = %event.id,
            "Committed merchant registration"
        );
        Ok(merchant)
    }

    async fn create_admin(&self, user: User) -> MerchantResult<User> {
        self.db
            .execute_raw(insert_user(&user))
            .await
            .map_err(classify)?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> MerchantResult<Option<User>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
                SELECT user_uid, merchant_id, email, password_hash, role, status, created_at
                FROM users WHERE lower(email) = lower($1)
            "#,
            [email.into()],
        );

        UserRow::find_by_statement(stmt)
            .one(&self.db)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl RegistrationLedger for PgMerchantRepository {
    async fn find(&self, merchant_id: &MerchantId) -> MerchantResult<Option<ChainRegistration>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT merchant_id, txid, registered_at FROM chain_registrations WHERE merchant_id = $1",
            [merchant_id.as_bytes().to_vec().into()],
        );

        let Some(row) = LedgerRow::find_by_statement(stmt).one(&self.db).await? else {
            return Ok(None);
        };
        Ok(Some(ChainRegistration {
            merchant_id: MerchantId::from_slice(&row.merchant_id)?,
            txid: row.txid,
            registered_at: row.registered_at,
        }))
    }

    async fn record(&self, merchant_id: &MerchantId, txid: &str) -> MerchantResult<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
                INSERT INTO chain_registrations (merchant_id, txid, registered_at)
                VALUES ($1, $2, now())
                ON CONFLICT (merchant_id) DO NOTHING
            "#,
            [merchant_id.as_bytes().to_vec().into(), txid.into()],
        );
        self.db.execute_raw(stmt).await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for PgMerchantRepository {
    async fn fetch_pending(&self, limit: u64) -> MerchantResult<Vec<OutboxMessage>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
                SELECT id, aggregate_id, routing_key, payload, created_at, published_at, attempts
                FROM outbox_messages
                WHERE published_at IS NULL
                ORDER BY created_at, id
                LIMIT $1
            "#,
            [(limit as i64).into()],
        );

        let rows = OutboxRow::find_by_statement(stmt).all(&self.db).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_published(&self, id: Uuid) -> MerchantResult<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE outbox_messages SET published_at = now() WHERE id = $1 AND published_at IS NULL",
            [id.into()],
        );
        self.db.execute_raw(stmt).await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> MerchantResult<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE outbox_messages SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
            [id.into(), error.into()],
        );
        self.db.execute_raw(stmt).await?;
        Ok(())
    }
}

//! Session relation on the Postgres identity store.

use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::instrument;
use uuid::Uuid;

use warden_core::IdentityId;
use warden_schema::{StorageColumnSpec, TableSpec};

use super::{Session, SessionStore};
use crate::identity_store::postgres::{bind_value, decode_record, map_sqlx_error, quote};
use crate::identity_store::{PostgresIdentityStore, StoreError, identity_value};

impl PostgresIdentityStore {
    fn sessions(&self) -> Result<(&TableSpec, &StorageColumnSpec), StoreError> {
        let table = self
            .schema_arc()
            .sessions
            .as_ref()
            .ok_or_else(|| StoreError::Backend("session relation not configured".to_string()))?;
        let owner = table
            .column(self.schema_arc().owner_column())
            .ok_or_else(|| StoreError::Backend("session relation has no owner column".to_string()))?;
        Ok((table, owner))
    }

    async fn session_where(&self, column: &str, value: Uuid) -> Result<Option<Session>, StoreError> {
        let (table, owner) = self.sessions()?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = $1",
            table.qualified_name(),
            quote(column)
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("read_session", e))?;
        row.map(|r| decode_session(table, &owner.name, &r)).transpose()
    }
}

fn decode_session(table: &TableSpec, owner_column: &str, row: &PgRow) -> Result<Session, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("read_session", e);
    let record = decode_record(table, row)?;
    let owner = IdentityId::from_value(record.get_or_null(owner_column))
        .ok_or_else(|| StoreError::Backend("session owner is not an identity value".to_string()))?;
    Ok(Session {
        id: row.try_get("id").map_err(decode)?,
        owner,
        access: row.try_get("access").map_err(decode)?,
        refresh: row.try_get("refresh").map_err(decode)?,
        expires_at: row.try_get("expires_at").map_err(decode)?,
    })
}

#[async_trait::async_trait]
impl SessionStore for PostgresIdentityStore {
    #[instrument(skip(self, session), fields(owner = %session.owner), err)]
    async fn upsert(&self, session: Session) -> Result<(), StoreError> {
        let (table, owner) = self.sessions()?;
        let owner_col = quote(&owner.name);
        let sql = format!(
            "INSERT INTO {table} (\"id\", {owner_col}, \"access\", \"refresh\", \"expires_at\") \
             VALUES ($1, $2::{ty}, $3, $4, $5) \
             ON CONFLICT ({owner_col}) DO UPDATE SET \"id\" = EXCLUDED.\"id\", \
             \"access\" = EXCLUDED.\"access\", \"refresh\" = EXCLUDED.\"refresh\", \
             \"expires_at\" = EXCLUDED.\"expires_at\"",
            table = table.qualified_name(),
            ty = owner.storage_type.sql(),
        );
        let key = identity_value(self.schema_arc(), &session.owner);
        let query = sqlx::query(&sql).bind(session.id);
        bind_value(query, &key, owner.storage_type)
            .bind(session.access)
            .bind(session.refresh)
            .bind(session.expires_at)
            .execute(self.pool())
            .await
            .map_err(|e| map_sqlx_error("upsert_session", e))?;
        Ok(())
    }

    async fn by_access(&self, access: Uuid) -> Result<Option<Session>, StoreError> {
        self.session_where("access", access).await
    }

    async fn by_refresh(&self, refresh: Uuid) -> Result<Option<Session>, StoreError> {
        self.session_where("refresh", refresh).await
    }

    #[instrument(skip(self, access), err)]
    async fn remove(&self, access: Uuid) -> Result<bool, StoreError> {
        let (table, _) = self.sessions()?;
        let sql = format!("DELETE FROM {} WHERE \"access\" = $1", table.qualified_name());
        let result = sqlx::query(&sql)
            .bind(access)
            .execute(self.pool())
            .await
            .map_err(|e| map_sqlx_error("remove_session", e))?;
        Ok(result.rows_affected() > 0)
    }
}

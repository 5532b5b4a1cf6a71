//! Postgres-backed identity store.
//!
//! SQL is generated from the [`StorageSchema`]: every statement names the
//! relations and columns the schema declares, and every bound value is cast to
//! its column's storage type.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (not-null violation) | `23502` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;

use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::{info, instrument, warn};

use warden_auth::{PermissionCatalog, PermissionId};
use warden_core::{IdentityId, Record, Value};
use warden_schema::{Generation, StorageColumnSpec, StorageSchema, StorageType, TableSpec};

use super::predicate::{Predicate, identity_value};
use super::r#trait::{IdentityStore, StoreError};

pub(crate) type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Postgres-backed identity store.
///
/// `Send + Sync`; all operations go through the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresIdentityStore {
    pool: PgPool,
    schema: Arc<StorageSchema>,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool, schema: Arc<StorageSchema>) -> Self {
        Self { pool, schema }
    }

    pub async fn connect(database_url: &str, schema: Arc<StorageSchema>) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, schema))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn schema_arc(&self) -> &Arc<StorageSchema> {
        &self.schema
    }

    fn identity_spec(&self) -> Result<&StorageColumnSpec, StoreError> {
        self.schema
            .entity
            .primary_key()
            .ok_or_else(|| StoreError::Backend("entity relation has no primary key".to_string()))
    }

    fn entity_column(&self, name: &str) -> Result<&StorageColumnSpec, StoreError> {
        self.schema
            .entity
            .column(name)
            .ok_or_else(|| StoreError::Backend(format!("unknown column '{name}'")))
    }

    /// `WHERE` clause for `predicate`, numbering placeholders from `first`.
    fn where_clause<'a>(
        &self,
        predicate: &'a Predicate,
        first: usize,
    ) -> Result<(String, Vec<(&'a Value, StorageType)>), StoreError> {
        let mut clauses = Vec::with_capacity(predicate.len());
        let mut binds = Vec::with_capacity(predicate.len());
        for (name, value) in predicate.terms() {
            let column = self.entity_column(name)?;
            if value.is_null() {
                clauses.push(format!("{} IS NULL", quote(name)));
            } else {
                binds.push((value, column.storage_type));
                clauses.push(format!(
                    "{} = ${}::{}",
                    quote(name),
                    first + binds.len() - 1,
                    column.storage_type.sql()
                ));
            }
        }
        if clauses.is_empty() {
            return Ok((String::new(), binds));
        }
        Ok((format!(" WHERE {}", clauses.join(" AND ")), binds))
    }

    fn decode_row(&self, row: &PgRow) -> Result<Record, StoreError> {
        decode_record(&self.schema.entity, row)
    }
}

#[async_trait::async_trait]
impl IdentityStore for PostgresIdentityStore {
    fn schema(&self) -> &StorageSchema {
        &self.schema
    }

    #[instrument(skip(self, catalog), fields(permissions = catalog.len()), err)]
    async fn install(&self, catalog: &PermissionCatalog) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("install", e))?;

        if let Some(schema_name) = &self.schema.entity.schema {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote(schema_name)))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("install", e))?;
        }
        for ddl in self.schema.ddl() {
            sqlx::query(&ddl)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("install", e))?;
        }

        let rights = self.schema.permissions.qualified_name();
        let seed = format!(
            "INSERT INTO {rights} (\"id\", \"name\") OVERRIDING SYSTEM VALUE VALUES ($1, $2) \
             ON CONFLICT DO NOTHING"
        );
        for (id, name) in catalog.iter() {
            sqlx::query(&seed)
                .bind(id.get())
                .bind(name.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("install", e))?;
        }

        let stored = sqlx::query(&format!("SELECT \"id\", \"name\" FROM {rights}"))
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("install", e))?
            .iter()
            .map(|row| -> Result<(i64, String), sqlx::Error> { Ok((row.try_get("id")?, row.try_get("name")?)) })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("install", e))?;
        check_catalog(catalog, &stored)?;

        tx.commit().await.map_err(|e| map_sqlx_error("install", e))?;
        info!(
            relations = self.schema.tables().count(),
            "identity store schema installed"
        );
        Ok(())
    }

    #[instrument(skip(self, row, grants), fields(grants = grants.len()), err)]
    async fn create(&self, row: Record, grants: &[PermissionId]) -> Result<Record, StoreError> {
        let table = &self.schema.entity;
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for column in &table.columns {
            let submitted = row.get(&column.name).filter(|v| !v.is_null());
            match (column.primary_key, submitted) {
                (Some(Generation::AutoIncrement), _) => continue,
                (Some(Generation::RandomUuid), None) => continue,
                (_, None) if column.default.is_some() => continue,
                (_, submitted) => {
                    columns.push(column);
                    values.push(submitted.cloned().unwrap_or(Value::Null));
                }
            }
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table.qualified_name())
        } else {
            let names: Vec<String> = columns.iter().map(|c| quote(&c.name)).collect();
            let params: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(i, c)| format!("${}::{}", i + 1, c.storage_type.sql()))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                table.qualified_name(),
                names.join(", "),
                params.join(", ")
            )
        };

        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("create", e))?;

        let mut query = sqlx::query(&sql);
        for (value, column) in values.iter().zip(&columns) {
            query = bind_value(query, value, column.storage_type);
        }
        let inserted = query
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create", e))?;
        let stored = self.decode_row(&inserted)?;

        if !grants.is_empty() {
            let identity = self.identity_spec()?;
            let owner = stored.get_or_null(&identity.name).clone();
            let grant_sql = format!(
                "INSERT INTO {} ({}, \"right_id\") VALUES ($1::{}, $2)",
                self.schema.grants.qualified_name(),
                quote(self.schema.owner_column()),
                identity.storage_type.sql()
            );
            for id in grants {
                bind_value(sqlx::query(&grant_sql), &owner, identity.storage_type)
                    .bind(id.get())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("create", e))?;
            }
        }

        // Dropping `tx` on any error above rolls the whole insert back.
        tx.commit().await.map_err(|e| map_sqlx_error("create", e))?;
        Ok(stored)
    }

    #[instrument(skip(self, predicate), fields(terms = predicate.len()), err)]
    async fn read_one(&self, predicate: &Predicate) -> Result<Option<Record>, StoreError> {
        let (clause, binds) = self.where_clause(predicate, 1)?;
        let sql = format!(
            "SELECT * FROM {}{} LIMIT 1",
            self.schema.entity.qualified_name(),
            clause
        );
        let mut query = sqlx::query(&sql);
        for (value, storage_type) in binds {
            query = bind_value(query, value, storage_type);
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("read_one", e))?;
        row.as_ref().map(|r| self.decode_row(r)).transpose()
    }

    #[instrument(skip(self, predicate), fields(terms = predicate.len()), err)]
    async fn read_many(&self, predicate: &Predicate) -> Result<Vec<Record>, StoreError> {
        let identity = self.identity_spec()?;
        let (clause, binds) = self.where_clause(predicate, 1)?;
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY {}",
            self.schema.entity.qualified_name(),
            clause,
            quote(&identity.name)
        );
        let mut query = sqlx::query(&sql);
        for (value, storage_type) in binds {
            query = bind_value(query, value, storage_type);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("read_many", e))?;
        rows.iter().map(|r| self.decode_row(r)).collect()
    }

    #[instrument(skip(self, changes), fields(identity = %id), err)]
    async fn update(&self, id: &IdentityId, changes: Record) -> Result<Record, StoreError> {
        let identity = self.identity_spec()?;
        if changes.contains(&identity.name) {
            return Err(StoreError::Conflict("identity column is immutable".to_string()));
        }
        if changes.is_empty() {
            return self
                .read_one(&Predicate::identity(&self.schema, id))
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("identity {id}")));
        }

        let mut sets = Vec::with_capacity(changes.len());
        let mut binds = Vec::with_capacity(changes.len());
        for (name, value) in changes.iter() {
            let column = self.entity_column(name)?;
            binds.push((value, column.storage_type));
            sets.push(format!(
                "{} = ${}::{}",
                quote(name),
                binds.len(),
                column.storage_type.sql()
            ));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ${}::{} RETURNING *",
            self.schema.entity.qualified_name(),
            sets.join(", "),
            quote(&identity.name),
            binds.len() + 1,
            identity.storage_type.sql()
        );

        let mut query = sqlx::query(&sql);
        for (value, storage_type) in binds {
            query = bind_value(query, value, storage_type);
        }
        let key = identity_value(&self.schema, id);
        let row = bind_value(query, &key, identity.storage_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update", e))?
            .ok_or_else(|| StoreError::NotFound(format!("identity {id}")))?;
        self.decode_row(&row)
    }

    #[instrument(skip(self), fields(identity = %id), err)]
    async fn delete(&self, id: &IdentityId) -> Result<(), StoreError> {
        let identity = self.identity_spec()?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1::{}",
            self.schema.entity.qualified_name(),
            quote(&identity.name),
            identity.storage_type.sql()
        );
        let key = identity_value(&self.schema, id);
        let result = bind_value(sqlx::query(&sql), &key, identity.storage_type)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("identity {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(identity = %id), err)]
    async fn granted_permissions(&self, id: &IdentityId) -> Result<Vec<PermissionId>, StoreError> {
        let identity = self.identity_spec()?;
        let sql = format!(
            "SELECT \"right_id\" FROM {} WHERE {} = $1::{} ORDER BY \"right_id\"",
            self.schema.grants.qualified_name(),
            quote(self.schema.owner_column()),
            identity.storage_type.sql()
        );
        let key = identity_value(&self.schema, id);
        let rows = bind_value(sqlx::query(&sql), &key, identity.storage_type)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("granted_permissions", e))?;
        rows.iter()
            .map(|r| {
                r.try_get::<i64, _>("right_id")
                    .map(PermissionId::new)
                    .map_err(|e| map_sqlx_error("granted_permissions", e))
            })
            .collect()
    }

    #[instrument(skip(self), fields(identity = %id, permission = %permission), err)]
    async fn revoke(&self, id: &IdentityId, permission: PermissionId) -> Result<bool, StoreError> {
        let identity = self.identity_spec()?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1::{} AND \"right_id\" = $2",
            self.schema.grants.qualified_name(),
            quote(self.schema.owner_column()),
            identity.storage_type.sql()
        );
        let key = identity_value(&self.schema, id);
        let result = bind_value(sqlx::query(&sql), &key, identity.storage_type)
            .bind(permission.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke", e))?;
        Ok(result.rows_affected() > 0)
    }
}

pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Bind `value`; nulls are bound with the Rust type matching `storage_type`.
pub(crate) fn bind_value<'q>(query: PgQuery<'q>, value: &Value, storage_type: StorageType) -> PgQuery<'q> {
    match value {
        Value::Null => match storage_type {
            StorageType::BigInt => query.bind(None::<i64>),
            StorageType::Boolean => query.bind(None::<bool>),
            StorageType::Uuid => query.bind(None::<uuid::Uuid>),
            StorageType::Double => query.bind(None::<f64>),
            StorageType::Timestamp => query.bind(None::<chrono::DateTime<chrono::Utc>>),
            StorageType::Time => query.bind(None::<chrono::NaiveTime>),
            StorageType::Date => query.bind(None::<chrono::NaiveDate>),
            StorageType::Json => query.bind(None::<serde_json::Value>),
            StorageType::Text => query.bind(None::<String>),
        },
        Value::Int(i) => query.bind(*i),
        Value::Bool(b) => query.bind(*b),
        Value::Text(s) => query.bind(s.clone()),
        Value::Uuid(u) => query.bind(*u),
        Value::Float(f) => query.bind(*f),
        Value::DateTime(dt) => query.bind(*dt),
        Value::Date(d) => query.bind(*d),
        Value::Time(t) => query.bind(*t),
        Value::Json(j) => query.bind(sqlx::types::Json(j.clone())),
    }
}

pub(crate) fn decode_record(table: &TableSpec, row: &PgRow) -> Result<Record, StoreError> {
    let mut record = Record::new();
    for column in &table.columns {
        record.insert(column.name.clone(), decode_value(row, column)?);
    }
    Ok(record)
}

fn decode_value(row: &PgRow, column: &StorageColumnSpec) -> Result<Value, StoreError> {
    let name = column.name.as_str();
    let value = match column.storage_type {
        StorageType::BigInt => row.try_get::<Option<i64>, _>(name).map(|v| v.map(Value::Int)),
        StorageType::Boolean => row.try_get::<Option<bool>, _>(name).map(|v| v.map(Value::Bool)),
        StorageType::Text => row.try_get::<Option<String>, _>(name).map(|v| v.map(Value::Text)),
        StorageType::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)
            .map(|v| v.map(Value::Uuid)),
        StorageType::Double => row.try_get::<Option<f64>, _>(name).map(|v| v.map(Value::Float)),
        StorageType::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
            .map(|v| v.map(Value::DateTime)),
        StorageType::Time => row
            .try_get::<Option<chrono::NaiveTime>, _>(name)
            .map(|v| v.map(Value::Time)),
        StorageType::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)
            .map(|v| v.map(Value::Date)),
        StorageType::Json => row
            .try_get::<Option<serde_json::Value>, _>(name)
            .map(|v| v.map(Value::Json)),
    };
    value
        .map(|v| v.unwrap_or(Value::Null))
        .map_err(|e| StoreError::Backend(format!("failed to decode column '{name}': {e}")))
}

/// Every declared `(id, name)` pair must be stored exactly as declared.
///
/// Seeding never rewrites existing rows, so a declaration that renamed or
/// reordered permissions against an installed catalog is refused here rather
/// than silently re-pointing existing grants.
pub(crate) fn check_catalog(catalog: &PermissionCatalog, stored: &[(i64, String)]) -> Result<(), StoreError> {
    for (id, name) in catalog.iter() {
        let by_id = stored.iter().find(|(stored_id, _)| *stored_id == id.get());
        let by_name = stored.iter().find(|(_, stored_name)| stored_name == name.as_str());
        match (by_id, by_name) {
            (Some((_, stored_name)), _) if stored_name == name.as_str() => {}
            (Some((_, stored_name)), _) => {
                return Err(StoreError::Conflict(format!(
                    "permission catalog mismatch: id {id} is stored as '{stored_name}' but declared as '{name}'"
                )));
            }
            (None, Some((stored_id, _))) => {
                return Err(StoreError::Conflict(format!(
                    "permission catalog mismatch: '{name}' is stored with id {stored_id} but declared with id {id}"
                )));
            }
            (None, None) => {
                return Err(StoreError::Backend(format!("permission '{name}' was not seeded")));
            }
        }
    }
    Ok(())
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23502") | Some("23503") => StoreError::Conflict(msg),
                _ => {
                    warn!(operation, error = %msg, "database error");
                    StoreError::Backend(msg)
                }
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            warn!(operation, error = %err, "storage unavailable");
            StoreError::Unavailable(format!("{operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote("user"), "\"user\"");
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn pool_errors_are_unavailable() {
        assert!(matches!(
            map_sqlx_error("read_one", sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error("read_one", sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }

    fn catalog() -> PermissionCatalog {
        PermissionCatalog::from_names(["read", "write"].map(warden_auth::Permission::new))
    }

    #[test]
    fn matching_catalog_is_accepted() {
        let stored = vec![(1, "read".to_string()), (2, "write".to_string()), (3, "retired".to_string())];
        assert!(check_catalog(&catalog(), &stored).is_ok());
    }

    #[test]
    fn renamed_permission_is_refused() {
        // Installed as [read, write]; redeclared as [write, read].
        let stored = vec![(1, "read".to_string()), (2, "write".to_string())];
        let swapped = PermissionCatalog::from_names(["write", "read"].map(warden_auth::Permission::new));
        let err = check_catalog(&swapped, &stored).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref msg) if msg.contains("id 1")));
    }

    #[test]
    fn permission_under_another_id_is_refused() {
        let stored = vec![(1, "read".to_string()), (7, "write".to_string())];
        let err = check_catalog(&catalog(), &stored).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref msg) if msg.contains("'write'")));
    }

    #[test]
    fn missing_seed_is_a_backend_error() {
        let stored = vec![(1, "read".to_string())];
        assert!(matches!(check_catalog(&catalog(), &stored), Err(StoreError::Backend(_))));
    }
}

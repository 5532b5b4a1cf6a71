use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, instrument};
use uuid::Uuid;

use warden_auth::{PermissionCatalog, PermissionId};
use warden_core::{IdentityId, Record, Value};
use warden_schema::{Generation, StorageSchema, TableSpec};

use super::predicate::{Predicate, identity_value};
use super::r#trait::{IdentityStore, StoreError};

#[derive(Debug, Default)]
struct State {
    /// Keyed by the identity value's index key.
    rows: BTreeMap<String, Record>,
    grants: BTreeMap<String, BTreeSet<PermissionId>>,
    /// Known catalog ids; `None` until installed.
    catalog: Option<BTreeSet<PermissionId>>,
    last_id: i64,
}

/// In-memory identity store driven by a [`StorageSchema`].
///
/// Intended for tests/dev. Enforces the same constraints the relational
/// schema declares (not-null, unique, grant references).
#[derive(Debug)]
pub struct InMemoryIdentityStore {
    schema: Arc<StorageSchema>,
    state: RwLock<State>,
}

impl InMemoryIdentityStore {
    pub fn new(schema: Arc<StorageSchema>) -> Self {
        Self {
            schema,
            state: RwLock::new(State::default()),
        }
    }

    fn key(&self, id: &IdentityId) -> String {
        identity_value(&self.schema, id).index_key()
    }

    fn identity_key(&self, row: &Record) -> String {
        row.get_or_null(self.schema.identity_column()).index_key()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

fn check_not_null(table: &TableSpec, row: &Record) -> Result<(), StoreError> {
    for column in &table.columns {
        if !column.nullable && row.get_or_null(&column.name).is_null() {
            return Err(StoreError::Conflict(format!(
                "column '{}' must not be null",
                column.name
            )));
        }
    }
    Ok(())
}

fn check_unique(
    table: &TableSpec,
    rows: &BTreeMap<String, Record>,
    row: &Record,
    skip: Option<&str>,
) -> Result<(), StoreError> {
    for column in table.unique_columns() {
        let value = row.get_or_null(&column.name);
        if value.is_null() {
            continue;
        }
        let key = value.index_key();
        let taken = rows
            .iter()
            .filter(|(k, _)| Some(k.as_str()) != skip)
            .any(|(_, other)| other.get_or_null(&column.name).index_key() == key);
        if taken {
            return Err(StoreError::Conflict(format!(
                "duplicate value for unique column '{}'",
                column.name
            )));
        }
    }
    Ok(())
}

fn check_grants(catalog: Option<&BTreeSet<PermissionId>>, grants: &[PermissionId]) -> Result<(), StoreError> {
    let Some(catalog) = catalog else {
        return Ok(());
    };
    match grants.iter().find(|id| !catalog.contains(id)) {
        Some(id) => Err(StoreError::Conflict(format!("unknown permission id {id}"))),
        None => Ok(()),
    }
}

#[async_trait::async_trait]
impl IdentityStore for InMemoryIdentityStore {
    fn schema(&self) -> &StorageSchema {
        &self.schema
    }

    async fn install(&self, catalog: &PermissionCatalog) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.catalog = Some(catalog.iter().map(|(id, _)| id).collect());
        debug!(permissions = catalog.len(), "in-memory identity store installed");
        Ok(())
    }

    #[instrument(skip(self, row, grants), fields(grants = grants.len()), err)]
    async fn create(&self, row: Record, grants: &[PermissionId]) -> Result<Record, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let table = &self.schema.entity;
        let next_id = state.last_id + 1;

        let mut stored = Record::new();
        for column in &table.columns {
            let submitted = row.get(&column.name).filter(|v| !v.is_null()).cloned();
            let value = match (column.primary_key, submitted) {
                (Some(Generation::AutoIncrement), _) => Value::Int(next_id),
                (Some(Generation::RandomUuid), None) => Value::Uuid(Uuid::new_v4()),
                (_, Some(v)) => v,
                (_, None) => column.default.clone().unwrap_or(Value::Null),
            };
            stored.insert(column.name.clone(), value);
        }

        check_not_null(table, &stored)?;
        check_unique(table, &state.rows, &stored, None)?;
        check_grants(state.catalog.as_ref(), grants)?;

        if matches!(
            table.primary_key().and_then(|c| c.primary_key),
            Some(Generation::AutoIncrement)
        ) {
            state.last_id = next_id;
        }
        let key = self.identity_key(&stored);
        state.grants.insert(key.clone(), grants.iter().copied().collect());
        state.rows.insert(key, stored.clone());
        Ok(stored)
    }

    async fn read_one(&self, predicate: &Predicate) -> Result<Option<Record>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.rows.values().find(|r| predicate.matches(r)).cloned())
    }

    async fn read_many(&self, predicate: &Predicate) -> Result<Vec<Record>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .rows
            .values()
            .filter(|r| predicate.matches(r))
            .cloned()
            .collect())
    }

    #[instrument(skip(self, changes), fields(identity = %id), err)]
    async fn update(&self, id: &IdentityId, changes: Record) -> Result<Record, StoreError> {
        let key = self.key(id);
        let table = &self.schema.entity;
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let Some(current) = state.rows.get(&key) else {
            return Err(StoreError::NotFound(format!("identity {id}")));
        };

        let mut updated = current.clone();
        for (column, value) in changes {
            if table.column(&column).is_none() {
                return Err(StoreError::Backend(format!("unknown column '{column}'")));
            }
            if column == self.schema.identity_column() {
                return Err(StoreError::Conflict("identity column is immutable".to_string()));
            }
            updated.insert(column, value);
        }

        check_not_null(table, &updated)?;
        check_unique(table, &state.rows, &updated, Some(&key))?;
        state.rows.insert(key, updated.clone());
        Ok(updated)
    }

    #[instrument(skip(self), fields(identity = %id), err)]
    async fn delete(&self, id: &IdentityId) -> Result<(), StoreError> {
        let key = self.key(id);
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.rows.remove(&key).is_none() {
            return Err(StoreError::NotFound(format!("identity {id}")));
        }
        state.grants.remove(&key);
        Ok(())
    }

    async fn granted_permissions(&self, id: &IdentityId) -> Result<Vec<PermissionId>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .grants
            .get(&self.key(id))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn revoke(&self, id: &IdentityId, permission: PermissionId) -> Result<bool, StoreError> {
        let key = self.key(id);
        let mut state = self.state.write().map_err(|_| poisoned())?;
        Ok(state
            .grants
            .get_mut(&key)
            .is_some_and(|set| set.remove(&permission)))
    }
}

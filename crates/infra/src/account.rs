//! Registration, login and principal management on top of an [`IdentityStore`].

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use warden_auth::{PermissionId, TokenClaims, TokenCodec};
use warden_core::{
    ArgumentsError, CoerceError, FieldError, IdentityId, Record, ValidationError, Value,
};

use crate::identity_store::{IdentityStore, Predicate, StoreError};
use crate::model::IdentityModel;

/// Account operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error(transparent)]
    Arguments(#[from] ArgumentsError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Rejected by a storage constraint (e.g. a duplicate unique value).
    #[error("data invalid")]
    DataInvalid,

    #[error("wrong credentials")]
    WrongCredentials,

    #[error("not found")]
    NotFound,

    /// Unexpected storage failure. Details are logged, never surfaced.
    #[error("unexpected error")]
    Unexpected,
}

impl AccountError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AccountError::Arguments(_) => "invalid_arguments",
            AccountError::Validation(e) => e.code(),
            AccountError::DataInvalid => "data_invalid",
            AccountError::WrongCredentials => "wrong_credentials",
            AccountError::NotFound => "not_found",
            AccountError::Unexpected => "unexpected",
        }
    }
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => {
                debug!(reason = %msg, "write rejected by storage constraint");
                AccountError::DataInvalid
            }
            StoreError::NotFound(_) => AccountError::NotFound,
            other => {
                warn!(error = %other, "unexpected storage failure");
                AccountError::Unexpected
            }
        }
    }
}

/// Outcome of a successful token login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub identity_id: IdentityId,
    pub claims: TokenClaims,
    pub token: String,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn IdentityStore>,
    model: Arc<IdentityModel>,
    codec: Arc<dyn TokenCodec>,
    token_ttl: Duration,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        model: Arc<IdentityModel>,
        codec: Arc<dyn TokenCodec>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            model,
            codec,
            token_ttl,
        }
    }

    pub fn model(&self) -> &IdentityModel {
        &self.model
    }

    /// Register a principal with `role`'s grants plus `extra_permissions`.
    ///
    /// Returns the new identity value.
    #[instrument(skip(self, submission), err)]
    pub async fn register(
        &self,
        submission: &JsonValue,
        role: &str,
        extra_permissions: &[&str],
    ) -> Result<IdentityId, AccountError> {
        let roles = &self.model.roles;
        let mut grants: BTreeSet<PermissionId> = roles
            .granted_ids(role)
            .ok_or_else(|| ArgumentsError::new(format!("unknown role '{role}'")))?
            .into_iter()
            .collect();
        for name in extra_permissions {
            let id = roles
                .catalog()
                .id_of(name)
                .ok_or_else(|| ArgumentsError::new(format!("unknown permission '{name}'")))?;
            grants.insert(id);
        }

        let row = self.model.views.register.validate(submission)?;
        let grants: Vec<PermissionId> = grants.into_iter().collect();
        let stored = self.store.create(row, &grants).await?;
        let id = self.identity_of(&stored)?;

        info!(identity = %id, role, grants = grants.len(), "principal registered");
        Ok(id)
    }

    /// Match a login submission against the stored principals.
    pub async fn authenticate(&self, submission: &JsonValue) -> Result<Record, AccountError> {
        let credentials = self.model.views.login.validate(submission)?.without_nulls();
        if credentials.is_empty() {
            return Err(AccountError::WrongCredentials);
        }
        self.store
            .read_one(&Predicate::from(credentials))
            .await?
            .ok_or(AccountError::WrongCredentials)
    }

    /// Sign a token carrying the principal's current grant snapshot.
    pub async fn issue_token(&self, row: &Record, now: DateTime<Utc>) -> Result<LoginGrant, AccountError> {
        let identity_id = self.identity_of(row)?;
        let granted = self.store.granted_permissions(&identity_id).await?;
        let claims = TokenClaims::issue(identity_id.clone(), granted, now, self.token_ttl);
        let token = self.codec.encode(&claims).map_err(|e| {
            warn!(error = %e, "token encoding failed");
            AccountError::Unexpected
        })?;
        Ok(LoginGrant {
            identity_id,
            claims,
            token,
        })
    }

    #[instrument(skip(self, submission), err)]
    pub async fn login(&self, submission: &JsonValue, now: DateTime<Utc>) -> Result<LoginGrant, AccountError> {
        let row = self.authenticate(submission).await?;
        let grant = self.issue_token(&row, now).await?;
        info!(identity = %grant.identity_id, "principal logged in");
        Ok(grant)
    }

    /// Look a principal up by exactly one unique attribute.
    pub async fn find_unique(&self, predicate: &Predicate) -> Result<Option<Record>, AccountError> {
        let mut terms = predicate.terms();
        let (Some((column, _)), None) = (terms.next(), terms.next()) else {
            return Err(ArgumentsError::new("exactly one unique key required").into());
        };
        let unique = self
            .model
            .storage
            .entity
            .column(column)
            .is_some_and(|c| c.unique);
        if !unique {
            return Err(ArgumentsError::new(format!("'{column}' is not a unique attribute")).into());
        }

        let row = self.store.read_one(predicate).await?;
        Ok(row.map(|r| self.model.views.base.materialize(&r)))
    }

    pub async fn find_many(&self, predicate: &Predicate) -> Result<Vec<Record>, AccountError> {
        self.check_columns(predicate.terms().map(|(c, _)| c.as_str()))?;
        let rows = self.store.read_many(predicate).await?;
        Ok(rows
            .iter()
            .map(|r| self.model.views.base.materialize(r))
            .collect())
    }

    /// Apply a partial JSON update. Values are coerced to their declared
    /// types, hash transforms of the Register view are applied, and the merged
    /// row must still satisfy the Register view's xor groups.
    #[instrument(skip(self, changes), fields(identity = %id), err)]
    pub async fn update(&self, id: &IdentityId, changes: &JsonValue) -> Result<Record, AccountError> {
        let Some(object) = changes.as_object() else {
            return Err(ArgumentsError::new("changes must be a JSON object").into());
        };
        let identity = &self.model.descriptor.identity().name;
        let register = &self.model.views.register;

        let mut coerced = Record::new();
        let mut errors = Vec::new();
        for (name, raw) in object {
            if name == identity {
                return Err(ArgumentsError::new("identity attribute cannot be changed").into());
            }
            let Some(attr) = self.model.descriptor.attribute(name) else {
                return Err(ArgumentsError::new(format!("unknown attribute '{name}'")).into());
            };
            if raw.is_null() {
                coerced.insert(name.clone(), Value::Null);
                continue;
            }
            match attr.value_type.coerce(raw) {
                Ok(Value::Text(text)) => {
                    let text = match register.transform(name) {
                        Some(t) => t.apply(&text),
                        None => text,
                    };
                    coerced.insert(name.clone(), text.into());
                }
                Ok(value) => {
                    coerced.insert(name.clone(), value);
                }
                Err(CoerceError::WrongType) => errors.push(FieldError::wrong_type(name, attr.value_type)),
                Err(CoerceError::Format(reason)) => errors.push(FieldError::invalid_format(name, reason)),
            }
        }
        if !errors.is_empty() {
            return Err(ValidationError::Fields(errors).into());
        }

        let current = self
            .store
            .read_one(&Predicate::identity(&self.model.storage, id))
            .await?
            .ok_or(AccountError::NotFound)?;
        let mut merged = current;
        for (name, value) in coerced.iter() {
            merged.insert(name.clone(), value.clone());
        }
        for validator in register.validators() {
            validator.check(&merged)?;
        }

        let updated = self.store.update(id, coerced).await?;
        Ok(self.model.views.base.materialize(&updated))
    }

    #[instrument(skip(self), fields(identity = %id), err)]
    pub async fn delete(&self, id: &IdentityId) -> Result<(), AccountError> {
        self.store.delete(id).await?;
        info!(identity = %id, "principal deleted");
        Ok(())
    }

    /// Remove one grant. Takes effect for tokens issued afterwards.
    #[instrument(skip(self), fields(identity = %id), err)]
    pub async fn revoke(&self, id: &IdentityId, permission: &str) -> Result<bool, AccountError> {
        let permission_id = self
            .model
            .roles
            .catalog()
            .id_of(permission)
            .ok_or_else(|| ArgumentsError::new(format!("unknown permission '{permission}'")))?;
        Ok(self.store.revoke(id, permission_id).await?)
    }

    pub async fn granted_permissions(&self, id: &IdentityId) -> Result<Vec<PermissionId>, AccountError> {
        Ok(self.store.granted_permissions(id).await?)
    }

    /// Identity value of a stored row.
    pub fn identity_of(&self, row: &Record) -> Result<IdentityId, AccountError> {
        IdentityId::from_value(row.get_or_null(self.model.storage.identity_column())).ok_or_else(|| {
            warn!("stored row carries no usable identity value");
            AccountError::Unexpected
        })
    }

    fn check_columns<'a>(&self, columns: impl Iterator<Item = &'a str>) -> Result<(), AccountError> {
        for column in columns {
            if self.model.storage.entity.column(column).is_none() {
                return Err(ArgumentsError::new(format!("unknown attribute '{column}'")).into());
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccountService")
            .field("entity", &self.model.descriptor.name())
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}

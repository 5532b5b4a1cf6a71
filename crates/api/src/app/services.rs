//! Storage and service wiring selected from [`ApiConfig`].

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use warden_auth::{Hs256TokenCodec, IdentityLookup, TokenCodec};
use warden_core::{ArgumentsError, ModelError};
use warden_infra::{
    AccountService, IdentityModel, IdentityStore, InMemoryIdentityStore, InMemorySessionStore,
    ModelDeclaration, PostgresIdentityStore, SessionService, SessionStore, StoreError, StoreLookup,
};
use warden_schema::{AuthMode, PostgresTypes, StorageOptions};

use crate::config::ApiConfig;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Arguments(#[from] ArgumentsError),

    #[error("storage setup failed: {0}")]
    Store(#[from] StoreError),
}

/// Everything the handlers and guard layers need.
#[derive(Clone)]
pub struct AppServices {
    pub model: Arc<IdentityModel>,
    pub accounts: AccountService,
    /// Present in session mode only.
    pub sessions: Option<SessionService>,
    pub lookup: Arc<dyn IdentityLookup>,
    pub codec: Arc<dyn TokenCodec>,
    pub config: ApiConfig,
}

impl AppServices {
    pub fn mode(&self) -> AuthMode {
        self.config.auth_mode
    }
}

pub async fn build_services(
    config: &ApiConfig,
    declaration: ModelDeclaration,
) -> Result<AppServices, StartupError> {
    let options = StorageOptions {
        mode: config.auth_mode,
        schema_name: config.db_schema.clone(),
    };
    let model = Arc::new(IdentityModel::build(declaration, &PostgresTypes, &options)?);

    let identities: Arc<dyn IdentityStore>;
    let sessions: Arc<dyn SessionStore>;
    match &config.database_url {
        Some(url) => {
            let store = Arc::new(PostgresIdentityStore::connect(url, model.storage.clone()).await?);
            info!(schema = ?config.db_schema, "using postgres storage");
            identities = store.clone();
            sessions = store;
        }
        None => {
            info!("using in-memory storage");
            identities = Arc::new(InMemoryIdentityStore::new(model.storage.clone()));
            sessions = Arc::new(InMemorySessionStore::new());
        }
    }
    identities.install(model.roles.catalog()).await?;

    let codec: Arc<dyn TokenCodec> = Arc::new(Hs256TokenCodec::new(config.jwt_secret.as_bytes()));
    let accounts = AccountService::new(identities.clone(), model.clone(), codec.clone(), config.token_ttl);
    let sessions = (config.auth_mode == AuthMode::Session)
        .then(|| SessionService::new(sessions, identities.clone(), config.session_ttl));
    let lookup: Arc<dyn IdentityLookup> = Arc::new(StoreLookup::new(identities, config.lookup_timeout));

    info!(mode = ?config.auth_mode, "services ready");
    Ok(AppServices {
        model,
        accounts,
        sessions,
        lookup,
        codec,
        config: config.clone(),
    })
}

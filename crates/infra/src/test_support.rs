//! Shared fixtures for this crate's tests.

use std::sync::Arc;

use chrono::Duration;
use warden_auth::{Hs256TokenCodec, RoleDescriptor, TokenCodec};
use warden_core::ValueType;
use warden_schema::{
    AttributeDecl, AuthMode, FieldTag, HashTransform, PostgresTypes, StorageDeclaration,
    StorageOptions, StorageSchema,
};

use crate::account::AccountService;
use crate::identity_store::{IdentityStore, InMemoryIdentityStore};
use crate::model::{IdentityModel, ModelDeclaration};

pub const SECRET: &[u8] = b"infra-test-secret";

pub fn declaration() -> ModelDeclaration {
    let sha = HashTransform::sha256;
    let register_xor = |others: [&str; 2]| FieldTag::register().xor(others);
    ModelDeclaration {
        entity: "User".into(),
        attributes: vec![
            AttributeDecl::new("id", ValueType::Int)
                .tag(FieldTag::identity())
                .tag(FieldTag::base()),
            AttributeDecl::new("password", ValueType::Str)
                .tag(FieldTag::register().hash(sha()))
                .tag(FieldTag::login().hash(sha())),
            AttributeDecl::new("username", ValueType::Str)
                .tag(FieldTag::base().optional())
                .tag(FieldTag::login().xor(["email", "phone"]))
                .tag(register_xor(["email", "phone"])),
            AttributeDecl::new("email", ValueType::Email)
                .tag(FieldTag::contact().confirm())
                .tag(FieldTag::base().optional())
                .tag(FieldTag::login().xor(["username", "phone"]))
                .tag(register_xor(["username", "phone"])),
            AttributeDecl::new("phone", ValueType::Phone)
                .tag(FieldTag::contact())
                .tag(FieldTag::login().xor(["username", "email"]))
                .tag(register_xor(["username", "email"])),
            AttributeDecl::new("field", ValueType::Str).default_value("empty"),
        ],
        storage: StorageDeclaration::new()
            .nullable(["username", "email", "phone"])
            .unique(["username", "email", "phone"]),
        roles: vec![
            RoleDescriptor::new("admin").grant("action_1"),
            RoleDescriptor::new("client").deny("action_1").grant("action_2"),
        ],
        default_grants: Some(vec![]),
        ..ModelDeclaration::default()
    }
}

pub fn model(mode: AuthMode) -> Arc<IdentityModel> {
    let options = StorageOptions {
        mode,
        schema_name: None,
    };
    Arc::new(IdentityModel::build(declaration(), &PostgresTypes, &options).unwrap())
}

pub fn schema(mode: AuthMode) -> Arc<StorageSchema> {
    model(mode).storage.clone()
}

pub fn codec() -> Arc<dyn TokenCodec> {
    Arc::new(Hs256TokenCodec::new(SECRET))
}

/// Installed in-memory store plus an account service over it.
pub async fn accounts() -> (Arc<InMemoryIdentityStore>, AccountService) {
    let model = model(AuthMode::Token);
    let store = Arc::new(InMemoryIdentityStore::new(model.storage.clone()));
    store.install(model.roles.catalog()).await.unwrap();
    let service = AccountService::new(store.clone(), model, codec(), Duration::minutes(15));
    (store, service)
}

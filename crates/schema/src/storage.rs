//! Persistence schema derived from an entity descriptor.
//!
//! The output is data, not types: an interpreted list of [`TableSpec`]s that a
//! generic storage adapter consumes (and can render as DDL).
//!
//! Relations produced:
//! - the entity table (`<entity>`), identity column as primary key
//! - the permission catalog (`rights`: numeric id, unique name)
//! - the grant association (`<entity>_rights`: identity value, permission id)
//! - in session mode only, the session table (`sessions`)

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warden_core::{ModelError, Value, ValueType};

use crate::descriptor::EntityDescriptor;

pub const RIGHTS_TABLE: &str = "rights";
pub const SESSIONS_TABLE: &str = "sessions";

/// Which authorization flow the deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Signed, self-contained tokens; no server-side session state.
    #[default]
    Token,
    /// Opaque access/refresh tokens backed by a session relation.
    Session,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" | "jwt" => Ok(AuthMode::Token),
            "session" => Ok(AuthMode::Session),
            other => Err(format!("unknown auth mode '{other}' (expected token or session)")),
        }
    }
}

/// Column type in the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    BigInt,
    Boolean,
    Text,
    Uuid,
    Double,
    Timestamp,
    Time,
    Date,
    Json,
}

impl StorageType {
    pub fn sql(self) -> &'static str {
        match self {
            StorageType::BigInt => "BIGINT",
            StorageType::Boolean => "BOOLEAN",
            StorageType::Text => "TEXT",
            StorageType::Uuid => "UUID",
            StorageType::Double => "DOUBLE PRECISION",
            StorageType::Timestamp => "TIMESTAMPTZ",
            StorageType::Time => "TIME",
            StorageType::Date => "DATE",
            StorageType::Json => "JSONB",
        }
    }
}

/// Value-type → storage-type table, supplied by the storage collaborator.
pub trait TypeMapping: Send + Sync {
    fn storage_type(&self, value_type: ValueType) -> Option<StorageType>;
}

/// Default mapping for Postgres.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTypes;

impl TypeMapping for PostgresTypes {
    fn storage_type(&self, value_type: ValueType) -> Option<StorageType> {
        Some(match value_type {
            ValueType::Int => StorageType::BigInt,
            ValueType::Bool => StorageType::Boolean,
            ValueType::Str | ValueType::Email | ValueType::Phone => StorageType::Text,
            ValueType::Uuid => StorageType::Uuid,
            ValueType::Float => StorageType::Double,
            ValueType::DateTime => StorageType::Timestamp,
            ValueType::Time => StorageType::Time,
            ValueType::Date => StorageType::Date,
            ValueType::Json => StorageType::Json,
        })
    }
}

/// How primary-key values come into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    /// Random opaque value generated on insert.
    RandomUuid,
    /// Store-side auto-increment.
    AutoIncrement,
    /// The caller supplies the value.
    CallerSupplied,
}

impl Generation {
    pub fn for_type(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Uuid => Generation::RandomUuid,
            ValueType::Int => Generation::AutoIncrement,
            _ => Generation::CallerSupplied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageColumnSpec {
    pub name: String,
    pub storage_type: StorageType,
    pub nullable: bool,
    pub unique: bool,
    /// `Some` for the primary-key column.
    pub primary_key: Option<Generation>,
    pub default: Option<Value>,
    pub references: Option<ForeignKey>,
}

impl StorageColumnSpec {
    pub fn new(name: impl Into<String>, storage_type: StorageType) -> Self {
        Self {
            name: name.into(),
            storage_type,
            nullable: true,
            unique: false,
            primary_key: None,
            default: None,
            references: None,
        }
    }

    pub fn primary_key(mut self, generation: Generation) -> Self {
        self.primary_key = Some(generation);
        self.nullable = false;
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key.is_some()
    }

    fn ddl(&self, schema: Option<&str>) -> String {
        let mut out = format!("{} {}", quote(&self.name), self.storage_type.sql());
        match self.primary_key {
            Some(Generation::AutoIncrement) => out.push_str(" GENERATED ALWAYS AS IDENTITY PRIMARY KEY"),
            Some(Generation::RandomUuid) => out.push_str(" PRIMARY KEY DEFAULT gen_random_uuid()"),
            Some(Generation::CallerSupplied) => out.push_str(" PRIMARY KEY"),
            None => {
                if !self.nullable {
                    out.push_str(" NOT NULL");
                }
                if self.unique {
                    out.push_str(" UNIQUE");
                }
                if let Some(literal) = self.default.as_ref().and_then(sql_literal) {
                    out.push_str(" DEFAULT ");
                    out.push_str(&literal);
                }
            }
        }
        if let Some(fk) = &self.references {
            out.push_str(&format!(
                " REFERENCES {} ({}) ON DELETE CASCADE",
                qualified(schema, &fk.table),
                quote(&fk.column)
            ));
        }
        out
    }
}

/// One relation in the persisted schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: String,
    pub schema: Option<String>,
    pub columns: Vec<StorageColumnSpec>,
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&StorageColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&StorageColumnSpec> {
        self.columns.iter().find(|c| c.is_primary_key())
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &StorageColumnSpec> {
        self.columns.iter().filter(|c| c.unique)
    }

    /// Schema-qualified, quoted relation name.
    pub fn qualified_name(&self) -> String {
        qualified(self.schema.as_deref(), &self.name)
    }

    pub fn to_ddl(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.ddl(self.schema.as_deref())))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.qualified_name(),
            columns.join(",\n")
        )
    }
}

/// Per-entity nullability/uniqueness declaration.
#[derive(Debug, Clone, Default)]
pub struct StorageDeclaration {
    /// When set, only the listed attributes are nullable; when unset, all are.
    pub nullable: Option<BTreeSet<String>>,
    pub unique: BTreeSet<String>,
}

impl StorageDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nullable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nullable = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn unique<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique = names.into_iter().map(Into::into).collect();
        self
    }

    fn is_nullable(&self, name: &str) -> bool {
        self.nullable.as_ref().is_none_or(|set| set.contains(name))
    }

    fn names(&self) -> impl Iterator<Item = &String> {
        self.nullable.iter().flatten().chain(self.unique.iter())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    pub mode: AuthMode,
    pub schema_name: Option<String>,
}

/// Every relation the engine persists.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSchema {
    pub entity: TableSpec,
    pub permissions: TableSpec,
    pub grants: TableSpec,
    pub sessions: Option<TableSpec>,
    identity_column: String,
}

impl StorageSchema {
    pub fn build(
        descriptor: &EntityDescriptor,
        declaration: &StorageDeclaration,
        types: &dyn TypeMapping,
        options: &StorageOptions,
    ) -> Result<Self, ModelError> {
        let identity = descriptor.identity();
        if identity.name.is_empty() {
            return Err(ModelError::invalid("identity attribute not resolvable"));
        }
        let map_type = |name: &str, value_type: ValueType| {
            types.storage_type(value_type).ok_or_else(|| {
                ModelError::invalid(format!(
                    "no storage type for attribute '{name}' of type {value_type}"
                ))
            })
        };

        for name in declaration.names() {
            if descriptor.attribute(name).is_none() && name != &identity.name {
                warn!(attribute = %name, "storage declaration names an unknown attribute");
            }
        }

        let entity_table = descriptor.name().to_lowercase();
        let schema = options.schema_name.clone();
        let identity_type = map_type(&identity.name, identity.value_type)?;
        let identity_pk = StorageColumnSpec::new(identity.name.clone(), identity_type)
            .primary_key(Generation::for_type(identity.value_type));

        let mut columns = Vec::with_capacity(descriptor.attributes().len() + 1);
        if !identity.declared {
            columns.push(identity_pk.clone());
        }
        for attr in descriptor.attributes() {
            if attr.name == identity.name {
                columns.push(identity_pk.clone());
                continue;
            }
            let mut column = StorageColumnSpec::new(attr.name.clone(), map_type(&attr.name, attr.value_type)?);
            column.nullable = declaration.is_nullable(&attr.name);
            column.unique = declaration.unique.contains(&attr.name);
            column.default = attr.default.clone();
            columns.push(column);
        }
        for contact in descriptor.contacts().iter().filter(|c| c.confirm_required) {
            columns.push(
                StorageColumnSpec::new(contact.confirmed_column(), StorageType::Boolean)
                    .not_null()
                    .default_value(Value::Bool(false)),
            );
        }

        let entity = TableSpec {
            name: entity_table.clone(),
            schema: schema.clone(),
            columns,
        };

        let permissions = TableSpec {
            name: RIGHTS_TABLE.to_string(),
            schema: schema.clone(),
            columns: vec![
                StorageColumnSpec::new("id", StorageType::BigInt).primary_key(Generation::AutoIncrement),
                StorageColumnSpec::new("name", StorageType::Text).not_null().unique(),
            ],
        };

        let owner_column = format!("{entity_table}_id");
        let grants = TableSpec {
            name: format!("{entity_table}_{RIGHTS_TABLE}"),
            schema: schema.clone(),
            columns: vec![
                StorageColumnSpec::new(owner_column.clone(), identity_type)
                    .not_null()
                    .references(entity_table.clone(), identity.name.clone()),
                StorageColumnSpec::new("right_id", StorageType::BigInt)
                    .not_null()
                    .references(RIGHTS_TABLE, "id"),
            ],
        };

        let sessions = (options.mode == AuthMode::Session).then(|| TableSpec {
            name: SESSIONS_TABLE.to_string(),
            schema: schema.clone(),
            columns: vec![
                StorageColumnSpec::new("id", StorageType::Uuid).primary_key(Generation::RandomUuid),
                StorageColumnSpec::new(owner_column.clone(), identity_type)
                    .not_null()
                    .unique()
                    .references(entity_table.clone(), identity.name.clone()),
                StorageColumnSpec::new("access", StorageType::Uuid).not_null().unique(),
                StorageColumnSpec::new("refresh", StorageType::Uuid).not_null().unique(),
                StorageColumnSpec::new("expires_at", StorageType::Timestamp).not_null(),
            ],
        });

        info!(
            entity = %entity.name,
            columns = entity.columns.len(),
            mode = ?options.mode,
            "storage schema built"
        );

        Ok(Self {
            entity,
            permissions,
            grants,
            sessions,
            identity_column: identity.name.clone(),
        })
    }

    pub fn identity_column(&self) -> &str {
        &self.identity_column
    }

    /// Column of the grant (and session) relation holding the identity value.
    pub fn owner_column(&self) -> &str {
        &self.grants.columns[0].name
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSpec> {
        [&self.entity, &self.permissions, &self.grants]
            .into_iter()
            .chain(self.sessions.as_ref())
    }

    /// `CREATE TABLE` statements in dependency order.
    pub fn ddl(&self) -> Vec<String> {
        self.tables().map(TableSpec::to_ddl).collect()
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn qualified(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(s) => format!("{}.{}", quote(s), quote(table)),
        None => quote(table),
    }
}

fn sql_literal(value: &Value) -> Option<String> {
    match value {
        Value::Bool(true) => Some("TRUE".into()),
        Value::Bool(false) => Some("FALSE".into()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Text(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AttributeDecl, ParseOptions};
    use crate::tag::FieldTag;

    fn descriptor(identity_type: ValueType) -> EntityDescriptor {
        let decls = vec![
            AttributeDecl::new("id", identity_type).tag(FieldTag::identity()),
            AttributeDecl::new("password", ValueType::Str).tag(FieldTag::register()),
            AttributeDecl::new("username", ValueType::Str).tag(FieldTag::register()),
            AttributeDecl::new("email", ValueType::Email).tag(FieldTag::contact().confirm()),
            AttributeDecl::new("discord", ValueType::Str).tag(FieldTag::contact()),
            AttributeDecl::new("field", ValueType::Str).default_value("empty"),
        ];
        EntityDescriptor::parse("User", decls, &ParseOptions::default()).unwrap()
    }

    fn build(identity_type: ValueType, decl: StorageDeclaration, mode: AuthMode) -> StorageSchema {
        StorageSchema::build(
            &descriptor(identity_type),
            &decl,
            &PostgresTypes,
            &StorageOptions {
                mode,
                schema_name: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn identity_generation_follows_type() {
        let pk = |t| build(t, StorageDeclaration::new(), AuthMode::Token).entity.primary_key().cloned().unwrap();

        assert_eq!(pk(ValueType::Int).primary_key, Some(Generation::AutoIncrement));
        assert_eq!(pk(ValueType::Uuid).primary_key, Some(Generation::RandomUuid));
        assert_eq!(pk(ValueType::Str).primary_key, Some(Generation::CallerSupplied));
        assert!(!pk(ValueType::Int).nullable);
    }

    #[test]
    fn declaration_controls_nullability_and_uniqueness() {
        let schema = build(
            ValueType::Int,
            StorageDeclaration::new()
                .nullable(["email", "discord"])
                .unique(["username", "email"]),
            AuthMode::Token,
        );

        let col = |n: &str| schema.entity.column(n).cloned().unwrap();
        assert!(!col("password").nullable);
        assert!(col("email").nullable);
        assert!(col("username").unique);
        assert!(!col("discord").unique);
    }

    #[test]
    fn undeclared_columns_default_to_nullable_non_unique() {
        let schema = build(ValueType::Int, StorageDeclaration::new(), AuthMode::Token);
        let password = schema.entity.column("password").unwrap();
        assert!(password.nullable);
        assert!(!password.unique);
    }

    #[test]
    fn confirmed_contacts_gain_a_flag() {
        let schema = build(ValueType::Int, StorageDeclaration::new(), AuthMode::Token);
        let flag = schema.entity.column("email_confirmed").unwrap();
        assert_eq!(flag.storage_type, StorageType::Boolean);
        assert_eq!(flag.default, Some(Value::Bool(false)));
        assert!(schema.entity.column("discord_confirmed").is_none());
    }

    #[test]
    fn auxiliary_relations() {
        let token = build(ValueType::Uuid, StorageDeclaration::new(), AuthMode::Token);
        assert_eq!(token.permissions.name, "rights");
        assert_eq!(token.grants.name, "user_rights");
        assert_eq!(token.owner_column(), "user_id");
        assert_eq!(token.grants.columns[0].storage_type, StorageType::Uuid);
        assert!(token.sessions.is_none());
        assert_eq!(token.tables().count(), 3);

        let session = build(ValueType::Uuid, StorageDeclaration::new(), AuthMode::Session);
        let sessions = session.sessions.as_ref().unwrap();
        assert!(sessions.column("user_id").unwrap().unique);
        assert!(sessions.column("access").is_some());
        assert!(sessions.column("refresh").is_some());
        assert_eq!(session.tables().count(), 4);
    }

    #[test]
    fn fallback_identity_is_added_as_first_column() {
        let decls = vec![AttributeDecl::new("name", ValueType::Str).tag(FieldTag::base())];
        let d = EntityDescriptor::parse("Account", decls, &ParseOptions::with_default_fallback())
            .unwrap();
        let schema = StorageSchema::build(
            &d,
            &StorageDeclaration::new(),
            &PostgresTypes,
            &StorageOptions::default(),
        )
        .unwrap();

        assert_eq!(schema.entity.name, "account");
        assert_eq!(schema.entity.columns[0].name, "id");
        assert!(schema.entity.columns[0].is_primary_key());
    }

    #[test]
    fn missing_type_mapping_is_invalid_model() {
        struct TextOnly;
        impl TypeMapping for TextOnly {
            fn storage_type(&self, value_type: ValueType) -> Option<StorageType> {
                value_type.is_textual().then_some(StorageType::Text)
            }
        }

        let err = StorageSchema::build(
            &descriptor(ValueType::Int),
            &StorageDeclaration::new(),
            &TextOnly,
            &StorageOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no storage type"));
    }

    #[test]
    fn renders_ddl() {
        let schema = StorageSchema::build(
            &descriptor(ValueType::Int),
            &StorageDeclaration::new().nullable(["email"]).unique(["username"]),
            &PostgresTypes,
            &StorageOptions {
                mode: AuthMode::Token,
                schema_name: Some("auth".into()),
            },
        )
        .unwrap();

        let ddl = schema.ddl();
        assert_eq!(ddl.len(), 3);
        assert!(ddl[0].starts_with("CREATE TABLE IF NOT EXISTS \"auth\".\"user\""));
        assert!(ddl[0].contains("\"id\" BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY"));
        assert!(ddl[0].contains("\"username\" TEXT NOT NULL UNIQUE"));
        assert!(ddl[0].contains("\"email_confirmed\" BOOLEAN NOT NULL DEFAULT FALSE"));
        assert!(ddl[0].contains("\"field\" TEXT NOT NULL DEFAULT 'empty'"));
        assert!(ddl[2].contains("REFERENCES \"auth\".\"rights\" (\"id\")"));
    }

    #[test]
    fn auth_mode_parses() {
        assert_eq!("session".parse::<AuthMode>(), Ok(AuthMode::Session));
        assert_eq!("JWT".parse::<AuthMode>(), Ok(AuthMode::Token));
        assert!("cookie".parse::<AuthMode>().is_err());
    }
}

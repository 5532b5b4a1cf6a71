//! Pluggable hash transforms applied to submitted values before acceptance.

use std::borrow::Cow;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// A named, pure `&str -> String` function.
///
/// The algorithm is the caller's choice; [`HashTransform::sha256`] is provided
/// as a convenience.
#[derive(Clone)]
pub struct HashTransform {
    name: Cow<'static, str>,
    func: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl HashTransform {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Lowercase hex SHA-256 digest.
    pub fn sha256() -> Self {
        Self::new("sha256", sha256_hex)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, raw: &str) -> String {
        (self.func)(raw)
    }
}

impl core::fmt::Debug for HashTransform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("HashTransform").field(&self.name).finish()
    }
}

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

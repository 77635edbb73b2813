use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use radar_models::resource_keys;

use crate::error::GatewayError;

/// A live external source for one family of resource keys.
///
/// Implementations return `GatewayError::Source` or `Timeout` for transient
/// failures (the gateway retries those once) and `DataUnavailable` when the
/// resource definitively does not exist.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, key: &str) -> Result<serde_json::Value, GatewayError>;
}

/// Typed registry mapping a resource-key prefix to the source that serves it.
///
/// Populated at startup. Registration is validated: prefixes must be
/// non-empty, contain no `:`, and be unique.
#[derive(Default)]
pub struct SourceRegistry {
    routes: BTreeMap<String, Arc<dyn ResourceSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        prefix: &str,
        source: Arc<dyn ResourceSource>,
    ) -> Result<(), GatewayError> {
        if prefix.is_empty() || prefix.contains(':') || prefix.trim() != prefix {
            return Err(GatewayError::Registry(format!(
                "invalid resource prefix {prefix:?}"
            )));
        }
        if self.routes.contains_key(prefix) {
            return Err(GatewayError::Registry(format!(
                "prefix {prefix:?} already registered"
            )));
        }
        tracing::debug!(prefix, source = source.name(), "Registered resource source");
        self.routes.insert(prefix.to_string(), source);
        Ok(())
    }

    /// Builder-style registration for startup wiring.
    pub fn with(mut self, prefix: &str, source: Arc<dyn ResourceSource>) -> Result<Self, GatewayError> {
        self.register(prefix, source)?;
        Ok(self)
    }

    pub fn resolve(&self, key: &str) -> Result<Arc<dyn ResourceSource>, GatewayError> {
        resource_keys::prefix(key)
            .and_then(|prefix| self.routes.get(prefix))
            .cloned()
            .ok_or_else(|| GatewayError::UnknownResource(key.to_string()))
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

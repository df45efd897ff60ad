//! Resource namespace
//!
//! `resources/<name>` is routable but ships with no handlers, so every resource call
//! currently resolves as an unknown method. Handlers receive the sub-request's `action`
//! sequence.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ToolError;

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, action: &[Value]) -> Result<Vec<Value>, ToolError>;
}

#[derive(Clone, Default)]
pub struct ResourceRegistry {
    handlers: BTreeMap<String, Arc<dyn ResourceHandler>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn ResourceHandler>,
    ) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

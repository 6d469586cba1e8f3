//! Rule contexts and the context registry.
//!
//! A rule context is a named set of boolean flags that switches
//! jurisdiction-specific overlay rules on or off. The registry holds the
//! known contexts and the id of the active one; callers take a snapshot of
//! the active context at the start of a run and pass it down explicitly.

use crate::error::{EngineError, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Id of the default context.
pub const GLOBAL_CONTEXT_ID: &str = "global";

/// Flag enabling input-tax-credit flow reasoning.
pub const FLAG_GST: &str = "gst_enabled";
/// Flag enabling asymmetric-rate reasoning.
pub const FLAG_VAT: &str = "vat_enabled";

/// A named set of rule flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleContext {
    /// Context identifier.
    #[serde(rename = "context_id", alias = "id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Rule flags.
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl RuleContext {
    /// Create a context with no flags set.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            flags: BTreeMap::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set a flag.
    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>, enabled: bool) -> Self {
        self.flags.insert(flag.into(), enabled);
        self
    }

    /// Whether a flag is enabled. Missing flags are disabled.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    /// Returns true if every flag is disabled.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.flags.values().any(|enabled| *enabled)
    }

    /// Default context with every rule disabled.
    #[must_use]
    pub fn global() -> Self {
        Self::new(GLOBAL_CONTEXT_ID, "Global (Standard)")
            .with_description("No jurisdiction-specific rules")
            .with_flag(FLAG_GST, false)
            .with_flag(FLAG_VAT, false)
    }

    /// India GST context.
    #[must_use]
    pub fn india_gst() -> Self {
        Self::new("india_gst", "India (GST)")
            .with_description("Goods and Services Tax input credit chains")
            .with_flag(FLAG_GST, true)
            .with_flag(FLAG_VAT, false)
    }

    /// EU VAT context.
    #[must_use]
    pub fn eu_vat() -> Self {
        Self::new("eu_vat", "European Union (VAT)")
            .with_description("VAT carousel and rate asymmetry")
            .with_flag(FLAG_GST, false)
            .with_flag(FLAG_VAT, true)
    }

    /// Parse a context from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let ctx: Self = serde_json::from_str(json)?;
        if ctx.id.is_empty() {
            return Err(EngineError::validation("context_id is empty"));
        }
        Ok(ctx)
    }
}

impl Default for RuleContext {
    fn default() -> Self {
        Self::global()
    }
}

/// Registry of rule contexts with a single active selection.
#[derive(Debug)]
pub struct ContextRegistry {
    contexts: RwLock<HashMap<String, RuleContext>>,
    active: RwLock<String>,
}

impl ContextRegistry {
    /// Create a registry holding only the global context, which is active.
    #[must_use]
    pub fn new() -> Self {
        let mut contexts = HashMap::new();
        contexts.insert(GLOBAL_CONTEXT_ID.to_string(), RuleContext::global());
        Self {
            contexts: RwLock::new(contexts),
            active: RwLock::new(GLOBAL_CONTEXT_ID.to_string()),
        }
    }

    /// Create a registry with all built-in contexts. Global is active.
    #[must_use]
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        {
            let mut contexts = registry
                .contexts
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for ctx in [RuleContext::india_gst(), RuleContext::eu_vat()] {
                contexts.insert(ctx.id.clone(), ctx);
            }
        }
        registry
    }

    /// Register a new context.
    pub fn register(&self, context: RuleContext) -> Result<()> {
        let mut contexts = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if contexts.contains_key(&context.id) {
            return Err(EngineError::ContextAlreadyRegistered(context.id));
        }

        debug!(context_id = %context.id, name = %context.name, "Registering rule context");
        contexts.insert(context.id.clone(), context);
        Ok(())
    }

    /// Insert or replace a context. Returns true if one was replaced.
    pub fn upsert(&self, context: RuleContext) -> bool {
        let mut contexts = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        debug!(context_id = %context.id, "Upserting rule context");
        contexts.insert(context.id.clone(), context).is_some()
    }

    /// Load a single JSON context file, replacing any context with the same id.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("Cannot read context file {}: {}", path.display(), e))
        })?;
        let context = RuleContext::from_json(&content).map_err(|e| {
            EngineError::config(format!("Invalid context file {}: {}", path.display(), e))
        })?;
        let id = context.id.clone();
        self.upsert(context);
        Ok(id)
    }

    /// Load every `*.json` file in a directory. Returns the number loaded.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in &paths {
            self.load_file(path)?;
        }

        info!(dir = %dir.display(), count = paths.len(), "Loaded rule contexts");
        Ok(paths.len())
    }

    /// Snapshot of the active context.
    #[must_use]
    pub fn active(&self) -> RuleContext {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        let contexts = self.contexts.read().unwrap_or_else(PoisonError::into_inner);
        contexts
            .get(active.as_str())
            .cloned()
            .unwrap_or_else(RuleContext::global)
    }

    /// Id of the active context.
    #[must_use]
    pub fn active_id(&self) -> String {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Available contexts as id -> display name.
    #[must_use]
    pub fn available(&self) -> BTreeMap<String, String> {
        let contexts = self.contexts.read().unwrap_or_else(PoisonError::into_inner);
        contexts
            .values()
            .map(|ctx| (ctx.id.clone(), ctx.name.clone()))
            .collect()
    }

    /// Get a context by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<RuleContext> {
        let contexts = self.contexts.read().unwrap_or_else(PoisonError::into_inner);
        contexts.get(id).cloned()
    }

    /// Switch the active context. Unknown ids fail without changing the selection.
    pub fn set_active(&self, id: &str) -> Result<()> {
        // Contexts are never removed, so the check can release its lock first.
        let known = self
            .contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id);
        if !known {
            return Err(EngineError::context_not_found(id));
        }

        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        info!(from = %active, to = %id, "Switching rule context");
        *active = id.to_string();
        Ok(())
    }

    /// Number of registered contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no contexts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_global() {
        let registry = ContextRegistry::with_builtin();
        assert_eq!(registry.active_id(), GLOBAL_CONTEXT_ID);
        assert!(registry.active().is_noop());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_set_active_unknown_fails() {
        let registry = ContextRegistry::with_builtin();
        let err = registry.set_active("atlantis").unwrap_err();
        assert!(matches!(err, EngineError::ContextNotFound(ref id) if id == "atlantis"));
        assert_eq!(registry.active_id(), GLOBAL_CONTEXT_ID, "selection must not change");
    }

    #[test]
    fn test_switch_context() {
        let registry = ContextRegistry::with_builtin();
        registry.set_active("india_gst").unwrap();
        let ctx = registry.active();
        assert!(ctx.flag(FLAG_GST));
        assert!(!ctx.flag(FLAG_VAT));
    }

    #[test]
    fn test_available_lists_names() {
        let registry = ContextRegistry::with_builtin();
        let available = registry.available();
        assert_eq!(available.get("eu_vat").map(String::as_str), Some("European Union (VAT)"));
        assert_eq!(
            available.keys().cloned().collect::<Vec<_>>(),
            vec!["eu_vat", "global", "india_gst"]
        );
    }

    #[test]
    fn test_register_duplicate() {
        let registry = ContextRegistry::new();
        let err = registry.register(RuleContext::global()).unwrap_err();
        assert!(matches!(err, EngineError::ContextAlreadyRegistered(_)));
        registry.register(RuleContext::eu_vat()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("uk.json"),
            r#"{"context_id":"uk_vat","name":"United Kingdom (VAT)","flags":{"vat_enabled":true}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = ContextRegistry::new();
        assert_eq!(registry.load_dir(dir.path()).unwrap(), 1);
        registry.set_active("uk_vat").unwrap();
        assert!(registry.active().flag(FLAG_VAT));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();
        let registry = ContextRegistry::new();
        assert!(matches!(
            registry.load_file(&path),
            Err(EngineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_dir_names_offending_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a_context.json"),
            r#"{"context_id":"uk_vat","name":"United Kingdom (VAT)"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("ledger.json"), r#"{"transactions": []}"#).unwrap();

        let registry = ContextRegistry::new();
        let err = registry.load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::ConfigError(_)));
        assert!(err.to_string().contains("ledger.json"));
    }
}

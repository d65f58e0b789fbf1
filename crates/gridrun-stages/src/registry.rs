//! Static stage registry.
//!
//! Maps class names to factories. Resolution happens once per run, before
//! any point executes, and fails closed on unknown class names.

use std::collections::BTreeMap;
use std::sync::Arc;

use gridrun_core::Params;
use serde_json::Value;
use tracing::debug;

use crate::builtin::{
    ArchiveOutput, ArchivePlaceholder, BBoxChecker, CommandStage, Noop, SharedFsInputs,
    SharedFsOutputs,
};
use crate::{RegistryError, Slot, Stage};

/// What a factory receives when building a stage.
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Slot the stage is bound to; its key names the stage's sub-namespace.
    pub slot: Slot,

    /// Shared run parameters.
    pub params: Arc<Params>,
}

impl StageConfig {
    /// Shorthand for an invalid-configuration error on this slot.
    pub fn invalid(&self, reason: impl Into<String>) -> RegistryError {
        RegistryError::InvalidStageConfig {
            slot: self.slot.to_string(),
            reason: reason.into(),
        }
    }
}

/// Builds a stage from its configuration.
pub type StageFactory =
    Arc<dyn Fn(&StageConfig) -> Result<Arc<dyn Stage>, RegistryError> + Send + Sync>;

/// Registry of stage classes.
#[derive(Clone)]
pub struct StageRegistry {
    factories: BTreeMap<String, StageFactory>,
}

impl StageRegistry {
    /// Create a registry holding the built-in classes.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register("noop", |_| Ok(Arc::new(Noop)));
        registry.register("stage_inputs_sharedfs", |cfg| {
            Ok(Arc::new(SharedFsInputs::from_config(cfg)?))
        });
        registry.register("stage_outputs_sharedfs", |cfg| {
            Ok(Arc::new(SharedFsOutputs::from_config(cfg)))
        });
        registry.register("command", |cfg| {
            Ok(Arc::new(CommandStage::from_config(cfg)?))
        });
        registry.register("archive_output", |cfg| {
            Ok(Arc::new(ArchiveOutput::from_config(cfg)?))
        });
        registry.register("archive_placeholder", |cfg| {
            Ok(Arc::new(ArchivePlaceholder::from_config(cfg)?))
        });
        registry.register("bbox_checker", |cfg| {
            Ok(Arc::new(BBoxChecker::from_config(cfg)?))
        });
        registry
    }

    /// Register (or replace) a class.
    pub fn register<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&StageConfig) -> Result<Arc<dyn Stage>, RegistryError> + Send + Sync + 'static,
    {
        self.factories.insert(class.into(), Arc::new(factory));
    }

    /// Registered class names, sorted.
    pub fn classes(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Resolve a slot to a stage instance.
    ///
    /// The slot's class comes from `params[slot.key()]`, either a plain
    /// class name or a mapping with a `class` key. Unconfigured slots get
    /// [`Slot::default_class`].
    pub fn resolve(
        &self,
        params: &Arc<Params>,
        slot: Slot,
    ) -> Result<Arc<dyn Stage>, RegistryError> {
        let config = StageConfig {
            slot,
            params: params.clone(),
        };

        let class = match params.get(slot.key()) {
            None => slot.default_class().to_string(),
            Some(Value::String(class)) => class.clone(),
            Some(Value::Object(ns)) => ns
                .get("class")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| config.invalid("missing 'class' key"))?,
            Some(_) => {
                return Err(config.invalid("expected a class name or a mapping"));
            }
        };

        let factory = self
            .factories
            .get(&class)
            .ok_or_else(|| RegistryError::UnknownClass {
                slot: slot.to_string(),
                class: class.clone(),
                valid: self.classes().join(", "),
            })?;

        debug!(slot = %slot, class = %class, "Resolved stage");
        factory(&config)
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Arc<Params> {
        Arc::new(Params::from_value(value).unwrap())
    }

    #[test]
    fn test_unconfigured_slots() {
        let registry = StageRegistry::new();
        let params = params(json!({}));

        assert_eq!(
            registry.resolve(&params, Slot::Checker).unwrap().class_name(),
            "noop"
        );
        assert_eq!(
            registry.resolve(&params, Slot::Fallback).unwrap().class_name(),
            "noop"
        );
        assert_eq!(
            registry
                .resolve(&params, Slot::StageInputs)
                .unwrap()
                .class_name(),
            "stage_inputs_sharedfs"
        );
        assert_eq!(
            registry
                .resolve(&params, Slot::StageOutputs)
                .unwrap()
                .class_name(),
            "stage_outputs_sharedfs"
        );
    }

    #[test]
    fn test_configured_slots() {
        let registry = StageRegistry::new();
        let params = params(json!({
            "delta": "30",
            "model": {"class": "command", "command": "true"},
            "fallback": "archive_placeholder",
        }));

        assert_eq!(
            registry.resolve(&params, Slot::Model).unwrap().class_name(),
            "command"
        );
        assert_eq!(
            registry.resolve(&params, Slot::Fallback).unwrap().class_name(),
            "archive_placeholder"
        );
    }

    #[test]
    fn test_unknown_class_fails_closed() {
        let registry = StageRegistry::new();
        let params = params(json!({"weather_stage": {"class": "psims2wth"}}));

        let err = match registry.resolve(&params, Slot::Weather) {
            Err(e) => e,
            Ok(_) => panic!("unknown class must not resolve"),
        };
        match &err {
            RegistryError::UnknownClass { slot, class, valid } => {
                assert_eq!(slot, "weather_stage");
                assert_eq!(class, "psims2wth");
                assert!(valid.contains("noop"));
                assert!(valid.contains("command"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("psims2wth"));
    }

    #[test]
    fn test_malformed_slot_config() {
        let registry = StageRegistry::new();
        let params = params(json!({"checker": {"threshold": 0}, "model": 5}));

        assert!(matches!(
            registry.resolve(&params, Slot::Checker),
            Err(RegistryError::InvalidStageConfig { .. })
        ));
        assert!(matches!(
            registry.resolve(&params, Slot::Model),
            Err(RegistryError::InvalidStageConfig { .. })
        ));
    }

    #[test]
    fn test_register_custom_class() {
        let mut registry = StageRegistry::new();
        registry.register("custom", |_| Ok(Arc::new(Noop)));
        let params = params(json!({"pre_stage": "custom"}));

        assert!(registry.classes().contains(&"custom"));
        assert!(registry.resolve(&params, Slot::PreStage).is_ok());
    }
}

//! Pipeline construction.

use std::fmt;
use std::sync::Arc;

use gridrun_core::{GridCoordinate, Params};
use gridrun_stages::{RegistryError, Slot, Stage, StageRegistry};
use tracing::{debug, info, warn};

use crate::EngineError;

/// The ordered per-point stages plus the fallback.
///
/// Built once per run and shared read-only with every worker.
#[derive(Clone)]
pub struct PipelineSpec {
    stages: Vec<(Slot, Arc<dyn Stage>)>,
    fallback: Arc<dyn Stage>,
}

impl PipelineSpec {
    /// Resolve every pipeline slot and the fallback from run parameters.
    pub fn build(registry: &StageRegistry, params: &Arc<Params>) -> Result<Self, RegistryError> {
        let stages = Slot::POINT_PIPELINE
            .iter()
            .map(|slot| Ok((*slot, registry.resolve(params, *slot)?)))
            .collect::<Result<Vec<_>, RegistryError>>()?;
        let fallback = registry.resolve(params, Slot::Fallback)?;

        let pipeline = Self { stages, fallback };
        info!(pipeline = %pipeline, "Built pipeline");
        Ok(pipeline)
    }

    /// Assemble a pipeline from explicit stages.
    pub fn from_stages(stages: Vec<(Slot, Arc<dyn Stage>)>, fallback: Arc<dyn Stage>) -> Self {
        Self { stages, fallback }
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &[(Slot, Arc<dyn Stage>)] {
        &self.stages
    }

    /// Stage run when another stage declines.
    pub fn fallback(&self) -> &Arc<dyn Stage> {
        &self.fallback
    }

    /// Stage bound to a slot, if the pipeline has one.
    pub fn stage(&self, slot: Slot) -> Option<&Arc<dyn Stage>> {
        if slot == Slot::Fallback {
            return Some(&self.fallback);
        }
        self.stages.iter().find(|(s, _)| *s == slot).map(|(_, stage)| stage)
    }

    /// Number of per-point stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no per-point stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage's pre-flight check against one point.
    pub fn verify_all(&self, coordinate: &GridCoordinate) -> Result<(), EngineError> {
        let all = self
            .stages
            .iter()
            .map(|(slot, stage)| (*slot, stage))
            .chain(std::iter::once((Slot::Fallback, &self.fallback)));

        for (slot, stage) in all {
            let (ok, message) = stage.verify(coordinate);
            if !ok {
                warn!(
                    slot = %slot,
                    class = stage.class_name(),
                    message = %message,
                    "Verification failed"
                );
                return Err(EngineError::Verification {
                    slot: slot.to_string(),
                    message,
                });
            }
            debug!(slot = %slot, class = stage.class_name(), message = %message, "Verified");
        }
        Ok(())
    }
}

impl fmt::Display for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (slot, stage) in &self.stages {
            write!(f, "{}={} ", slot, stage.class_name())?;
        }
        write!(f, "{}={}", Slot::Fallback, self.fallback.class_name())
    }
}

impl fmt::Debug for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSpec")
            .field("stages", &self.to_string())
            .finish()
    }
}

//! Named positions of the per-point pipeline.

use std::fmt;

/// A pipeline slot. Each slot is bound to exactly one stage per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Checker,
    StageInputs,
    SoilTile,
    ClimateTile,
    MergeInputs,
    Campaign,
    PreStage,
    Weather,
    InputWriter,
    Model,
    OutputWriter,
    StageOutputs,
    Fallback,
}

impl Slot {
    /// Slots run for every point, in execution order.
    pub const POINT_PIPELINE: [Slot; 12] = [
        Slot::Checker,
        Slot::StageInputs,
        Slot::SoilTile,
        Slot::ClimateTile,
        Slot::MergeInputs,
        Slot::Campaign,
        Slot::PreStage,
        Slot::Weather,
        Slot::InputWriter,
        Slot::Model,
        Slot::OutputWriter,
        Slot::StageOutputs,
    ];

    /// Configuration key of the slot's sub-namespace.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Checker => "checker",
            Self::StageInputs => "stage_inputs",
            Self::SoilTile => "soil_tile",
            Self::ClimateTile => "climate_tile",
            Self::MergeInputs => "merge_inputs",
            Self::Campaign => "campaign_stage",
            Self::PreStage => "pre_stage",
            Self::Weather => "weather_stage",
            Self::InputWriter => "input_writer",
            Self::Model => "model",
            Self::OutputWriter => "output_writer",
            Self::StageOutputs => "stage_outputs",
            Self::Fallback => "fallback",
        }
    }

    /// Class used when the slot is not configured.
    ///
    /// Input and output staging default to the shared-filesystem stages;
    /// every other slot defaults to the no-op stage.
    pub fn default_class(&self) -> &'static str {
        match self {
            Self::StageInputs => "stage_inputs_sharedfs",
            Self::StageOutputs => "stage_outputs_sharedfs",
            _ => "noop",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

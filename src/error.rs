use thiserror::Error;

use crate::{simulator::RunStatus, trace::SiteLabel};

/// A malformed model definition.
///
/// These indicate a bug in how the reaction network, the rate parameters or
/// the initial state were put together. They are never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("rate constant `{name}` must be positive and finite, got {value}")]
    InvalidRate { name: String, value: f64 },
    #[error("no rate constant `{rate}` for reaction `{reaction}`")]
    MissingRate { reaction: String, rate: String },
    #[error("reaction `{reaction}` changes {found} species, but the network has {expected}")]
    DeltaDimension {
        reaction: String,
        expected: usize,
        found: usize,
    },
    #[error("unknown species `{0}`")]
    UnknownSpecies(String),
    #[error("species index {index} out of range for reaction `{reaction}`")]
    ReactantOutOfRange { reaction: String, index: usize },
    #[error("duplicate name `{0}`")]
    DuplicateName(String),
    #[error("initial population of `{species}` is negative ({count})")]
    NegativePopulation { species: String, count: i64 },
    #[error("initial population has {found} species, expected {expected}")]
    PopulationDimension { expected: usize, found: usize },
    #[error("hazard buffer has {found} entries, expected {expected}")]
    HazardDimension { expected: usize, found: usize },
    #[error("hazard of reaction `{reaction}` is invalid: {value}")]
    InvalidHazard { reaction: String, value: f64 },
    #[error("prior weights are invalid: {0}")]
    InvalidPrior(String),
    #[error("the hypothesis set is empty")]
    NoHypotheses,
    #[error("the reaction network has no reactions")]
    NoReactions,
    #[error("a run needs at least one step")]
    ZeroSteps,
}

/// Errors that happen while running a simulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Model(#[from] ModelError),
    /// The total hazard reached zero before the requested number of steps.
    #[error("no reaction can fire at step {step} (t = {time})")]
    DegenerateState { step: u64, time: f64 },
    /// Evidence supplied a value outside the support of a site's distribution.
    #[error("evidence for `{label}` conflicts with its distribution: {reason}")]
    ConditioningConflict { label: SiteLabel, reason: String },
    #[error("unknown hypothesis `{0}`")]
    UnknownHypothesis(String),
    /// The run was collected before it completed.
    #[error("run is not finished at step {step} ({status:?})")]
    Unfinished { step: u64, status: RunStatus },
}

pub type Result<T> = std::result::Result<T, SimulationError>;

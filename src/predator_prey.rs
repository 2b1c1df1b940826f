//! The stochastic Lotka-Volterra system.
//!
//! Two species, prey and predators, and three mass-action reactions:
//!
//! | reaction     | change     | hazard                         |
//! |--------------|------------|--------------------------------|
//! | `spawn_prey` | (+1, 0)    | `spawn_prey * prey`            |
//! | `predation`  | (-1, +1)   | `prey2pred * prey * pred`      |
//! | `pred_dies`  | (0, -1)    | `pred_dies * pred`             |

use crate::{
    error::{ModelError, Result},
    hypothesis::{Hypothesis, HypothesisId, HypothesisPolicy, HypothesisSet},
    network::{RateParameters, Reaction, ReactionNetwork},
    population::Population,
    simulator::{GillespieSimulator, SimulationSettings},
};

pub const PREY: usize = 0;
pub const PRED: usize = 1;

pub const SPECIES: [&str; 2] = ["prey", "pred"];

pub fn network() -> std::result::Result<ReactionNetwork, ModelError> {
    ReactionNetwork::new(
        SPECIES,
        vec![
            Reaction::mass_action("spawn_prey", "spawn_prey", &[1, 0], &[PREY]),
            Reaction::mass_action("predation", "prey2pred", &[-1, 1], &[PREY, PRED]),
            Reaction::mass_action("pred_dies", "pred_dies", &[0, -1], &[PRED]),
        ],
    )
}

/// The candidate rate constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredatorPreyHypothesis {
    H1,
    H2,
    H3,
}

impl PredatorPreyHypothesis {
    pub const ALL: [PredatorPreyHypothesis; 3] = [Self::H1, Self::H2, Self::H3];

    pub fn name(&self) -> &'static str {
        match self {
            Self::H1 => "H1",
            Self::H2 => "H2",
            Self::H3 => "H3",
        }
    }

    /// `(spawn_prey, prey2pred, pred_dies)`
    pub fn constants(&self) -> (f64, f64, f64) {
        match self {
            Self::H1 => (1.0, 0.005, 0.6),
            Self::H2 => (1.0, 0.01, 0.4),
            Self::H3 => (0.8, 0.005, 0.9),
        }
    }

    pub fn params(&self) -> std::result::Result<RateParameters, ModelError> {
        let (spawn_prey, prey2pred, pred_dies) = self.constants();
        RateParameters::new([
            ("spawn_prey", spawn_prey),
            ("prey2pred", prey2pred),
            ("pred_dies", pred_dies),
        ])
    }

    /// Position in [`hypothesis_set`].
    pub fn id(&self) -> HypothesisId {
        HypothesisId(*self as usize)
    }
}

/// H1, H2 and H3 with a uniform prior.
pub fn hypothesis_set() -> std::result::Result<HypothesisSet, ModelError> {
    let hypotheses = PredatorPreyHypothesis::ALL
        .iter()
        .map(|h| Ok(Hypothesis::new(h.name(), h.params()?)))
        .collect::<std::result::Result<Vec<_>, ModelError>>()?;
    HypothesisSet::uniform(hypotheses)
}

pub fn simulator(
    prey: u64,
    pred: u64,
    policy: HypothesisPolicy,
    settings: SimulationSettings,
) -> Result<GillespieSimulator> {
    GillespieSimulator::new(
        network()?,
        Population::from_counts(&[prey, pred]),
        hypothesis_set()?,
        policy,
        settings,
    )
}

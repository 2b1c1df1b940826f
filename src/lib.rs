//! Exact stochastic simulation of reaction networks with replayable random
//! choices, and inference over a discrete set of rate hypotheses.
//!
//! A [`GillespieSimulator`] runs Gillespie's direct method. Every random
//! choice of a run (the hypothesis, each reaction and each waiting time) is
//! drawn through a [`DrawContext`] and recorded in a [`Trace`]. Conditioning a
//! run on [`Evidence`] fixes some of those choices, which is what
//! [`sample_posterior`] builds on.
//!
//! ```no_run
//! use gillespie_rs::{predator_prey, HypothesisPolicy, SimulationSettings};
//! use rand::SeedableRng;
//!
//! let sim = predator_prey::simulator(
//!     50,
//!     100,
//!     HypothesisPolicy::Fixed(predator_prey::PredatorPreyHypothesis::H1.id()),
//!     SimulationSettings::default(),
//! )?;
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//! let run = sim.run(&mut rng)?;
//! println!("{:?}", run.trajectory.final_state());
//! # Ok::<(), gillespie_rs::SimulationError>(())
//! ```

pub(crate) mod context;
pub(crate) mod distribution;
pub(crate) mod error;
pub(crate) mod hypothesis;
pub(crate) mod math;
pub(crate) mod metropolis;
pub(crate) mod network;
pub(crate) mod population;
pub mod predator_prey;
pub(crate) mod simulator;
pub(crate) mod trace;
pub(crate) mod trajectory;

pub use context::DrawContext;
pub use distribution::{ChoiceDistribution, ChoiceValue};
pub use error::{ModelError, Result, SimulationError};
pub use hypothesis::{Hypothesis, HypothesisId, HypothesisPolicy, HypothesisSet};
pub use metropolis::{
    exact_hypothesis_posterior, sample_posterior, ChainOutput, MetropolisSettings, MhChain,
    PosteriorSummary, Progress,
};
pub use network::{CustomHazard, HazardModel, Kinetics, RateParameters, Reaction, ReactionNetwork};
pub use population::Population;
pub use simulator::{
    Cutoff, GillespieSimulator, Run, RunStatus, SimulationRun, SimulationSettings, Termination,
};
pub use trace::{Choice, ChoiceOrigin, Evidence, SiteLabel, Trace};
pub use trajectory::Trajectory;

//! Exact stochastic simulation (Gillespie's direct method).
//!
//! A run moves through three phases:
//!
//! ```text
//!  Initialized ──select hypothesis──▶ Running ──N-1 steps──▶ Completed
//!                                        │
//!                                        ├─ total hazard 0 ─▶ Completed(Degenerate)
//!                                        └─ cutoff ─────────▶ Completed(Truncated)
//! ```
//!
//! Every step evaluates the hazards of the current population, draws the
//! reaction that fires and the waiting time until it fires, and appends the
//! new population to the trajectory. All random choices go through a
//! [`DrawContext`], so a run can be replayed or conditioned on evidence.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    context::DrawContext,
    distribution::{ChoiceDistribution, ChoiceValue},
    error::{ModelError, Result, SimulationError},
    hypothesis::{HypothesisId, HypothesisPolicy, HypothesisSet},
    network::{HazardModel, ReactionNetwork},
    population::Population,
    trace::{Evidence, SiteLabel, Trace},
    trajectory::Trajectory,
};

/// Settings for a simulation run
#[derive(Debug, Clone, Copy)]
pub struct SimulationSettings {
    /// The number of trajectory entries, including the initial state.
    /// A complete run executes `num_steps - 1` reactions.
    pub num_steps: u64,
    /// Stop the run and return the partial trajectory after this much
    /// wall-clock time.
    pub max_wall_time: Option<Duration>,
    /// Stop the run before the first reaction that would fire after this
    /// simulated time.
    pub max_sim_time: Option<f64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            num_steps: 1000,
            max_wall_time: None,
            max_sim_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    WallTime,
    SimTime,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Termination {
    /// All requested steps were executed.
    Completed,
    /// No reaction could fire at `step`.
    Degenerate { step: u64, time: f64 },
    /// A cutoff stopped the run before `step`.
    Truncated { step: u64, time: f64, cutoff: Cutoff },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunStatus {
    Initialized,
    Running,
    Completed(Termination),
}

/// The result of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub hypothesis: HypothesisId,
    pub trajectory: Trajectory,
    pub trace: Trace,
    pub termination: Termination,
}

impl SimulationRun {
    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Completed
    }

    /// Turn an early stop in an absorbing state into an error.
    ///
    /// Truncated runs are passed through, the caller asked for the cutoff.
    pub fn into_complete(self) -> Result<Self> {
        match self.termination {
            Termination::Degenerate { step, time } => {
                Err(SimulationError::DegenerateState { step, time })
            }
            _ => Ok(self),
        }
    }
}

/// Simulates a reaction model from a fixed initial population.
#[derive(Debug, Clone)]
pub struct GillespieSimulator<H: HazardModel = ReactionNetwork> {
    model: H,
    initial: Population,
    hypotheses: HypothesisSet,
    policy: HypothesisPolicy,
    settings: SimulationSettings,
}

impl<H: HazardModel> GillespieSimulator<H> {
    /// Validate the model definition and create a simulator.
    ///
    /// Every hypothesis must provide a rate for every reaction.
    pub fn new(
        model: H,
        initial: Population,
        hypotheses: HypothesisSet,
        policy: HypothesisPolicy,
        settings: SimulationSettings,
    ) -> Result<Self> {
        if initial.len() != model.species().len() {
            return Err(ModelError::PopulationDimension {
                expected: model.species().len(),
                found: initial.len(),
            }
            .into());
        }
        if settings.num_steps == 0 {
            return Err(ModelError::ZeroSteps.into());
        }
        for (_, hypothesis) in hypotheses.iter() {
            model.bind_rates(&hypothesis.rates)?;
        }
        policy.distribution(&hypotheses)?;

        Ok(GillespieSimulator {
            model,
            initial,
            hypotheses,
            policy,
            settings,
        })
    }

    /// The same simulator with a different hypothesis policy.
    pub fn with_policy(mut self, policy: HypothesisPolicy) -> Result<Self> {
        policy.distribution(&self.hypotheses)?;
        self.policy = policy;
        Ok(self)
    }

    pub fn model(&self) -> &H {
        &self.model
    }

    pub fn initial(&self) -> &Population {
        &self.initial
    }

    pub fn hypotheses(&self) -> &HypothesisSet {
        &self.hypotheses
    }

    pub fn policy(&self) -> HypothesisPolicy {
        self.policy
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Forward simulation with fresh random choices.
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SimulationRun> {
        self.run_with(DrawContext::new(rng))
    }

    /// Simulate with the labels in `evidence` fixed to their values.
    pub fn run_conditioned<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        evidence: &Evidence,
    ) -> Result<SimulationRun> {
        self.validate_evidence(evidence)?;
        self.run_with(DrawContext::new(rng).with_evidence(evidence))
    }

    /// Run to completion with an already configured draw context.
    pub fn run_with<R: Rng + ?Sized>(&self, ctx: DrawContext<'_, R>) -> Result<SimulationRun> {
        let mut run = Run::new(self, ctx);
        while !matches!(run.advance()?, RunStatus::Completed(_)) {}
        run.finish()
    }

    /// Check evidence against the support of every site it names.
    pub fn validate_evidence(&self, evidence: &Evidence) -> Result<()> {
        let hypothesis = ChoiceDistribution::categorical(&vec![1.; self.hypotheses.len()]);
        let event = ChoiceDistribution::categorical(&vec![1.; self.model.num_reactions()]);
        let wait = ChoiceDistribution::exponential(1.);
        for (label, value) in evidence.iter() {
            let dist = match label {
                SiteLabel::Hypothesis => &hypothesis,
                SiteLabel::Event(_) => &event,
                SiteLabel::Wait(_) => &wait,
            };
            dist.check_support(value)
                .map_err(|reason| SimulationError::ConditioningConflict {
                    label: *label,
                    reason,
                })?;
        }
        Ok(())
    }

    /// Independent forward simulations on the rayon thread pool.
    ///
    /// Replicate `i` uses stream `i` of a ChaCha generator seeded with `seed`,
    /// so the result does not depend on the number of threads.
    pub fn simulate_replicates(&self, replicates: usize, seed: u64) -> Result<Vec<SimulationRun>> {
        (0..replicates)
            .into_par_iter()
            .map(|replicate| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(replicate as u64);
                self.run(&mut rng)
            })
            .collect()
    }
}

/// A single run, advanced one step at a time.
///
/// Observed labels at or after the step where a run stops early are recorded
/// as unreached, so the trace of such a run has probability zero.
pub struct Run<'a, H: HazardModel, R: Rng + ?Sized> {
    sim: &'a GillespieSimulator<H>,
    ctx: DrawContext<'a, R>,
    rates: Option<H::Rates>,
    hypothesis: Option<HypothesisId>,
    state: Population,
    time: f64,
    step: u64,
    hazards: Box<[f64]>,
    trajectory: Trajectory,
    status: RunStatus,
    started: Instant,
}

impl<'a, H: HazardModel, R: Rng + ?Sized> Run<'a, H, R> {
    pub fn new(sim: &'a GillespieSimulator<H>, ctx: DrawContext<'a, R>) -> Self {
        let capacity = usize::try_from(sim.settings.num_steps).unwrap_or(usize::MAX).min(1 << 16);
        Run {
            sim,
            ctx,
            rates: None,
            hypothesis: None,
            state: sim.initial.clone(),
            time: 0.,
            step: 0,
            hazards: vec![0f64; sim.model.num_reactions()].into(),
            trajectory: Trajectory::with_capacity(sim.model.species(), capacity),
            status: RunStatus::Initialized,
            started: Instant::now(),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn population(&self) -> &Population {
        &self.state
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// The hazards evaluated in the last step.
    pub fn hazards(&self) -> &[f64] {
        &self.hazards
    }

    /// Execute the next transition of the state machine.
    pub fn advance(&mut self) -> Result<RunStatus> {
        self.status = match self.status {
            RunStatus::Initialized => self.select_hypothesis()?,
            RunStatus::Running => self.fire_next()?,
            done @ RunStatus::Completed(_) => done,
        };
        Ok(self.status)
    }

    fn select_hypothesis(&mut self) -> Result<RunStatus> {
        let dist = self.sim.policy.distribution(&self.sim.hypotheses)?;
        let value = self.ctx.draw(SiteLabel::Hypothesis, dist)?;
        let id = HypothesisId(expect_index(SiteLabel::Hypothesis, value)?);
        let hypothesis = self
            .sim
            .hypotheses
            .get(id)
            .ok_or_else(|| SimulationError::UnknownHypothesis(format!("#{}", id.0)))?;
        debug!(hypothesis = %hypothesis.name, steps = self.sim.settings.num_steps, "starting run");

        self.rates = Some(self.sim.model.bind_rates(&hypothesis.rates)?);
        self.hypothesis = Some(id);
        self.trajectory.push(self.time, &self.state);

        if self.sim.settings.num_steps <= 1 {
            Ok(RunStatus::Completed(Termination::Completed))
        } else {
            Ok(RunStatus::Running)
        }
    }

    fn fire_next(&mut self) -> Result<RunStatus> {
        let step = self.step + 1;
        let settings = self.sim.settings;

        if let Some(limit) = settings.max_wall_time {
            if self.started.elapsed() >= limit {
                return Ok(self.truncate(step, Cutoff::WallTime));
            }
        }

        let Some(rates) = self.rates.as_ref() else {
            return Err(SimulationError::UnknownHypothesis("none selected".into()));
        };
        let total = self
            .sim
            .model
            .compute_hazards(self.state.counts(), rates, &mut self.hazards)?;
        if total <= 0. {
            warn!(step, time = self.time, "no reaction can fire, stopping early");
            self.ctx.mark_unreached(step..settings.num_steps);
            return Ok(RunStatus::Completed(Termination::Degenerate {
                step,
                time: self.time,
            }));
        }

        let mark = self.ctx.trace().len();
        let label = SiteLabel::Event(step);
        let value = self
            .ctx
            .draw(label, ChoiceDistribution::categorical(&self.hazards))?;
        let reaction = expect_index(label, value)?;

        let label = SiteLabel::Wait(step);
        let value = self.ctx.draw(label, ChoiceDistribution::exponential(total))?;
        let wait = value
            .as_real()
            .ok_or_else(|| SimulationError::ConditioningConflict {
                label,
                reason: "expected a real number, got an index".into(),
            })?;

        let time = self.time + wait;
        if let Some(limit) = settings.max_sim_time {
            if time > limit {
                self.ctx.rewind(mark);
                return Ok(self.truncate(step, Cutoff::SimTime));
            }
        }

        self.state = self.state.transition(self.sim.model.delta(reaction))?;
        self.time = time;
        self.step = step;
        self.trajectory.push(self.time, &self.state);

        if step + 1 >= settings.num_steps {
            Ok(RunStatus::Completed(Termination::Completed))
        } else {
            Ok(RunStatus::Running)
        }
    }

    fn truncate(&mut self, step: u64, cutoff: Cutoff) -> RunStatus {
        warn!(step, time = self.time, ?cutoff, "run truncated");
        self.ctx.mark_unreached(step..self.sim.settings.num_steps);
        RunStatus::Completed(Termination::Truncated {
            step,
            time: self.time,
            cutoff,
        })
    }

    /// Collect the trajectory and the trace of a completed run.
    pub fn finish(self) -> Result<SimulationRun> {
        let RunStatus::Completed(termination) = self.status else {
            return Err(SimulationError::Unfinished {
                step: self.step,
                status: self.status,
            });
        };
        let hypothesis = self
            .hypothesis
            .ok_or_else(|| SimulationError::UnknownHypothesis("none selected".into()))?;
        debug!(steps = self.trajectory.len(), time = self.time, ?termination, "run finished");
        Ok(SimulationRun {
            hypothesis,
            trajectory: self.trajectory,
            trace: self.ctx.into_trace(),
            termination,
        })
    }
}

fn expect_index(label: SiteLabel, value: ChoiceValue) -> Result<usize> {
    value
        .as_index()
        .ok_or_else(|| SimulationError::ConditioningConflict {
            label,
            reason: "expected an index, got a real number".into(),
        })
}

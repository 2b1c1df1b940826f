//! Single-site Metropolis-Hastings over the latent choices of a run.
//!
//! Each iteration picks one latent site of the current trace, draws it again
//! from its prior, replays every other latent site and re-scores the run
//! against the evidence. Observed sites never change.

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    context::DrawContext,
    distribution::ChoiceValue,
    hypothesis::HypothesisId,
    math::{logsumexp, RunningMean},
    network::HazardModel,
    simulator::{GillespieSimulator, SimulationRun},
    trace::{ChoiceOrigin, Evidence, SiteLabel, Trace},
};

/// Settings for posterior sampling
#[derive(Debug, Clone, Copy)]
pub struct MetropolisSettings {
    /// The number of warm-up iterations that are not stored.
    pub num_tune: u64,
    /// The number of stored draws after warm-up.
    pub num_draws: u64,
    pub num_chains: usize,
    pub seed: u64,
}

impl Default for MetropolisSettings {
    fn default() -> Self {
        Self {
            num_tune: 100,
            num_draws: 1000,
            num_chains: 4,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Progress {
    pub draw: u64,
    pub chain: u64,
    pub tuning: bool,
    pub accepted: bool,
    pub acceptance_rate: f64,
}

/// Log acceptance ratio for replacing `current` by `proposal`.
///
/// Sites of the current trace that were not carried over into the proposal
/// count as reverse proposal density, sites that had to be drawn fresh count
/// as forward density.
fn log_acceptance(current: &Trace, proposal: &Trace) -> f64 {
    let joint = proposal.log_joint();
    if joint == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }

    let forward: f64 = proposal
        .iter()
        .filter(|choice| choice.origin == ChoiceOrigin::Sampled)
        .map(|choice| choice.log_density)
        .sum();
    let reverse: f64 = current
        .iter()
        .filter(|choice| !choice.is_observed())
        .filter(|choice| {
            proposal
                .get(&choice.label)
                .map_or(true, |new| new.origin != ChoiceOrigin::Replayed)
        })
        .map(|choice| choice.log_density)
        .sum();

    let num_current = current.latent_labels().len() as f64;
    let num_proposal = proposal.latent_labels().len() as f64;

    joint - current.log_joint() + num_current.ln() - num_proposal.ln() + reverse - forward
}

/// A Markov chain over runs of a simulator conditioned on evidence.
pub struct MhChain<'a, H: HazardModel, R: Rng> {
    sim: &'a GillespieSimulator<H>,
    evidence: &'a Evidence,
    rng: R,
    current: SimulationRun,
    chain: u64,
    draw_count: u64,
    num_tune: u64,
    acceptance: RunningMean,
}

impl<'a, H: HazardModel, R: Rng> MhChain<'a, H, R> {
    /// Start a chain from a run that is consistent with the evidence.
    ///
    /// Fails if no run with positive probability is found.
    pub fn new(
        sim: &'a GillespieSimulator<H>,
        evidence: &'a Evidence,
        mut rng: R,
        chain: u64,
        num_tune: u64,
    ) -> Result<Self> {
        sim.validate_evidence(evidence)
            .context("Evidence does not match the model")?;

        let mut current = None;
        for _ in 0..500 {
            let run = sim
                .run_conditioned(&mut rng, evidence)
                .context("Failed to generate an initial run")?;
            if run.trace.log_joint() > f64::NEG_INFINITY {
                current = Some(run);
                break;
            }
        }
        let Some(current) = current else {
            bail!("All initial runs have zero probability under the evidence");
        };
        debug!(chain, hypothesis = current.hypothesis.0, "initialized chain");

        Ok(MhChain {
            sim,
            evidence,
            rng,
            current,
            chain,
            draw_count: 0,
            num_tune,
            acceptance: RunningMean::new(),
        })
    }

    pub fn current(&self) -> &SimulationRun {
        &self.current
    }

    /// Perform one Metropolis-Hastings iteration and return the hypothesis
    /// of the resulting state.
    pub fn draw(&mut self) -> Result<(HypothesisId, Progress)> {
        let latent = self.current.trace.latent_labels();
        let accepted = if latent.is_empty() {
            false
        } else {
            let site = latent[self.rng.random_range(0..latent.len())];
            self.step(site)?
        };

        let tuning = self.draw_count < self.num_tune;
        if self.draw_count == self.num_tune {
            self.acceptance.reset();
        }
        self.acceptance.add(if accepted { 1. } else { 0. });

        let progress = Progress {
            draw: self.draw_count,
            chain: self.chain,
            tuning,
            accepted,
            acceptance_rate: self.acceptance.current(),
        };
        self.draw_count += 1;
        Ok((self.current.hypothesis, progress))
    }

    fn step(&mut self, site: SiteLabel) -> Result<bool> {
        let ctx = DrawContext::new(&mut self.rng)
            .with_evidence(self.evidence)
            .with_replay(&self.current.trace, Some(site));
        let proposal = self
            .sim
            .run_with(ctx)
            .with_context(|| format!("Failed to re-run the simulation for site {site}"))?;

        let log_alpha = log_acceptance(&self.current.trace, &proposal.trace);
        let accept = if log_alpha.is_nan() {
            false
        } else {
            log_alpha >= 0. || self.rng.random::<f64>().ln() < log_alpha
        };
        if accept {
            self.current = proposal;
        }
        Ok(accept)
    }
}

pub struct ChainOutput {
    pub chain_id: u64,
    pub draws: Vec<HypothesisId>,
    pub acceptance_rate: f64,
}

/// Posterior draws of the hypothesis site from all chains.
pub struct PosteriorSummary {
    pub hypotheses: Vec<String>,
    pub chains: Vec<ChainOutput>,
}

impl PosteriorSummary {
    /// How often each hypothesis was drawn, summed over chains.
    pub fn counts(&self) -> Vec<usize> {
        let counts = self
            .chains
            .iter()
            .flat_map(|chain| chain.draws.iter())
            .counts_by(|id| id.0);
        (0..self.hypotheses.len())
            .map(|idx| counts.get(&idx).copied().unwrap_or(0))
            .collect()
    }

    pub fn num_draws(&self) -> usize {
        self.chains.iter().map(|chain| chain.draws.len()).sum()
    }

    /// Fraction of draws per hypothesis, all zero without draws.
    pub fn probabilities(&self) -> Vec<f64> {
        let total = self.num_draws().max(1) as f64;
        self.counts()
            .into_iter()
            .map(|count| count as f64 / total)
            .collect()
    }

    pub fn most_probable(&self) -> Option<(HypothesisId, &str)> {
        if self.num_draws() == 0 {
            return None;
        }
        self.counts()
            .into_iter()
            .position_max()
            .map(|idx| (HypothesisId(idx), self.hypotheses[idx].as_str()))
    }
}

fn run_chain<H: HazardModel>(
    sim: &GillespieSimulator<H>,
    evidence: &Evidence,
    settings: &MetropolisSettings,
    chain_id: u64,
) -> Result<ChainOutput> {
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
    rng.set_stream(chain_id);

    let mut chain = MhChain::new(sim, evidence, rng, chain_id, settings.num_tune)
        .with_context(|| format!("Failed to initialize chain {chain_id}"))?;

    let total = settings.num_tune + settings.num_draws;
    let mut draws = Vec::with_capacity(settings.num_draws as usize);
    let mut acceptance_rate = 0.;
    for _ in 0..total {
        let (hypothesis, progress) = chain.draw()?;
        if !progress.tuning {
            draws.push(hypothesis);
            acceptance_rate = progress.acceptance_rate;
        }
    }
    Ok(ChainOutput {
        chain_id,
        draws,
        acceptance_rate,
    })
}

/// Sample the posterior over hypotheses with independent chains in parallel.
///
/// Chain `i` draws from stream `i` of a ChaCha generator seeded with
/// `settings.seed`.
pub fn sample_posterior<H: HazardModel>(
    sim: &GillespieSimulator<H>,
    evidence: &Evidence,
    settings: MetropolisSettings,
) -> Result<PosteriorSummary> {
    let chains = (0..settings.num_chains as u64)
        .into_par_iter()
        .map(|chain_id| run_chain(sim, evidence, &settings, chain_id))
        .collect::<Result<Vec<_>>>()?;

    let summary = PosteriorSummary {
        hypotheses: sim
            .hypotheses()
            .iter()
            .map(|(_, h)| h.name.clone())
            .collect(),
        chains,
    };
    info!(
        chains = summary.chains.len(),
        draws = summary.num_draws(),
        probabilities = ?summary.probabilities(),
        "posterior sampling finished"
    );
    Ok(summary)
}

/// The exact posterior over hypotheses when the evidence fixes every other
/// random choice of the run.
///
/// Each hypothesis is scored by replaying the evidence under it; the hypothesis
/// site is scored with the simulator's hypothesis policy as prior.
pub fn exact_hypothesis_posterior<H: HazardModel>(
    sim: &GillespieSimulator<H>,
    evidence: &Evidence,
) -> Result<Vec<f64>> {
    // Nothing is sampled when every site is observed.
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let log_weights = sim
        .hypotheses()
        .iter()
        .map(|(id, _)| -> Result<f64> {
            let evidence = evidence
                .clone()
                .with(SiteLabel::Hypothesis, ChoiceValue::Index(id.0));
            let run = sim.run_conditioned(&mut rng, &evidence)?;
            if let Some(label) = run.trace.latent_labels().first() {
                bail!("Evidence does not fix the random choice at `{label}`");
            }
            Ok(run.trace.log_joint())
        })
        .collect::<Result<Vec<f64>>>()?;

    let norm = logsumexp(&log_weights);
    if norm == f64::NEG_INFINITY {
        bail!("The evidence has zero probability under every hypothesis");
    }
    Ok(log_weights.iter().map(|w| (w - norm).exp()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hypothesis::{Hypothesis, HypothesisPolicy, HypothesisSet},
        network::{RateParameters, Reaction, ReactionNetwork},
        population::Population,
        simulator::{SimulationSettings, Termination},
    };
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn decay_sim(policy: HypothesisPolicy) -> GillespieSimulator {
        let network =
            ReactionNetwork::new(["x"], vec![Reaction::mass_action("decay", "k", &[-1], &[0])])
                .unwrap();
        let hypotheses = HypothesisSet::uniform(vec![
            Hypothesis::new("slow", RateParameters::new([("k", 0.1)]).unwrap()),
            Hypothesis::new("fast", RateParameters::new([("k", 2.0)]).unwrap()),
        ])
        .unwrap();
        GillespieSimulator::new(
            network,
            Population::from_counts(&[30]),
            hypotheses,
            policy,
            SimulationSettings {
                num_steps: 15,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn observed_fast_run() -> Evidence {
        let forward = decay_sim(HypothesisPolicy::Fixed(HypothesisId(1)));
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let run = forward.run(&mut rng).unwrap();
        run.trace.to_evidence().without(&[SiteLabel::Hypothesis])
    }

    #[test]
    fn exact_posterior_prefers_true_rate() {
        let sim = decay_sim(HypothesisPolicy::Prior);
        let posterior = exact_hypothesis_posterior(&sim, &observed_fast_run()).unwrap();
        assert_eq!(posterior.len(), 2);
        assert_relative_eq!(posterior.iter().sum::<f64>(), 1., epsilon = 1e-12);
        assert!(posterior[1] > 0.99);
    }

    #[test]
    fn exact_posterior_needs_full_evidence() {
        let sim = decay_sim(HypothesisPolicy::Prior);
        let evidence = observed_fast_run().without(&[SiteLabel::Wait(3)]);
        assert!(exact_hypothesis_posterior(&sim, &evidence).is_err());
    }

    #[test]
    fn chain_matches_exact_posterior() {
        let sim = decay_sim(HypothesisPolicy::Prior);
        let evidence = observed_fast_run();
        let exact = exact_hypothesis_posterior(&sim, &evidence).unwrap();
        let summary = sample_posterior(
            &sim,
            &evidence,
            MetropolisSettings {
                num_tune: 20,
                num_draws: 200,
                num_chains: 2,
                seed: 3,
            },
        )
        .unwrap();
        assert_eq!(summary.num_draws(), 400);
        assert_eq!(summary.chains.len(), 2);
        let probs = summary.probabilities();
        assert_relative_eq!(probs[1], exact[1], epsilon = 0.05);
        assert_eq!(summary.most_probable().unwrap().1, "fast");
    }

    #[test]
    fn chains_are_reproducible() {
        let sim = decay_sim(HypothesisPolicy::Prior);
        let evidence = observed_fast_run();
        let settings = MetropolisSettings {
            num_tune: 5,
            num_draws: 30,
            num_chains: 3,
            seed: 9,
        };
        let a = sample_posterior(&sim, &evidence, settings).unwrap();
        let b = sample_posterior(&sim, &evidence, settings).unwrap();
        for (a, b) in a.chains.iter().zip(b.chains.iter()) {
            assert_eq!(a.chain_id, b.chain_id);
            assert_eq!(a.draws, b.draws);
        }
    }

    #[test]
    fn forcing_the_hypothesis_keeps_the_joint() {
        let sim = decay_sim(HypothesisPolicy::Prior);
        let evidence = observed_fast_run();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let run = sim.run_conditioned(&mut rng, &evidence).unwrap();
        let hypothesis = run.trace.value(&SiteLabel::Hypothesis).unwrap();
        let same = sim
            .run_conditioned(&mut rng, &evidence.clone().with(SiteLabel::Hypothesis, hypothesis))
            .unwrap();
        assert_relative_eq!(same.trace.log_joint(), run.trace.log_joint());
    }

    #[test]
    fn latent_event_sites_are_resampled() {
        let sim = decay_sim(HypothesisPolicy::Prior);
        // only the waits are observed, the event sites stay latent
        let evidence: Evidence = observed_fast_run()
            .iter()
            .filter(|(label, _)| matches!(label, SiteLabel::Wait(_)))
            .map(|(label, value)| (*label, *value))
            .collect();
        let rng = ChaCha8Rng::seed_from_u64(4);
        let mut chain = MhChain::new(&sim, &evidence, rng, 0, 0).unwrap();
        assert_eq!(chain.current().trace.latent_labels().len(), 15);
        for _ in 0..50 {
            let (_, progress) = chain.draw().unwrap();
            assert!(!progress.tuning);
        }
    }

    #[test]
    fn chain_avoids_runs_that_miss_observations() {
        let network = ReactionNetwork::new(
            ["x"],
            vec![
                Reaction::mass_action("die", "k_die", &[-1], &[0]),
                Reaction::mass_action("wipe", "k_wipe", &[-10], &[0]),
            ],
        )
        .unwrap();
        let rates = RateParameters::new([("k_die", 1.0), ("k_wipe", 0.5)]).unwrap();
        let sim = GillespieSimulator::new(
            network,
            Population::from_counts(&[10]),
            HypothesisSet::uniform(vec![Hypothesis::new("h", rates)]).unwrap(),
            HypothesisPolicy::Prior,
            SimulationSettings {
                num_steps: 6,
                ..Default::default()
            },
        )
        .unwrap();
        let evidence: Evidence = (1..6)
            .map(|step| (SiteLabel::Wait(step), ChoiceValue::Real(0.05)))
            .collect();

        let rng = ChaCha8Rng::seed_from_u64(11);
        let mut chain = MhChain::new(&sim, &evidence, rng, 0, 0).unwrap();
        let mut accepted = 0;
        for _ in 0..2000 {
            let (_, progress) = chain.draw().unwrap();
            accepted += progress.accepted as usize;
            let run = chain.current();
            assert_eq!(run.termination, Termination::Completed);
            assert!(run.trace.unreached().is_empty());
            assert!(run.trace.log_joint().is_finite());
        }
        assert!(accepted > 0);
    }

    #[test]
    fn empty_summary() {
        let summary = PosteriorSummary {
            hypotheses: vec!["a".into(), "b".into()],
            chains: vec![ChainOutput {
                chain_id: 0,
                draws: vec![],
                acceptance_rate: 0.,
            }],
        };
        assert_eq!(summary.num_draws(), 0);
        assert_eq!(summary.probabilities(), vec![0., 0.]);
        assert!(summary.most_probable().is_none());
    }
}

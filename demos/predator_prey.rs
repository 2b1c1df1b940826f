use std::time::Duration;

use anyhow::{Context, Result};
use gillespie_rs::{
    exact_hypothesis_posterior,
    predator_prey::{self, PredatorPreyHypothesis},
    sample_posterior, Evidence, HypothesisPolicy, MetropolisSettings, SimulationSettings,
    SiteLabel,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn main() -> Result<()> {
    let settings = SimulationSettings {
        num_steps: 300,
        max_wall_time: Some(Duration::from_secs(10)),
        ..Default::default()
    };

    // Simulate data from a known hypothesis
    let truth = PredatorPreyHypothesis::H1;
    let forward = predator_prey::simulator(50, 100, HypothesisPolicy::Fixed(truth.id()), settings)?;
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let observed = forward.run(&mut rng)?.into_complete()?;

    let (time, last) = observed
        .trajectory
        .final_state()
        .context("Empty trajectory")?;
    println!(
        "simulated {} steps under {} up to t = {time:.3}, final counts {:?}",
        observed.trajectory.len(),
        truth.name(),
        last.counts()
    );

    let model = predator_prey::simulator(50, 100, HypothesisPolicy::Prior, settings)?;

    // With every reaction and waiting time observed the posterior is exact
    let evidence = observed.trace.to_evidence().without(&[SiteLabel::Hypothesis]);
    let exact = exact_hypothesis_posterior(&model, &evidence)?;
    let sampled = sample_posterior(&model, &evidence, MetropolisSettings::default())?;
    println!("fully observed:");
    for ((name, exact), sampled) in sampled
        .hypotheses
        .iter()
        .zip(exact.iter())
        .zip(sampled.probabilities())
    {
        println!("  {name}: exact {exact:.4}, sampled {sampled:.4}");
    }

    // Only waiting times observed, the reactions are latent
    let waits: Evidence = observed
        .trace
        .iter()
        .filter(|choice| matches!(choice.label, SiteLabel::Wait(_)))
        .map(|choice| (choice.label, choice.value))
        .collect();
    let summary = sample_posterior(&model, &waits, MetropolisSettings::default())?;
    println!("waiting times only:");
    for (name, prob) in summary.hypotheses.iter().zip(summary.probabilities()) {
        println!("  {name}: {prob:.4}");
    }
    for chain in summary.chains.iter() {
        println!(
            "  chain {} acceptance rate {:.3}",
            chain.chain_id, chain.acceptance_rate
        );
    }
    if let Some((_, name)) = summary.most_probable() {
        println!("most probable: {name}");
    }
    Ok(())
}

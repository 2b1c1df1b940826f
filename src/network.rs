//! Reaction networks and their hazard functions.
//!
//! A network is a fixed list of species and a fixed list of reactions. Each
//! reaction carries an integer change vector (one entry per species), the
//! name of the rate constant it uses, and a kinetic law that turns the current
//! counts and that rate constant into a hazard.

use std::{collections::HashSet, fmt::Debug, sync::Arc};

use crate::{error::ModelError, population::Population};

/// A user supplied hazard function of the species counts and the rate constant.
pub type CustomHazard = Arc<dyn Fn(&[u64], f64) -> f64 + Send + Sync>;

/// The kinetic law of a reaction.
#[derive(Clone)]
pub enum Kinetics {
    /// `rate * prod(counts[r] for r in reactants)`.
    ///
    /// A species listed twice contributes its count twice. A reaction
    /// without reactants fires at the constant `rate`.
    MassAction { reactants: Box<[usize]> },
    Custom(CustomHazard),
}

impl Debug for Kinetics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kinetics::MassAction { reactants } => f
                .debug_struct("MassAction")
                .field("reactants", reactants)
                .finish(),
            Kinetics::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Reaction {
    name: String,
    rate: String,
    delta: Box<[i64]>,
    kinetics: Kinetics,
}

impl Reaction {
    pub fn mass_action(
        name: impl Into<String>,
        rate: impl Into<String>,
        delta: &[i64],
        reactants: &[usize],
    ) -> Self {
        Reaction {
            name: name.into(),
            rate: rate.into(),
            delta: delta.into(),
            kinetics: Kinetics::MassAction {
                reactants: reactants.into(),
            },
        }
    }

    pub fn custom<F>(
        name: impl Into<String>,
        rate: impl Into<String>,
        delta: &[i64],
        hazard: F,
    ) -> Self
    where
        F: Fn(&[u64], f64) -> f64 + Send + Sync + 'static,
    {
        Reaction {
            name: name.into(),
            rate: rate.into(),
            delta: delta.into(),
            kinetics: Kinetics::Custom(Arc::new(hazard)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the rate constant this reaction reads from the parameters.
    pub fn rate_name(&self) -> &str {
        &self.rate
    }

    pub fn delta(&self) -> &[i64] {
        &self.delta
    }

    pub fn kinetics(&self) -> &Kinetics {
        &self.kinetics
    }

    /// Evaluate the kinetic law. Validation happens in [`HazardModel::compute_hazards`].
    #[inline]
    pub fn hazard(&self, counts: &[u64], rate: f64) -> f64 {
        match &self.kinetics {
            Kinetics::MassAction { reactants } => reactants
                .iter()
                .fold(rate, |acc, &species| acc * counts[species] as f64),
            Kinetics::Custom(func) => func(counts, rate),
        }
    }
}

/// Named positive rate constants. One set describes one hypothesis.
#[derive(Clone, Debug, PartialEq)]
pub struct RateParameters {
    values: Vec<(String, f64)>,
}

impl RateParameters {
    pub fn new<I, S>(values: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let values = values
            .into_iter()
            .map(|(name, value)| {
                let name = name.into();
                if !(value.is_finite() && value > 0.) {
                    return Err(ModelError::InvalidRate { name, value });
                }
                if !seen.insert(name.clone()) {
                    return Err(ModelError::DuplicateName(name));
                }
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RateParameters { values })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|&(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// Computes the instantaneous rate of every reaction of a model.
///
/// The simulator only talks to the model through this trait, so any finite
/// set of reactions with arbitrary hazard functions can be simulated.
/// Implementations must be pure: the same counts and rates always give the
/// same hazards.
pub trait HazardModel: Send + Sync {
    /// Rate constants resolved for fast repeated hazard evaluation.
    type Rates: Send + Sync;

    fn species(&self) -> &[String];

    fn num_reactions(&self) -> usize;

    fn reaction_name(&self, reaction: usize) -> &str;

    /// The change applied to the population when `reaction` fires.
    fn delta(&self, reaction: usize) -> &[i64];

    /// Resolve a parameter set once per run.
    fn bind_rates(&self, theta: &RateParameters) -> Result<Self::Rates, ModelError>;

    /// Write the raw hazard of every reaction into `out`.
    fn hazards(&self, counts: &[u64], rates: &Self::Rates, out: &mut [f64]);

    /// Evaluate and validate all hazards and return their sum.
    ///
    /// Fails if `counts` or `out` have the wrong length, or if any hazard is
    /// negative or not finite.
    fn compute_hazards(
        &self,
        counts: &[u64],
        rates: &Self::Rates,
        out: &mut [f64],
    ) -> Result<f64, ModelError> {
        if counts.len() != self.species().len() {
            return Err(ModelError::PopulationDimension {
                expected: self.species().len(),
                found: counts.len(),
            });
        }
        if out.len() != self.num_reactions() {
            return Err(ModelError::HazardDimension {
                expected: self.num_reactions(),
                found: out.len(),
            });
        }
        self.hazards(counts, rates, out);
        let mut total = 0f64;
        for (reaction, &value) in out.iter().enumerate() {
            if !(value.is_finite() && value >= 0.) {
                return Err(ModelError::InvalidHazard {
                    reaction: self.reaction_name(reaction).to_string(),
                    value,
                });
            }
            total += value;
        }
        Ok(total)
    }

    /// Hazards of a population under `theta`, keyed by reaction name.
    fn hazard_table(
        &self,
        population: &Population,
        theta: &RateParameters,
    ) -> Result<Vec<(String, f64)>, ModelError> {
        if population.len() != self.species().len() {
            return Err(ModelError::PopulationDimension {
                expected: self.species().len(),
                found: population.len(),
            });
        }
        let rates = self.bind_rates(theta)?;
        let mut out = vec![0f64; self.num_reactions()];
        self.compute_hazards(population.counts(), &rates, &mut out)?;
        Ok(out
            .into_iter()
            .enumerate()
            .map(|(reaction, value)| (self.reaction_name(reaction).to_string(), value))
            .collect())
    }
}

/// A list of species together with the reactions between them.
#[derive(Clone, Debug)]
pub struct ReactionNetwork {
    species: Box<[String]>,
    reactions: Vec<Reaction>,
}

impl ReactionNetwork {
    pub fn new<S: Into<String>>(
        species: impl IntoIterator<Item = S>,
        reactions: Vec<Reaction>,
    ) -> Result<Self, ModelError> {
        let species: Box<[String]> = species.into_iter().map(Into::into).collect();

        let mut seen = HashSet::new();
        for name in species.iter() {
            if !seen.insert(name.as_str()) {
                return Err(ModelError::DuplicateName(name.clone()));
            }
        }

        if reactions.is_empty() {
            return Err(ModelError::NoReactions);
        }

        let mut seen = HashSet::new();
        for reaction in reactions.iter() {
            if !seen.insert(reaction.name()) {
                return Err(ModelError::DuplicateName(reaction.name.clone()));
            }
            if reaction.delta.len() != species.len() {
                return Err(ModelError::DeltaDimension {
                    reaction: reaction.name.clone(),
                    expected: species.len(),
                    found: reaction.delta.len(),
                });
            }
            if let Kinetics::MassAction { reactants } = &reaction.kinetics {
                if let Some(&index) = reactants.iter().find(|&&idx| idx >= species.len()) {
                    return Err(ModelError::ReactantOutOfRange {
                        reaction: reaction.name.clone(),
                        index,
                    });
                }
            }
        }

        Ok(ReactionNetwork { species, reactions })
    }

    pub fn species_index(&self, name: &str) -> Result<usize, ModelError> {
        self.species
            .iter()
            .position(|species| species == name)
            .ok_or_else(|| ModelError::UnknownSpecies(name.to_string()))
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }
}

impl HazardModel for ReactionNetwork {
    type Rates = Box<[f64]>;

    fn species(&self) -> &[String] {
        &self.species
    }

    fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    fn reaction_name(&self, reaction: usize) -> &str {
        self.reactions[reaction].name()
    }

    fn delta(&self, reaction: usize) -> &[i64] {
        self.reactions[reaction].delta()
    }

    fn bind_rates(&self, theta: &RateParameters) -> Result<Box<[f64]>, ModelError> {
        self.reactions
            .iter()
            .map(|reaction| {
                theta
                    .get(reaction.rate_name())
                    .ok_or_else(|| ModelError::MissingRate {
                        reaction: reaction.name.clone(),
                        rate: reaction.rate.clone(),
                    })
            })
            .collect()
    }

    fn hazards(&self, counts: &[u64], rates: &Box<[f64]>, out: &mut [f64]) {
        assert!(out.len() == self.reactions.len());
        self.reactions
            .iter()
            .zip(rates.iter())
            .zip(out.iter_mut())
            .for_each(|((reaction, &rate), out)| *out = reaction.hazard(counts, rate));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn birth_death() -> ReactionNetwork {
        ReactionNetwork::new(
            ["x"],
            vec![
                Reaction::mass_action("birth", "k_birth", &[1], &[]),
                Reaction::mass_action("death", "k_death", &[-1], &[0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_bad_rates() {
        let err = RateParameters::new([("a", -1.0)]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidRate { .. }));
        let err = RateParameters::new([("a", f64::NAN)]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidRate { .. }));
        let err = RateParameters::new([("a", 1.0), ("a", 2.0)]).unwrap_err();
        assert_eq!(err, ModelError::DuplicateName("a".into()));
    }

    #[test]
    fn rejects_malformed_networks() {
        let err = ReactionNetwork::new(
            ["x", "y"],
            vec![Reaction::mass_action("r", "k", &[1], &[0])],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::DeltaDimension {
                reaction: "r".into(),
                expected: 2,
                found: 1
            }
        );

        let err = ReactionNetwork::new(
            ["x"],
            vec![Reaction::mass_action("r", "k", &[1], &[3])],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::ReactantOutOfRange { index: 3, .. }));

        let err = ReactionNetwork::new(Vec::<String>::new(), vec![]).unwrap_err();
        assert_eq!(err, ModelError::NoReactions);
    }

    #[test]
    fn missing_rate() {
        let network = birth_death();
        let theta = RateParameters::new([("k_birth", 1.0)]).unwrap();
        let err = network.bind_rates(&theta).unwrap_err();
        assert_eq!(
            err,
            ModelError::MissingRate {
                reaction: "death".into(),
                rate: "k_death".into()
            }
        );
    }

    #[test]
    fn mass_action_and_zero_order() {
        let network = birth_death();
        let theta = RateParameters::new([("k_birth", 2.0), ("k_death", 0.5)]).unwrap();
        let rates = network.bind_rates(&theta).unwrap();
        let mut out = [0f64; 2];
        let total = network.compute_hazards(&[10], &rates, &mut out).unwrap();
        assert_eq!(out, [2.0, 5.0]);
        assert_eq!(total, 7.0);
    }

    #[test]
    fn invalid_custom_hazard() {
        let network = ReactionNetwork::new(
            ["x"],
            vec![Reaction::custom("weird", "k", &[1], |_, _| -1.0)],
        )
        .unwrap();
        let theta = RateParameters::new([("k", 1.0)]).unwrap();
        let rates = network.bind_rates(&theta).unwrap();
        let mut out = [0f64; 1];
        let err = network.compute_hazards(&[1], &rates, &mut out).unwrap_err();
        assert!(matches!(err, ModelError::InvalidHazard { .. }));

        let network = ReactionNetwork::new(
            ["x"],
            vec![Reaction::custom("nan", "k", &[1], |_, _| f64::NAN)],
        )
        .unwrap();
        let err = network.compute_hazards(&[1], &rates, &mut out).unwrap_err();
        assert!(matches!(err, ModelError::InvalidHazard { .. }));
    }

    #[test]
    fn hazard_table_is_keyed_by_name() {
        let network = birth_death();
        let theta = RateParameters::new([("k_birth", 1.0), ("k_death", 0.1)]).unwrap();
        let population = Population::from_counts(&[20]);
        let table = network.hazard_table(&population, &theta).unwrap();
        assert_eq!(table[0], ("birth".to_string(), 1.0));
        assert_eq!(table[1].0, "death");
        approx::assert_relative_eq!(table[1].1, 2.0);
    }

    #[test]
    fn wrong_population_size() {
        let network = ReactionNetwork::new(
            ["x", "y"],
            vec![Reaction::mass_action("bind", "k", &[-1, -1], &[0, 1])],
        )
        .unwrap();
        let theta = RateParameters::new([("k", 1.0)]).unwrap();
        let err = network
            .hazard_table(&Population::from_counts(&[5]), &theta)
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::PopulationDimension {
                expected: 2,
                found: 1
            }
        );

        let rates = network.bind_rates(&theta).unwrap();
        let mut out = [0f64; 1];
        let err = network
            .compute_hazards(&[1, 2, 3], &rates, &mut out)
            .unwrap_err();
        assert!(matches!(err, ModelError::PopulationDimension { found: 3, .. }));
        let mut out = [0f64; 2];
        let err = network.compute_hazards(&[1, 2], &rates, &mut out).unwrap_err();
        assert!(matches!(err, ModelError::HazardDimension { found: 2, .. }));
    }
}

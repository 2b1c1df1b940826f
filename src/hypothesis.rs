use crate::{
    distribution::ChoiceDistribution,
    error::{ModelError, SimulationError},
    network::RateParameters,
};

/// Index of a hypothesis within its [`HypothesisSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HypothesisId(pub usize);

/// One candidate set of rate constants.
#[derive(Clone, Debug, PartialEq)]
pub struct Hypothesis {
    pub name: String,
    pub rates: RateParameters,
}

impl Hypothesis {
    pub fn new(name: impl Into<String>, rates: RateParameters) -> Self {
        Hypothesis {
            name: name.into(),
            rates,
        }
    }
}

/// A small enumerated collection of hypotheses with prior weights.
#[derive(Clone, Debug)]
pub struct HypothesisSet {
    hypotheses: Vec<Hypothesis>,
    prior: Box<[f64]>,
}

impl HypothesisSet {
    pub fn uniform(hypotheses: Vec<Hypothesis>) -> Result<Self, ModelError> {
        let n = hypotheses.len();
        Self::with_prior(hypotheses, vec![1. / n as f64; n])
    }

    /// Weights must be non-negative, finite and sum to one.
    pub fn with_prior(hypotheses: Vec<Hypothesis>, prior: Vec<f64>) -> Result<Self, ModelError> {
        if hypotheses.is_empty() {
            return Err(ModelError::NoHypotheses);
        }
        if prior.len() != hypotheses.len() {
            return Err(ModelError::InvalidPrior(format!(
                "{} weights for {} hypotheses",
                prior.len(),
                hypotheses.len()
            )));
        }
        if prior.iter().any(|w| !(w.is_finite() && *w >= 0.)) {
            return Err(ModelError::InvalidPrior(
                "weights must be finite and non-negative".into(),
            ));
        }
        let total: f64 = prior.iter().sum();
        if (total - 1.).abs() > 1e-9 {
            return Err(ModelError::InvalidPrior(format!(
                "weights sum to {total}, not 1"
            )));
        }
        for (i, hypothesis) in hypotheses.iter().enumerate() {
            if hypotheses[..i].iter().any(|h| h.name == hypothesis.name) {
                return Err(ModelError::DuplicateName(hypothesis.name.clone()));
            }
        }
        Ok(HypothesisSet {
            hypotheses,
            prior: prior.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn get(&self, id: HypothesisId) -> Option<&Hypothesis> {
        self.hypotheses.get(id.0)
    }

    pub fn prior(&self) -> &[f64] {
        &self.prior
    }

    pub fn iter(&self) -> impl Iterator<Item = (HypothesisId, &Hypothesis)> {
        self.hypotheses
            .iter()
            .enumerate()
            .map(|(i, h)| (HypothesisId(i), h))
    }

    pub fn find(&self, name: &str) -> Result<HypothesisId, SimulationError> {
        self.hypotheses
            .iter()
            .position(|h| h.name == name)
            .map(HypothesisId)
            .ok_or_else(|| SimulationError::UnknownHypothesis(name.to_string()))
    }
}

/// How a run picks its hypothesis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HypothesisPolicy {
    /// Draw from the prior of the hypothesis set.
    #[default]
    Prior,
    /// Pin a hypothesis, used for forward simulation.
    Fixed(HypothesisId),
}

impl HypothesisPolicy {
    /// The distribution of the hypothesis site under this policy.
    ///
    /// A pinned hypothesis becomes a one-hot categorical, so the choice is
    /// still recorded in the trace.
    pub fn distribution(&self, set: &HypothesisSet) -> Result<ChoiceDistribution, SimulationError> {
        match *self {
            HypothesisPolicy::Prior => Ok(ChoiceDistribution::categorical(set.prior())),
            HypothesisPolicy::Fixed(id) => {
                if id.0 >= set.len() {
                    return Err(SimulationError::UnknownHypothesis(format!("#{}", id.0)));
                }
                let mut weights = vec![0f64; set.len()];
                weights[id.0] = 1.;
                Ok(ChoiceDistribution::categorical(&weights))
            }
        }
    }
}

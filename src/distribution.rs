use rand::Rng;
use rand_distr::{Distribution, Exp};

/// The value of a single random choice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChoiceValue {
    Index(usize),
    Real(f64),
}

impl ChoiceValue {
    pub fn as_index(&self) -> Option<usize> {
        match *self {
            ChoiceValue::Index(idx) => Some(idx),
            ChoiceValue::Real(_) => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match *self {
            ChoiceValue::Real(val) => Some(val),
            ChoiceValue::Index(_) => None,
        }
    }
}

/// The distributions a simulation run draws from.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceDistribution {
    /// Weighted choice of an index, weights need not be normalized.
    Categorical { weights: Box<[f64]>, total: f64 },
    /// Exponential waiting time with the given rate.
    Exponential { rate: f64 },
}

impl ChoiceDistribution {
    pub fn categorical(weights: &[f64]) -> Self {
        ChoiceDistribution::Categorical {
            weights: weights.into(),
            total: weights.iter().sum(),
        }
    }

    pub fn exponential(rate: f64) -> Self {
        ChoiceDistribution::Exponential { rate }
    }

    /// Draw a value.
    ///
    /// Categorical draws use a single uniform scaled by the total weight and
    /// scan the weights in order, so the same uniform always gives the same
    /// index and entries with zero weight are never returned.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ChoiceValue {
        match self {
            ChoiceDistribution::Categorical { weights, total } => {
                let u = rng.random::<f64>() * total;
                ChoiceValue::Index(select_weighted(weights, u))
            }
            ChoiceDistribution::Exponential { rate } => {
                let value = match Exp::new(*rate) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => f64::INFINITY,
                };
                ChoiceValue::Real(value)
            }
        }
    }

    /// Natural log of the probability (mass or density) of `value`.
    ///
    /// Values outside the support give `-inf`.
    pub fn log_density(&self, value: &ChoiceValue) -> f64 {
        match (self, value) {
            (ChoiceDistribution::Categorical { weights, total }, &ChoiceValue::Index(idx)) => {
                match weights.get(idx) {
                    Some(&weight) if weight > 0. => (weight / total).ln(),
                    _ => f64::NEG_INFINITY,
                }
            }
            (ChoiceDistribution::Exponential { rate }, &ChoiceValue::Real(x)) => {
                if x.is_finite() && x >= 0. && *rate > 0. {
                    rate.ln() - rate * x
                } else {
                    f64::NEG_INFINITY
                }
            }
            _ => f64::NEG_INFINITY,
        }
    }

    /// Check that `value` is of the right kind and inside the support.
    ///
    /// A categorical index with zero weight is inside the support; its
    /// density is just zero.
    pub fn check_support(&self, value: &ChoiceValue) -> Result<(), String> {
        match (self, value) {
            (ChoiceDistribution::Categorical { weights, .. }, &ChoiceValue::Index(idx)) => {
                if idx < weights.len() {
                    Ok(())
                } else {
                    Err(format!(
                        "index {idx} is out of range for {} categories",
                        weights.len()
                    ))
                }
            }
            (ChoiceDistribution::Exponential { .. }, &ChoiceValue::Real(x)) => {
                if x.is_finite() && x >= 0. {
                    Ok(())
                } else {
                    Err(format!("waiting time {x} is not a finite non-negative number"))
                }
            }
            (ChoiceDistribution::Categorical { .. }, ChoiceValue::Real(_)) => {
                Err("expected an index, got a real number".into())
            }
            (ChoiceDistribution::Exponential { .. }, ChoiceValue::Index(_)) => {
                Err("expected a real number, got an index".into())
            }
        }
    }
}

/// The first index whose cumulative weight exceeds `u`.
///
/// Falls back to the last positive weight if rounding pushes `u` past the sum.
pub(crate) fn select_weighted(weights: &[f64], u: f64) -> usize {
    let mut cumsum = 0f64;
    let mut last_positive = 0;
    for (idx, &weight) in weights.iter().enumerate() {
        if weight <= 0. {
            continue;
        }
        cumsum += weight;
        last_positive = idx;
        if u < cumsum {
            return idx;
        }
    }
    last_positive
}

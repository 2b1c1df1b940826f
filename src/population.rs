use crate::error::ModelError;

/// Species counts, indexed in the species order of the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Population {
    counts: Box<[u64]>,
}

impl Population {
    pub fn from_counts(counts: &[u64]) -> Self {
        Population {
            counts: counts.into(),
        }
    }

    /// Build a population from `(species, count)` pairs.
    ///
    /// Species that are not mentioned start at zero. Negative counts and
    /// unknown species are rejected.
    pub fn from_named<'a>(
        species: &[String],
        counts: impl IntoIterator<Item = (&'a str, i64)>,
    ) -> Result<Self, ModelError> {
        let mut values = vec![0u64; species.len()].into_boxed_slice();
        for (name, count) in counts {
            let idx = species
                .iter()
                .position(|species| species == name)
                .ok_or_else(|| ModelError::UnknownSpecies(name.to_string()))?;
            if count < 0 {
                return Err(ModelError::NegativePopulation {
                    species: name.to_string(),
                    count,
                });
            }
            values[idx] = count as u64;
        }
        Ok(Population { counts: values })
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The state after applying `delta`, with every count clamped at zero.
    ///
    /// Fails if `delta` does not have one entry per species.
    pub fn transition(&self, delta: &[i64]) -> Result<Population, ModelError> {
        if delta.len() != self.counts.len() {
            return Err(ModelError::PopulationDimension {
                expected: self.counts.len(),
                found: delta.len(),
            });
        }
        let counts = self
            .counts
            .iter()
            .zip(delta)
            .map(|(&count, &change)| {
                let next = i128::from(count) + i128::from(change);
                next.clamp(0, i128::from(u64::MAX)) as u64
            })
            .collect();
        Ok(Population { counts })
    }
}

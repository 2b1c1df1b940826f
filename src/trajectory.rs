use std::sync::Arc;

use arrow::{
    array::{ArrayRef, Float64Array, StructArray, UInt64Array},
    error::ArrowError,
};

use crate::population::Population;

/// Append-only record of the simulated population over time.
///
/// Stored column-wise: one time column and one count column per species.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    species: Box<[String]>,
    times: Vec<f64>,
    counts: Vec<Vec<u64>>,
}

impl Trajectory {
    pub fn new(species: &[String]) -> Self {
        Self::with_capacity(species, 0)
    }

    pub fn with_capacity(species: &[String], capacity: usize) -> Self {
        Trajectory {
            species: species.into(),
            times: Vec::with_capacity(capacity),
            counts: species
                .iter()
                .map(|_| Vec::with_capacity(capacity))
                .collect(),
        }
    }

    pub(crate) fn push(&mut self, time: f64, population: &Population) {
        debug_assert!(population.len() == self.species.len());
        debug_assert!(self.times.last().map_or(true, |&last| last <= time));
        self.times.push(time);
        self.counts
            .iter_mut()
            .zip(population.counts())
            .for_each(|(column, &count)| column.push(count));
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// The count column of a species.
    pub fn counts(&self, species: &str) -> Option<&[u64]> {
        self.species
            .iter()
            .position(|name| name == species)
            .map(|idx| self.counts[idx].as_slice())
    }

    pub fn snapshot(&self, index: usize) -> Option<(f64, Population)> {
        let time = *self.times.get(index)?;
        let counts: Vec<u64> = self.counts.iter().map(|column| column[index]).collect();
        Some((time, Population::from_counts(&counts)))
    }

    pub fn final_state(&self) -> Option<(f64, Population)> {
        self.snapshot(self.len().checked_sub(1)?)
    }

    /// Export as an arrow struct array with a `time` column and one column per species.
    pub fn to_arrow(&self) -> Result<StructArray, ArrowError> {
        let mut columns: Vec<(&str, ArrayRef)> = Vec::with_capacity(self.species.len() + 1);
        columns.push(("time", Arc::new(Float64Array::from(self.times.clone())) as ArrayRef));
        for (name, column) in self.species.iter().zip(self.counts.iter()) {
            columns.push((name.as_str(), Arc::new(UInt64Array::from(column.clone())) as ArrayRef));
        }
        StructArray::try_from(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use pretty_assertions::assert_eq;

    fn species() -> Vec<String> {
        vec!["prey".to_string(), "pred".to_string()]
    }

    #[test]
    fn columns() {
        let mut traj = Trajectory::new(&species());
        traj.push(0., &Population::from_counts(&[50, 100]));
        traj.push(0.1, &Population::from_counts(&[51, 100]));
        assert_eq!(traj.len(), 2);
        assert_eq!(traj.times(), &[0., 0.1]);
        assert_eq!(traj.counts("prey").unwrap(), &[50, 51]);
        assert_eq!(traj.counts("pred").unwrap(), &[100, 100]);
        assert!(traj.counts("wolf").is_none());
        let (time, last) = traj.final_state().unwrap();
        assert_eq!(time, 0.1);
        assert_eq!(last.counts(), &[51, 100]);
    }

    #[test]
    fn arrow_export() {
        let mut traj = Trajectory::new(&species());
        traj.push(0., &Population::from_counts(&[1, 2]));
        traj.push(0.5, &Population::from_counts(&[0, 3]));
        let array = traj.to_arrow().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.num_columns(), 3);
        let prey = array
            .column_by_name("prey")
            .unwrap()
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        assert_eq!(prey.value(0), 1);
        assert_eq!(prey.value(1), 0);
    }
}

use std::ops::Range;

use rand::Rng;
use tracing::{debug, trace};

use crate::{
    distribution::{ChoiceDistribution, ChoiceValue},
    error::SimulationError,
    trace::{Choice, ChoiceOrigin, Evidence, SiteLabel, Trace},
};

/// Binds the random choices of one run to a trace.
///
/// Every random quantity of a simulation goes through [`DrawContext::draw`].
/// The context decides whether to sample fresh, to take an observed value
/// from the evidence, or to replay a latent value from an earlier trace.
pub struct DrawContext<'a, R: Rng + ?Sized> {
    rng: &'a mut R,
    evidence: Option<&'a Evidence>,
    replay: Option<&'a Trace>,
    resample: Option<SiteLabel>,
    trace: Trace,
}

impl<'a, R: Rng + ?Sized> DrawContext<'a, R> {
    pub fn new(rng: &'a mut R) -> Self {
        DrawContext {
            rng,
            evidence: None,
            replay: None,
            resample: None,
            trace: Trace::new(),
        }
    }

    /// Force the values in `evidence` and score them as observations.
    pub fn with_evidence(mut self, evidence: &'a Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Reuse the values of `previous` for latent sites, except `resample`.
    pub fn with_replay(mut self, previous: &'a Trace, resample: Option<SiteLabel>) -> Self {
        self.replay = Some(previous);
        self.resample = resample;
        self
    }

    /// Make a random choice at `label`.
    ///
    /// Fails with [`SimulationError::ConditioningConflict`] if the evidence
    /// holds a value outside the support of `distribution`.
    pub fn draw(
        &mut self,
        label: SiteLabel,
        distribution: ChoiceDistribution,
    ) -> Result<ChoiceValue, SimulationError> {
        let (value, origin) = match self.forced(&label, &distribution)? {
            Some(forced) => forced,
            None => (distribution.sample(&mut *self.rng), ChoiceOrigin::Sampled),
        };
        let log_density = distribution.log_density(&value);
        trace!(%label, ?value, ?origin, log_density, "draw");
        self.trace.push(Choice {
            label,
            distribution,
            value,
            origin,
            log_density,
        });
        Ok(value)
    }

    fn forced(
        &self,
        label: &SiteLabel,
        distribution: &ChoiceDistribution,
    ) -> Result<Option<(ChoiceValue, ChoiceOrigin)>, SimulationError> {
        if let Some(value) = self.evidence.and_then(|evidence| evidence.get(label)) {
            distribution
                .check_support(value)
                .map_err(|reason| SimulationError::ConditioningConflict {
                    label: *label,
                    reason,
                })?;
            return Ok(Some((*value, ChoiceOrigin::Observed)));
        }
        if self.resample.as_ref() == Some(label) {
            return Ok(None);
        }
        // A replayed value that no longer fits is drawn again.
        Ok(self
            .replay
            .and_then(|previous| previous.value(label))
            .filter(|value| distribution.check_support(value).is_ok())
            .map(|value| (value, ChoiceOrigin::Replayed)))
    }

    /// Record every observed event or wait label with a step in `steps` as
    /// unreached and return how many there were.
    pub(crate) fn mark_unreached(&mut self, steps: Range<u64>) -> usize {
        let Some(evidence) = self.evidence else {
            return 0;
        };
        let mut missed: Vec<SiteLabel> = evidence
            .iter()
            .map(|(label, _)| *label)
            .filter(|label| match label {
                SiteLabel::Event(step) | SiteLabel::Wait(step) => steps.contains(step),
                SiteLabel::Hypothesis => false,
            })
            .collect();
        missed.sort();
        if let Some(first) = missed.first() {
            debug!(%first, count = missed.len(), "observed sites not reached");
        }
        let count = missed.len();
        for label in missed {
            self.trace.push_unreached(label);
        }
        count
    }

    /// Forget the choices made after the first `len`.
    pub(crate) fn rewind(&mut self, len: usize) {
        self.trace.truncate(len);
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Finish the run and hand out the recorded choices.
    pub fn into_trace(self) -> Trace {
        self.trace
    }
}

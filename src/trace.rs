//! Records of the random choices made during a run.
//!
//! Every choice is stored under a [`SiteLabel`]. A finished [`Trace`] can be
//! turned into [`Evidence`] to replay the same choices in a later run.

use std::{collections::HashMap, fmt, str::FromStr};

use crate::{
    distribution::{ChoiceDistribution, ChoiceValue},
    hypothesis::HypothesisId,
};

/// The address of a random choice within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SiteLabel {
    /// The hypothesis drawn before the first step.
    Hypothesis,
    /// The reaction that fired at the given step.
    Event(u64),
    /// The waiting time before the given step.
    Wait(u64),
}

impl fmt::Display for SiteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteLabel::Hypothesis => write!(f, "hypothesis"),
            SiteLabel::Event(step) => write!(f, "event_{step}"),
            SiteLabel::Wait(step) => write!(f, "wait_{step}"),
        }
    }
}

impl FromStr for SiteLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "hypothesis" {
            return Ok(SiteLabel::Hypothesis);
        }
        let parse_step = |step: &str| {
            step.parse::<u64>()
                .map_err(|err| format!("invalid step in label `{s}`: {err}"))
        };
        if let Some(step) = s.strip_prefix("event_") {
            return Ok(SiteLabel::Event(parse_step(step)?));
        }
        if let Some(step) = s.strip_prefix("wait_") {
            return Ok(SiteLabel::Wait(parse_step(step)?));
        }
        Err(format!("unknown label `{s}`"))
    }
}

/// Where the value of a choice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceOrigin {
    /// Freshly drawn from the random number generator.
    Sampled,
    /// Copied from a previous trace, but still a latent variable.
    Replayed,
    /// Fixed by evidence; contributes to the likelihood.
    Observed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub label: SiteLabel,
    pub distribution: ChoiceDistribution,
    pub value: ChoiceValue,
    pub origin: ChoiceOrigin,
    pub log_density: f64,
}

impl Choice {
    pub fn is_observed(&self) -> bool {
        self.origin == ChoiceOrigin::Observed
    }
}

/// All random choices of one run, in the order they were made.
///
/// Observed labels that the run stopped before reaching are kept apart in
/// [`Trace::unreached`]; any of them makes the trace impossible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    choices: Vec<Choice>,
    index: HashMap<SiteLabel, usize>,
    unreached: Vec<SiteLabel>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, choice: Choice) {
        debug_assert!(!self.index.contains_key(&choice.label));
        self.index.insert(choice.label, self.choices.len());
        self.choices.push(choice);
    }

    /// Drop every choice made after the first `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        for choice in self.choices.drain(len.min(self.choices.len())..) {
            self.index.remove(&choice.label);
        }
    }

    pub(crate) fn push_unreached(&mut self, label: SiteLabel) {
        self.unreached.push(label);
    }

    /// Observed labels the run never got to.
    pub fn unreached(&self) -> &[SiteLabel] {
        &self.unreached
    }

    pub fn get(&self, label: &SiteLabel) -> Option<&Choice> {
        self.index.get(label).map(|&idx| &self.choices[idx])
    }

    pub fn value(&self, label: &SiteLabel) -> Option<ChoiceValue> {
        self.get(label).map(|choice| choice.value)
    }

    pub fn contains(&self, label: &SiteLabel) -> bool {
        self.index.contains_key(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Choice> {
        self.choices.iter()
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// The hypothesis drawn in this run.
    pub fn hypothesis(&self) -> Option<HypothesisId> {
        self.value(&SiteLabel::Hypothesis)
            .and_then(|value| value.as_index())
            .map(HypothesisId)
    }

    /// Log probability of every choice in the trace.
    pub fn log_joint(&self) -> f64 {
        if !self.unreached.is_empty() {
            return f64::NEG_INFINITY;
        }
        self.choices.iter().map(|choice| choice.log_density).sum()
    }

    /// Log probability of the observed choices.
    pub fn log_likelihood(&self) -> f64 {
        if !self.unreached.is_empty() {
            return f64::NEG_INFINITY;
        }
        self.choices
            .iter()
            .filter(|choice| choice.is_observed())
            .map(|choice| choice.log_density)
            .sum()
    }

    /// Log probability of the latent choices.
    pub fn log_prior(&self) -> f64 {
        self.choices
            .iter()
            .filter(|choice| !choice.is_observed())
            .map(|choice| choice.log_density)
            .sum()
    }

    pub fn latent_labels(&self) -> Vec<SiteLabel> {
        self.choices
            .iter()
            .filter(|choice| !choice.is_observed())
            .map(|choice| choice.label)
            .collect()
    }

    pub fn to_evidence(&self) -> Evidence {
        Evidence {
            values: self
                .choices
                .iter()
                .map(|choice| (choice.label, choice.value))
                .collect(),
        }
    }
}

/// Values that are forced for their labels in every run that uses them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    values: HashMap<SiteLabel, ChoiceValue>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: SiteLabel, value: ChoiceValue) -> Option<ChoiceValue> {
        self.values.insert(label, value)
    }

    pub fn with(mut self, label: SiteLabel, value: ChoiceValue) -> Self {
        self.values.insert(label, value);
        self
    }

    pub fn remove(&mut self, label: &SiteLabel) -> Option<ChoiceValue> {
        self.values.remove(label)
    }

    /// The same evidence without the given labels.
    pub fn without(mut self, labels: &[SiteLabel]) -> Self {
        for label in labels {
            self.values.remove(label);
        }
        self
    }

    pub fn get(&self, label: &SiteLabel) -> Option<&ChoiceValue> {
        self.values.get(label)
    }

    pub fn contains(&self, label: &SiteLabel) -> bool {
        self.values.contains_key(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SiteLabel, &ChoiceValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(SiteLabel, ChoiceValue)> for Evidence {
    fn from_iter<T: IntoIterator<Item = (SiteLabel, ChoiceValue)>>(iter: T) -> Self {
        Evidence {
            values: iter.into_iter().collect(),
        }
    }
}

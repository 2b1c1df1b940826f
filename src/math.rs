#[inline]
pub(crate) fn logaddexp(a: f64, b: f64) -> f64 {
    if a == b {
        return a + 2f64.ln();
    }
    let diff = a - b;
    if diff > 0. {
        a + (-diff).exp().ln_1p()
    } else if diff < 0. {
        b + diff.exp().ln_1p()
    } else {
        // diff is NAN
        diff
    }
}

/// `ln(sum(exp(x)))`, `-inf` for an empty slice or all `-inf` entries.
pub(crate) fn logsumexp(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| *v != f64::NEG_INFINITY)
        .fold(f64::NEG_INFINITY, |acc, v| {
            if acc == f64::NEG_INFINITY {
                v
            } else {
                logaddexp(acc, v)
            }
        })
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RunningMean {
    sum: f64,
    count: u64,
}

impl RunningMean {
    pub(crate) fn new() -> RunningMean {
        RunningMean { sum: 0., count: 0 }
    }

    pub(crate) fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub(crate) fn current(&self) -> f64 {
        self.sum / self.count as f64
    }

    pub(crate) fn reset(&mut self) {
        self.sum = 0f64;
        self.count = 0;
    }
}

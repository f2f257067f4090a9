use std::cmp;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{MFloat, Mtime};

/// Probabilities closer than this are considered equal.
pub const EPSILON: MFloat = 1e-6;
/// Largest rounding residual a convolution may leave behind.
pub const MAX_ROUNDING_RESIDUAL: MFloat = 1e-4;
/// Probabilities below this are not stored at the borders of a distribution.
pub const SMALL_VALUE: MFloat = 1e-9;

/// Discrete probability mass function over delay minutes `start..=last_minute()`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Distribution {
    histogram: Vec<MFloat>,
    cumulative: Vec<MFloat>,
    start: Mtime,
    mean: MFloat,
}

impl Distribution {
    pub fn empty() -> Distribution {
        Distribution {
            histogram: vec![],
            cumulative: vec![],
            start: 0,
            mean: 0.,
        }
    }

    pub fn new(probabilities: &[MFloat], first_minute: Mtime) -> Distribution {
        let mut d = Distribution::empty();
        d.init(probabilities, first_minute);
        d
    }

    pub fn one_point(minute: Mtime, mass: MFloat) -> Distribution {
        let mut d = Distribution::empty();
        d.init_one_point(minute, mass);
        d
    }

    pub fn uniform(start: Mtime, width: usize) -> Distribution {
        if width == 0 {
            return Distribution::empty();
        }
        Distribution::new(&vec![1.0 / (width as MFloat); width], start)
    }

    pub fn init(&mut self, probabilities: &[MFloat], first_minute: Mtime) {
        self.start = first_minute;
        self.histogram.clear();
        self.cumulative.clear();
        self.mean = 0.0;
        if probabilities.is_empty() {
            return;
        }
        // negligible minutes at both ends are dropped, their mass goes to the first kept minute
        let mut first = 0;
        while first + 1 < probabilities.len() && probabilities[first] < SMALL_VALUE {
            first += 1;
        }
        let mut last = probabilities.len() - 1;
        while last > first && probabilities[last] < SMALL_VALUE {
            last -= 1;
        }
        let dropped: MFloat = probabilities[..first]
            .iter()
            .chain(&probabilities[last + 1..])
            .map(|p| p.max(0.0))
            .sum();
        self.start = first_minute + first as Mtime;

        let mut sum = 0.0;
        for (i, p) in probabilities[first..=last].iter().enumerate() {
            debug_assert!(*p >= -EPSILON, "negative probability {} at index {}", p, first + i);
            let mut p = p.max(0.0);
            if i == 0 {
                p += dropped;
            }
            sum += p;
            self.mean += (self.start + i as Mtime) as MFloat * p;
            self.histogram.push(p);
            self.cumulative.push(sum);
        }
    }

    /// Collapses the distribution to certainty at `minute`.
    pub fn init_one_point(&mut self, minute: Mtime, mass: MFloat) {
        self.init(&[mass], minute);
    }

    pub fn exists(&self) -> bool {
        !self.histogram.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    pub fn first_minute(&self) -> Mtime {
        self.start
    }

    pub fn last_minute(&self) -> Mtime {
        self.start + self.histogram.len() as Mtime - 1
    }

    pub fn probabilities(&self) -> &[MFloat] {
        &self.histogram
    }

    /// Expected delay, weighted by the (possibly defective) mass.
    pub fn mean(&self) -> MFloat {
        self.mean
    }

    pub fn sum(&self) -> MFloat {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    fn index(&self, minute: Mtime) -> usize {
        (minute - self.start) as usize
    }

    pub fn probability_equal(&self, minute: Mtime) -> MFloat {
        if self.is_empty() || minute < self.start || minute > self.last_minute() {
            return 0.0;
        }
        self.histogram[self.index(minute)]
    }

    pub fn probability_smaller_equal(&self, minute: Mtime) -> MFloat {
        if self.is_empty() || minute < self.start {
            return 0.0;
        }
        if minute > self.last_minute() {
            return self.sum();
        }
        self.cumulative[self.index(minute)]
    }

    pub fn probability_smaller(&self, minute: Mtime) -> MFloat {
        self.probability_smaller_equal(minute - 1)
    }

    pub fn probability_greater_equal(&self, minute: Mtime) -> MFloat {
        if self.is_empty() || minute > self.last_minute() {
            return 0.0;
        }
        if minute <= self.start {
            return self.sum();
        }
        (self.sum() - self.probability_smaller(minute)).max(0.0)
    }

    pub fn probability_greater(&self, minute: Mtime) -> MFloat {
        self.probability_greater_equal(minute + 1)
    }

    /// Copy over the same minutes with all mass after `minute` removed.
    pub fn truncated_after(&self, minute: Mtime) -> Distribution {
        let probabilities: Vec<MFloat> = self
            .histogram
            .iter()
            .enumerate()
            .map(|(i, p)| if self.start + i as Mtime > minute { 0.0 } else { *p })
            .collect();
        Distribution::new(&probabilities, self.start)
    }

    /// Sum of absolute per-minute differences over both ranges.
    pub fn difference(&self, other: &Distribution) -> MFloat {
        match (self.exists(), other.exists()) {
            (false, false) => 0.0,
            (true, false) => self.sum(),
            (false, true) => other.sum(),
            (true, true) => {
                let first = cmp::min(self.first_minute(), other.first_minute());
                let last = cmp::max(self.last_minute(), other.last_minute());
                (first..=last)
                    .map(|m| (self.probability_equal(m) - other.probability_equal(m)).abs())
                    .sum()
            }
        }
    }
}

impl PartialEq for Distribution {
    fn eq(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return self.is_empty() && other.is_empty();
        }
        let first = cmp::min(self.first_minute(), other.first_minute());
        let last = cmp::max(self.last_minute(), other.last_minute());
        (first..=last).all(|m| (self.probability_equal(m) - other.probability_equal(m)).abs() <= EPSILON)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "empty distribution");
        }
        write!(
            f,
            "[sum={} first-min={} last-min={} values=",
            self.sum(),
            self.first_minute(),
            self.last_minute()
        )?;
        for (i, p) in self.histogram.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, "]")
    }
}

/// Adds the difference between `expected_sum` and the actual sum to the largest bucket
/// (the first one on ties). A residual above [`MAX_ROUNDING_RESIDUAL`] is applied and
/// reported; one that would make the bucket negative clamps it to 0.
pub fn correct_rounding_errors(expected_sum: MFloat, probabilities: &mut [MFloat]) -> Result<()> {
    if probabilities.is_empty() {
        return Ok(());
    }
    let mut sum = 0.0;
    let mut idx_max = 0;
    for (i, p) in probabilities.iter().enumerate() {
        sum += p;
        if *p > probabilities[idx_max] {
            idx_max = i;
        }
    }
    let residual = expected_sum - sum;
    if residual == 0.0 {
        return Ok(());
    }
    if probabilities[idx_max] + residual < 0.0 {
        probabilities[idx_max] = 0.0;
        return Err(Error::NegativeMass {
            residual,
            bucket: idx_max,
        });
    }
    probabilities[idx_max] += residual;
    if residual.abs() > MAX_ROUNDING_RESIDUAL {
        return Err(Error::RoundingResidual { residual });
    }
    Ok(())
}

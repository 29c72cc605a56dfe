//! Distribution statistics over one cell position across a reduction group.

use std::fmt;

use batchlab_core::StatsKind;
use serde::{Deserialize, Serialize};

/// Two-sided 95% normal quantile.
const Z95: f64 = 1.96;

/// Whisker reach in interquartile ranges.
const WHISKER_IQR: f64 = 1.5;

/// One statistic written to its own processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    /// Arithmetic mean.
    Mean,
    /// Sample standard deviation.
    Stddev,
    /// Lower 95% confidence bound of the mean.
    Cilo,
    /// Upper 95% confidence bound of the mean.
    Cihi,
    /// Median.
    Median,
    /// First quartile.
    Q1,
    /// Third quartile.
    Q3,
    /// Lowest datum within 1.5 IQR of the first quartile.
    Whislo,
    /// Highest datum within 1.5 IQR of the third quartile.
    Whishi,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
}

static CONF95: [Statistic; 4] = [Statistic::Mean, Statistic::Stddev, Statistic::Cilo, Statistic::Cihi];

static BW: [Statistic; 8] = [
    Statistic::Mean,
    Statistic::Median,
    Statistic::Q1,
    Statistic::Q3,
    Statistic::Whislo,
    Statistic::Whishi,
    Statistic::Min,
    Statistic::Max,
];

static ALL: [Statistic; 11] = [
    Statistic::Mean,
    Statistic::Stddev,
    Statistic::Cilo,
    Statistic::Cihi,
    Statistic::Median,
    Statistic::Q1,
    Statistic::Q3,
    Statistic::Whislo,
    Statistic::Whishi,
    Statistic::Min,
    Statistic::Max,
];

impl Statistic {
    /// File name component, e.g. `mean` in `pos.mean.csv`.
    pub fn as_str(self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Stddev => "stddev",
            Statistic::Cilo => "cilo",
            Statistic::Cihi => "cihi",
            Statistic::Median => "median",
            Statistic::Q1 => "q1",
            Statistic::Q3 => "q3",
            Statistic::Whislo => "whislo",
            Statistic::Whishi => "whishi",
            Statistic::Min => "min",
            Statistic::Max => "max",
        }
    }

    /// Inverse of [`Statistic::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        ALL.iter().copied().find(|stat| stat.as_str() == name)
    }

    /// Statistics emitted for `kind`, mean first.
    pub fn for_kind(kind: StatsKind) -> &'static [Statistic] {
        match kind {
            StatsKind::None => &ALL[..1],
            StatsKind::Conf95 => &CONF95,
            StatsKind::Bw => &BW,
            StatsKind::All => &ALL,
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every statistic of one sample. NaN inputs are treated as missing; an
/// empty sample yields NaN throughout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// Number of non-missing values.
    pub count: usize,
    mean: f64,
    stddev: f64,
    median: f64,
    q1: f64,
    q3: f64,
    whislo: f64,
    whishi: f64,
    min: f64,
    max: f64,
}

impl Summary {
    /// Summarizes `values`.
    pub fn of(values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|value| !value.is_nan()).collect();
        sorted.sort_by(f64::total_cmp);
        let count = sorted.len();
        if count == 0 {
            return Self {
                count,
                mean: f64::NAN,
                stddev: f64::NAN,
                median: f64::NAN,
                q1: f64::NAN,
                q3: f64::NAN,
                whislo: f64::NAN,
                whishi: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            };
        }
        let n = count as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let stddev = if count > 1 {
            (sorted.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let q1 = percentile(&sorted, 0.25);
        let q3 = percentile(&sorted, 0.75);
        let reach = WHISKER_IQR * (q3 - q1);
        let min = sorted[0];
        let max = sorted[count - 1];
        let whislo = sorted
            .iter()
            .copied()
            .find(|value| *value >= q1 - reach)
            .unwrap_or(min);
        let whishi = sorted
            .iter()
            .rev()
            .copied()
            .find(|value| *value <= q3 + reach)
            .unwrap_or(max);
        Self {
            count,
            mean,
            stddev,
            median: percentile(&sorted, 0.5),
            q1,
            q3,
            whislo,
            whishi,
            min,
            max,
        }
    }

    /// Value of `stat`.
    pub fn get(&self, stat: Statistic) -> f64 {
        let half_width = || Z95 * self.stddev / (self.count as f64).sqrt();
        match stat {
            Statistic::Mean => self.mean,
            Statistic::Stddev => self.stddev,
            Statistic::Cilo => self.mean - half_width(),
            Statistic::Cihi => self.mean + half_width(),
            Statistic::Median => self.median,
            Statistic::Q1 => self.q1,
            Statistic::Q3 => self.q3,
            Statistic::Whislo => self.whislo,
            Statistic::Whishi => self.whishi,
            Statistic::Min => self.min,
            Statistic::Max => self.max,
        }
    }
}

/// Linear interpolation between closest ranks of an ascending sample.
fn percentile(values: &[f64], quantile: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let position = quantile * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        values[lower]
    } else {
        let weight = position - lower as f64;
        values[lower] * (1.0 - weight) + values[upper] * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conf95_of_small_sample() {
        let summary = Summary::of(&[2.0, 4.0, 6.0]);
        assert_eq!(summary.get(Statistic::Mean), 4.0);
        assert_eq!(summary.get(Statistic::Stddev), 2.0);
        let half = 1.96 * 2.0 / 3f64.sqrt();
        assert!((summary.get(Statistic::Cilo) - (4.0 - half)).abs() < 1e-12);
        assert!((summary.get(Statistic::Cihi) - (4.0 + half)).abs() < 1e-12);
    }

    #[test]
    fn single_value_has_zero_spread() {
        let summary = Summary::of(&[5.0]);
        assert_eq!(summary.get(Statistic::Stddev), 0.0);
        assert_eq!(summary.get(Statistic::Cilo), 5.0);
        assert_eq!(summary.get(Statistic::Q3), 5.0);
    }

    #[test]
    fn missing_values_are_skipped() {
        let summary = Summary::of(&[f64::NAN, 1.0, 3.0]);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.get(Statistic::Mean), 2.0);
        assert!(Summary::of(&[f64::NAN]).get(Statistic::Mean).is_nan());
    }

    #[test]
    fn whiskers_exclude_outliers() {
        let summary = Summary::of(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        assert_eq!(summary.get(Statistic::Median), 3.0);
        assert_eq!(summary.get(Statistic::Q1), 2.0);
        assert_eq!(summary.get(Statistic::Q3), 4.0);
        assert_eq!(summary.get(Statistic::Whislo), 1.0);
        assert_eq!(summary.get(Statistic::Whishi), 4.0);
        assert_eq!(summary.get(Statistic::Max), 100.0);
    }

    #[test]
    fn kind_sets_start_with_mean() {
        for kind in [StatsKind::None, StatsKind::Conf95, StatsKind::Bw, StatsKind::All] {
            assert_eq!(Statistic::for_kind(kind)[0], Statistic::Mean);
        }
        assert_eq!(Statistic::for_kind(StatsKind::All).len(), 11);
        assert_eq!(Statistic::parse("whishi"), Some(Statistic::Whishi));
        assert_eq!(Statistic::parse("average"), None);
    }
}

use crate::error::{MarketContextError, Result};
use chrono::NaiveDate;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One observation of a benchmark's daily return, in percent (9.5 means +9.5%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DailyReturn {
    pub date: NaiveDate,
    pub pct_return: f64,
}

impl DailyReturn {
    pub fn new(date: NaiveDate, pct_return: f64) -> Self {
        Self { date, pct_return }
    }
}

/// A single trading day flagged as an outsized move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexEvent {
    #[schemars(description = "Trading date in YYYY-MM-DD format")]
    pub date: NaiveDate,

    #[schemars(description = "Neutral description of the move. Empty until the event is described.")]
    #[serde(default)]
    pub description: String,

    #[schemars(description = "Observed one-day return in percent, stored exactly as observed")]
    pub one_day_move_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Flag when |return - mean| >= threshold_sigma * stddev.
    pub threshold_sigma: f64,
    /// Fewer observations than this yield no events.
    pub min_samples: usize,
    /// Keep only the largest deviations when set.
    pub max_events: Option<usize>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_sigma: 1.5,
            min_samples: 2,
            max_events: Some(3),
        }
    }
}

/// Mean and population standard deviation of the scanned window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
    pub samples: usize,
}

pub struct EventDetector {
    config: DetectorConfig,
}

impl EventDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn with_threshold(threshold_sigma: f64) -> Self {
        Self::new(DetectorConfig {
            threshold_sigma,
            max_events: None,
            ..DetectorConfig::default()
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Computes the baseline over exactly the observations that will be scanned.
    ///
    /// Fails with `DetectionDegenerate` when the window is too short or has no
    /// variance; callers treat that as "nothing to flag".
    pub fn baseline(&self, returns: &[DailyReturn]) -> Result<Baseline> {
        let values: Vec<f64> = returns
            .iter()
            .map(|r| r.pct_return)
            .filter(|v| v.is_finite())
            .collect();

        if values.len() < self.config.min_samples.max(2) {
            return Err(MarketContextError::DetectionDegenerate(format!(
                "{} usable observations, need at least {}",
                values.len(),
                self.config.min_samples.max(2)
            )));
        }

        // Identical values can still leave a rounding residue in the variance.
        if values.iter().all(|v| *v == values[0]) {
            return Err(MarketContextError::DetectionDegenerate(
                "series has zero variance".to_string(),
            ));
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        if !std_dev.is_finite() || std_dev == 0.0 {
            return Err(MarketContextError::DetectionDegenerate(
                "series has zero variance".to_string(),
            ));
        }

        Ok(Baseline {
            mean,
            std_dev,
            samples: values.len(),
        })
    }

    /// Flags every observation deviating from the window mean by at least
    /// `threshold_sigma` standard deviations. Output is ordered by date and
    /// carries the observed return unmodified with an empty description.
    pub fn detect(&self, returns: &[DailyReturn]) -> Vec<IndexEvent> {
        if !self.config.threshold_sigma.is_finite() || self.config.threshold_sigma < 0.0 {
            debug!(
                "Event detection skipped: invalid threshold {}",
                self.config.threshold_sigma
            );
            return Vec::new();
        }

        let baseline = match self.baseline(returns) {
            Ok(b) => b,
            Err(e) => {
                debug!("{}", e);
                return Vec::new();
            }
        };

        let cutoff = self.config.threshold_sigma * baseline.std_dev;
        let mut flagged: Vec<(f64, &DailyReturn)> = returns
            .iter()
            .filter(|r| r.pct_return.is_finite())
            .map(|r| ((r.pct_return - baseline.mean).abs(), r))
            .filter(|(deviation, _)| *deviation >= cutoff)
            .collect();

        if let Some(limit) = self.config.max_events {
            if flagged.len() > limit {
                flagged.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.date.cmp(&b.1.date)));
                flagged.truncate(limit);
            }
        }

        flagged.sort_by_key(|(_, r)| r.date);

        debug!(
            "Flagged {} of {} observations (mean {:.4}, sigma {:.4}, cutoff {:.4})",
            flagged.len(),
            baseline.samples,
            baseline.mean,
            baseline.std_dev,
            cutoff
        );

        flagged
            .into_iter()
            .map(|(_, r)| IndexEvent {
                date: r.date,
                description: String::new(),
                one_day_move_pct: r.pct_return,
            })
            .collect()
    }
}

/// Flags outsized single-day moves with no cap on the number of events.
pub fn detect(daily_returns: &[DailyReturn], threshold_sigma: f64) -> Vec<IndexEvent> {
    EventDetector::with_threshold(threshold_sigma).detect(daily_returns)
}

/// Converts an ordered close-price series into daily percent returns.
///
/// Returns are published at two decimals, the precision the narrative cites.
/// Pairs with a non-positive or non-finite previous close are skipped.
pub fn returns_from_prices(prices: &[(NaiveDate, f64)]) -> Vec<DailyReturn> {
    prices
        .windows(2)
        .filter_map(|pair| {
            let (_, prev) = pair[0];
            let (date, close) = pair[1];
            if !(prev.is_finite() && close.is_finite()) || prev <= 0.0 {
                return None;
            }
            let pct = (close / prev - 1.0) * 100.0;
            Some(DailyReturn::new(date, (pct * 100.0).round() / 100.0))
        })
        .collect()
}

/// Fills each event's description with a neutral sentence naming the benchmark
/// and the exact observed move. No causes are attributed.
pub fn describe_events(events: &[IndexEvent], benchmark: &str) -> Vec<IndexEvent> {
    events
        .iter()
        .map(|event| {
            let direction = if event.one_day_move_pct >= 0.0 {
                "gain"
            } else {
                "decline"
            };
            IndexEvent {
                description: format!(
                    "{} one-day {} of {}% on {}",
                    benchmark,
                    direction,
                    event.one_day_move_pct.abs(),
                    event.date.format("%Y-%m-%d")
                ),
                ..event.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, day).unwrap()
    }

    fn series(values: &[f64]) -> Vec<DailyReturn> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DailyReturn::new(d(i as u32 + 1), *v))
            .collect()
    }

    #[test]
    fn test_flags_single_outlier() {
        let returns = series(&[0.2, -0.3, 0.1, 9.5, -0.2, 0.4, 0.0, -0.1]);
        let events = detect(&returns, 1.5);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].date, d(4));
        assert_eq!(events[0].one_day_move_pct, 9.5);
        assert!(events[0].description.is_empty());
    }

    #[test]
    fn test_zero_variance_yields_nothing() {
        let returns = series(&[0.7; 10]);
        assert!(detect(&returns, 0.0).is_empty());
        assert!(detect(&returns, 1.5).is_empty());
    }

    #[test]
    fn test_too_few_samples() {
        assert!(detect(&[], 1.5).is_empty());
        assert!(detect(&series(&[5.0]), 1.5).is_empty());

        let detector = EventDetector::with_threshold(1.5);
        let err = detector.baseline(&series(&[5.0])).unwrap_err();
        assert!(matches!(err, MarketContextError::DetectionDegenerate(_)));
    }

    #[test]
    fn test_population_std_dev() {
        let detector = EventDetector::with_threshold(1.0);
        let baseline = detector.baseline(&series(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0])).unwrap();
        assert!((baseline.mean - 5.0).abs() < 1e-12);
        assert!((baseline.std_dev - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // mean 5, population sigma 2: 9.0 sits exactly 2 sigma away
        let returns = series(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let events = detect(&returns, 2.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].one_day_move_pct, 9.0);
    }

    #[test]
    fn test_deterministic() {
        let returns = series(&[0.5, -2.8, 0.1, 3.1, -0.4, 0.2, -0.6, 0.3]);
        let first = detect(&returns, 1.2);
        for _ in 0..5 {
            assert_eq!(detect(&returns, 1.2), first);
        }
    }

    #[test]
    fn test_max_events_keeps_largest_in_date_order() {
        let returns = series(&[6.0, 0.0, 0.1, -8.0, 0.0, 0.1, 7.0, 0.0, 0.1, 0.0]);
        let detector = EventDetector::new(DetectorConfig {
            threshold_sigma: 1.0,
            min_samples: 2,
            max_events: Some(2),
        });
        let events = detector.detect(&returns);
        let dates: Vec<NaiveDate> = events.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![d(4), d(7)]);
    }

    #[test]
    fn test_returns_from_prices() {
        let prices = vec![(d(1), 100.0), (d(2), 109.5), (d(3), 0.0), (d(4), 50.0)];
        let returns = returns_from_prices(&prices);
        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0], DailyReturn::new(d(2), 9.5));
        assert_eq!(returns[1], DailyReturn::new(d(3), -100.0));
    }

    #[test]
    fn test_describe_events_keeps_exact_value() {
        let events = vec![IndexEvent {
            date: d(8),
            description: String::new(),
            one_day_move_pct: 9.5,
        }];
        let described = describe_events(&events, "Russell 2000");
        assert_eq!(
            described[0].description,
            "Russell 2000 one-day gain of 9.5% on 2025-04-08"
        );
        assert_eq!(described[0].one_day_move_pct, 9.5);
    }
}

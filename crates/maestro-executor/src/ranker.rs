//! Learned strategy ordering.
//!
//! Keeps an incremental success-rate estimate per (app, strategy) pair and
//! orders candidates by it once enough samples exist. Below the sample
//! gate the static default order is used, so early noisy data cannot
//! destabilize strategy choice. Coordinate replay never ranks first: its
//! failures are silent misclicks, too expensive to discover the hard way.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use maestro_core::config::RankerConfig;
use maestro_core::types::{StrategyKind, StrategyStat, DEFAULT_STRATEGY_ORDER};

#[derive(Default)]
struct AppStats {
    per_strategy: HashMap<StrategyKind, StrategyStat>,
    samples: u64,
}

/// Orders candidate strategies for an app using accumulated statistics.
pub struct StrategyRanker {
    config: RankerConfig,
    stats: Mutex<HashMap<String, AppStats>>,
}

impl StrategyRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Ordered strategy kinds for an app.
    ///
    /// Apps below the minimum sample count get the fixed default order;
    /// above it, descending rolling success rate (ties keep default order).
    pub fn rank(&self, app_key: &str) -> Vec<StrategyKind> {
        let stats = self.stats.lock().unwrap();
        let Some(app) = stats.get(app_key) else {
            return DEFAULT_STRATEGY_ORDER.to_vec();
        };
        if app.samples < self.config.min_samples {
            return DEFAULT_STRATEGY_ORDER.to_vec();
        }

        let mut ranked: Vec<StrategyKind> = DEFAULT_STRATEGY_ORDER.to_vec();
        // Stable sort keeps the default order for equal rates.
        ranked.sort_by(|a, b| {
            let rate = |k: &StrategyKind| {
                app.per_strategy
                    .get(k)
                    .map(|s| s.rolling_rate)
                    .unwrap_or(0.0)
            };
            rate(b)
                .partial_cmp(&rate(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Coordinate replay stays out of first place.
        if ranked.first() == Some(&StrategyKind::CoordReplay) {
            ranked.remove(0);
            ranked.push(StrategyKind::CoordReplay);
        }

        debug!(app_key, order = ?ranked, "Learned strategy order");
        ranked
    }

    /// Record one attempt outcome.
    ///
    /// Updates the EWMA rate and the raw counters. Rates stay in [0, 1].
    pub fn record(&self, app_key: &str, kind: StrategyKind, success: bool) {
        let mut stats = self.stats.lock().unwrap();
        let app = stats.entry(app_key.to_string()).or_default();
        app.samples += 1;

        let stat = app.per_strategy.entry(kind).or_default();
        stat.attempt_count += 1;
        if success {
            stat.success_count += 1;
        }
        let alpha = self.config.learning_rate;
        let outcome = if success { 1.0 } else { 0.0 };
        stat.rolling_rate = ((1.0 - alpha) * stat.rolling_rate + alpha * outcome).clamp(0.0, 1.0);
    }

    /// Halve the sample weight for every app.
    ///
    /// Stats decay rather than reset, and are never hard-deleted.
    pub fn decay(&self) {
        let mut stats = self.stats.lock().unwrap();
        for app in stats.values_mut() {
            app.samples /= 2;
            for stat in app.per_strategy.values_mut() {
                stat.attempt_count /= 2;
                stat.success_count /= 2;
            }
        }
    }

    /// Current stat for one (app, strategy) pair.
    pub fn stat(&self, app_key: &str, kind: StrategyKind) -> Option<StrategyStat> {
        self.stats
            .lock()
            .unwrap()
            .get(app_key)
            .and_then(|app| app.per_strategy.get(&kind))
            .cloned()
    }
}

//! Analytics contracts: bandit posteriors and value-per-token statistics.
//!
//! The statistics are owned by an external analytics store. The planner only
//! reads them and forwards reward observations through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;

/// Beta-distribution parameters for one `(family, arm)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BanditPosterior {
    pub alpha: f64,
    pub beta: f64,
    /// Number of reward observations inside the window.
    pub count: u64,
}

impl BanditPosterior {
    /// Posterior for an arm with no observations.
    pub fn empty() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            count: 0,
        }
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta).max(1e-6)
    }

    /// `αβ / ((α+β)² (α+β+1))`
    pub fn variance(&self) -> f64 {
        let sum = self.alpha + self.beta;
        (self.alpha * self.beta) / (sum * sum * (sum + 1.0)).max(1e-6)
    }
}

impl Default for BanditPosterior {
    fn default() -> Self {
        Self::empty()
    }
}

/// Posterior priors and observation window, declared by the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BanditPriors {
    pub window_days: u32,
    pub alpha_prior: f64,
    pub beta_prior: f64,
}

impl Default for BanditPriors {
    fn default() -> Self {
        Self {
            window_days: 14,
            alpha_prior: 1.5,
            beta_prior: 1.5,
        }
    }
}

/// Value-per-token estimate for a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VptStats {
    pub vpt_mean: f64,
    /// 95% half-width, present once enough samples exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpt_ci: Option<f64>,
}

/// Read/update bandit posteriors by `(family, arm)`.
#[async_trait]
pub trait PosteriorStore: Send + Sync {
    async fn get_posterior(&self, family: &str, arm: &str) -> BanditPosterior;

    /// Replace the priors and window used for later posteriors.
    fn configure_priors(&self, _priors: BanditPriors) {}

    /// Record a reward in `[0, 1]` (out-of-range values are clamped).
    async fn record_outcome(
        &self,
        family: &str,
        arm: &str,
        reward: f64,
    ) -> std::result::Result<(), AnalyticsError>;
}

/// Read/update value-per-token statistics by module id.
#[async_trait]
pub trait VptStore: Send + Sync {
    async fn get_module_vpt(&self, module_id: &str) -> VptStats;

    /// Record one quality observation `q` for a module that cost `tokens`.
    async fn record_module_outcome(
        &self,
        module_id: &str,
        quality: f64,
        tokens: usize,
    ) -> std::result::Result<(), AnalyticsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_posterior_is_uniform() {
        let p = BanditPosterior::empty();
        assert_eq!(p.count, 0);
        assert!((p.mean() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn variance_shrinks_with_evidence() {
        let weak = BanditPosterior { alpha: 2.0, beta: 2.0, count: 2 };
        let strong = BanditPosterior { alpha: 50.0, beta: 50.0, count: 98 };
        assert!(strong.variance() < weak.variance());
        // Beta(2,2): 4 / (16 * 5) = 0.05
        assert!((weak.variance() - 0.05).abs() < 1e-9);
    }
}

//! In-memory analytics store: bandit rewards and module value-per-token.
//!
//! Observations older than the configured window are pruned on every
//! read and write. Long-term persistence is left to an external store
//! implementing the same traits.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use promptweave_core::analytics::{BanditPosterior, BanditPriors, PosteriorStore, VptStats, VptStore};
use promptweave_core::error::AnalyticsError;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use tokio::sync::RwLock;
use tracing::debug;

/// Minimum samples before a VPT confidence interval is reported.
const CONFIDENCE_MIN_SAMPLES: usize = 300;

#[derive(Debug, Clone, Copy)]
struct RewardSample {
    at: DateTime<Utc>,
    reward: f64,
}

#[derive(Debug, Clone, Copy)]
struct ModuleSample {
    at: DateTime<Utc>,
    ratio: f64,
}

/// Process-local analytics store.
pub struct InMemoryAnalytics {
    priors: StdRwLock<BanditPriors>,
    rewards: Arc<RwLock<HashMap<(String, String), Vec<RewardSample>>>>,
    modules: Arc<RwLock<HashMap<String, Vec<ModuleSample>>>>,
}

impl InMemoryAnalytics {
    pub fn new(priors: BanditPriors) -> Self {
        Self {
            priors: StdRwLock::new(priors),
            rewards: Arc::new(RwLock::new(HashMap::new())),
            modules: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn priors(&self) -> BanditPriors {
        *self.priors.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_priors(&self, priors: BanditPriors) {
        debug!(
            window_days = priors.window_days,
            alpha = priors.alpha_prior,
            beta = priors.beta_prior,
            "Bandit priors configured"
        );
        *self.priors.write().unwrap_or_else(PoisonError::into_inner) = priors;
    }

    fn window(&self) -> Duration {
        Duration::days(i64::from(self.priors().window_days.max(1)))
    }

    /// Record a reward observed at a specific time.
    pub async fn record_outcome_at(
        &self,
        family: &str,
        arm: &str,
        reward: f64,
        at: DateTime<Utc>,
    ) -> Result<(), AnalyticsError> {
        let (family, arm) = (family.trim(), arm.trim());
        if family.is_empty() || arm.is_empty() {
            return Err(AnalyticsError::InvalidOutcome {
                key: format!("{family}:{arm}"),
                reason: "family and arm must not be empty".into(),
            });
        }
        let reward = clamp_unit(reward);
        let cutoff = at - self.window();
        let mut rewards = self.rewards.write().await;
        let samples = rewards
            .entry((family.to_string(), arm.to_string()))
            .or_default();
        samples.push(RewardSample { at, reward });
        samples.retain(|s| s.at >= cutoff);
        debug!(family, arm, reward, samples = samples.len(), "Bandit outcome recorded");
        Ok(())
    }

    /// Posterior as of `now`.
    pub async fn posterior_at(&self, family: &str, arm: &str, now: DateTime<Utc>) -> BanditPosterior {
        let cutoff = now - self.window();
        let rewards = self.rewards.read().await;
        let Some(samples) = rewards.get(&(family.trim().to_string(), arm.trim().to_string())) else {
            return BanditPosterior::empty();
        };
        let live: Vec<f64> = samples
            .iter()
            .filter(|s| s.at >= cutoff)
            .map(|s| s.reward)
            .collect();
        if live.is_empty() {
            return BanditPosterior::empty();
        }
        let sum: f64 = live.iter().sum();
        let count = live.len() as f64;
        let priors = self.priors();
        BanditPosterior {
            alpha: priors.alpha_prior + sum,
            beta: priors.beta_prior + count - sum,
            count: live.len() as u64,
        }
    }

    pub async fn record_module_outcome_at(
        &self,
        module_id: &str,
        quality: f64,
        tokens: usize,
        at: DateTime<Utc>,
    ) -> Result<(), AnalyticsError> {
        let id = module_id.trim();
        if id.is_empty() {
            return Err(AnalyticsError::InvalidOutcome {
                key: module_id.to_string(),
                reason: "module id must not be empty".into(),
            });
        }
        if tokens == 0 {
            return Err(AnalyticsError::InvalidOutcome {
                key: id.to_string(),
                reason: "tokens must be > 0".into(),
            });
        }
        let quality = if quality.is_finite() { quality } else { 0.0 };
        let cutoff = at - self.window();
        let mut modules = self.modules.write().await;
        let samples = modules.entry(id.to_string()).or_default();
        samples.push(ModuleSample {
            at,
            ratio: quality / tokens as f64,
        });
        samples.retain(|s| s.at >= cutoff);
        Ok(())
    }

    pub async fn module_vpt_at(&self, module_id: &str, now: DateTime<Utc>) -> VptStats {
        let cutoff = now - self.window();
        let modules = self.modules.read().await;
        let ratios: Vec<f64> = modules
            .get(module_id.trim())
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.at >= cutoff)
                    .map(|s| s.ratio)
                    .collect()
            })
            .unwrap_or_default();
        vpt_stats(&ratios)
    }
}

impl Default for InMemoryAnalytics {
    fn default() -> Self {
        Self::new(BanditPriors::default())
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

fn vpt_stats(ratios: &[f64]) -> VptStats {
    if ratios.is_empty() {
        return VptStats::default();
    }
    let n = ratios.len() as f64;
    let mean = ratios.iter().sum::<f64>() / n;
    if !mean.is_finite() {
        return VptStats::default();
    }
    let vpt_ci = if ratios.len() >= CONFIDENCE_MIN_SAMPLES {
        let variance = ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let standard_error = variance.max(0.0).sqrt() / n.sqrt();
        standard_error
            .is_finite()
            .then(|| round6(1.96 * standard_error))
    } else {
        None
    };
    VptStats {
        vpt_mean: round6(mean),
        vpt_ci,
    }
}

#[async_trait]
impl PosteriorStore for InMemoryAnalytics {
    async fn get_posterior(&self, family: &str, arm: &str) -> BanditPosterior {
        self.posterior_at(family, arm, Utc::now()).await
    }

    fn configure_priors(&self, priors: BanditPriors) {
        self.set_priors(priors);
    }

    async fn record_outcome(&self, family: &str, arm: &str, reward: f64) -> Result<(), AnalyticsError> {
        self.record_outcome_at(family, arm, reward, Utc::now()).await
    }
}

#[async_trait]
impl VptStore for InMemoryAnalytics {
    async fn get_module_vpt(&self, module_id: &str) -> VptStats {
        self.module_vpt_at(module_id, Utc::now()).await
    }

    async fn record_module_outcome(
        &self,
        module_id: &str,
        quality: f64,
        tokens: usize,
    ) -> Result<(), AnalyticsError> {
        self.record_module_outcome_at(module_id, quality, tokens, Utc::now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_posterior_for_unknown_arm() {
        let store = InMemoryAnalytics::default();
        assert_eq!(store.get_posterior("tone", "warm").await, BanditPosterior::empty());
    }

    #[tokio::test]
    async fn posterior_accumulates_rewards() {
        let store = InMemoryAnalytics::default();
        store.record_outcome("tone", "warm", 1.0).await.unwrap();
        store.record_outcome("tone", "warm", 0.0).await.unwrap();
        store.record_outcome("tone", "warm", 0.5).await.unwrap();
        let p = store.get_posterior("tone", "warm").await;
        assert_eq!(p.count, 3);
        assert!((p.alpha - 3.0).abs() < 1e-9);
        assert!((p.beta - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rewards_are_clamped() {
        let store = InMemoryAnalytics::default();
        store.record_outcome("f", "a", 7.0).await.unwrap();
        store.record_outcome("f", "a", -2.0).await.unwrap();
        let p = store.get_posterior("f", "a").await;
        assert!((p.alpha - 2.5).abs() < 1e-9);
        assert!((p.beta - 2.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn old_outcomes_fall_out_of_window() {
        let store = InMemoryAnalytics::default();
        let now = Utc::now();
        store
            .record_outcome_at("f", "a", 1.0, now - Duration::days(20))
            .await
            .unwrap();
        store.record_outcome_at("f", "a", 1.0, now).await.unwrap();
        let p = store.posterior_at("f", "a", now).await;
        assert_eq!(p.count, 1);
    }

    #[tokio::test]
    async fn empty_keys_rejected() {
        let store = InMemoryAnalytics::default();
        assert!(store.record_outcome(" ", "a", 1.0).await.is_err());
        assert!(store.record_module_outcome("", 1.0, 10).await.is_err());
        assert!(store.record_module_outcome("m", 1.0, 0).await.is_err());
    }

    #[tokio::test]
    async fn vpt_is_mean_ratio() {
        let store = InMemoryAnalytics::default();
        store.record_module_outcome("m", 1.0, 100).await.unwrap();
        store.record_module_outcome("m", 0.5, 100).await.unwrap();
        let stats = store.get_module_vpt("m").await;
        assert!((stats.vpt_mean - 0.0075).abs() < 1e-9);
        assert!(stats.vpt_ci.is_none());
        assert_eq!(store.get_module_vpt("other").await, VptStats::default());
    }

    #[tokio::test]
    async fn vpt_ci_after_enough_samples() {
        let store = InMemoryAnalytics::default();
        for i in 0..CONFIDENCE_MIN_SAMPLES {
            let q = if i % 2 == 0 { 1.0 } else { 0.0 };
            store.record_module_outcome("m", q, 100).await.unwrap();
        }
        let stats = store.get_module_vpt("m").await;
        assert!((stats.vpt_mean - 0.005).abs() < 1e-9);
        assert!(stats.vpt_ci.is_some_and(|ci| ci > 0.0));
    }
}

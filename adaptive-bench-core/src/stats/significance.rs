//! One-sample significance testing against a reference value.

use serde::Serialize;

use super::{mean, normal_cdf, std_dev, t_p_value, z_quantile};

/// Power a significant result must reach before it is trusted.
pub const TARGET_POWER: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignificanceResult {
    /// p below alpha, effect at least the minimum effect, and power at least [`TARGET_POWER`].
    pub is_significant: bool,
    pub p_value: f64,
    /// Cohen's d: `|mean - reference| / sd`.
    pub effect_size: f64,
    pub power: f64,
    pub t_statistic: f64,
    pub reference: f64,
    pub alpha: f64,
    pub sample_size: usize,
    /// Samples needed for [`TARGET_POWER`] at the observed effect.
    pub required_sample_size: Option<usize>,
    pub insufficient_data: bool,
}

#[derive(Debug, Clone)]
pub struct SignificanceDetector {
    pub alpha: f64,
    pub minimum_effect: f64,
    pub reference: f64,
}

impl SignificanceDetector {
    pub fn new(alpha: f64, minimum_effect: f64, reference: f64) -> Self {
        Self {
            alpha,
            minimum_effect,
            reference,
        }
    }

    pub fn test(&self, samples: &[f64]) -> SignificanceResult {
        let n = samples.len();
        if n < 2 {
            return SignificanceResult {
                is_significant: false,
                p_value: 1.0,
                effect_size: 0.0,
                power: 0.0,
                t_statistic: 0.0,
                reference: self.reference,
                alpha: self.alpha,
                sample_size: n,
                required_sample_size: None,
                insufficient_data: true,
            };
        }

        let m = mean(samples);
        let sd = std_dev(samples);
        let diff = (m - self.reference).abs();

        let (t_statistic, p_value, effect_size, power) = if sd == 0.0 {
            // Noise-free: any difference is certain, none is impossible to detect.
            if diff == 0.0 {
                (0.0, 1.0, 0.0, 0.0)
            } else {
                (f64::INFINITY, 0.0, f64::INFINITY, 1.0)
            }
        } else {
            let t = (m - self.reference) / (sd / (n as f64).sqrt());
            let d = diff / sd;
            (t, t_p_value(t, (n - 1) as f64), d, self.power(d, n))
        };

        SignificanceResult {
            is_significant: p_value < self.alpha
                && effect_size >= self.minimum_effect
                && power >= TARGET_POWER,
            p_value,
            effect_size,
            power,
            t_statistic,
            reference: self.reference,
            alpha: self.alpha,
            sample_size: n,
            required_sample_size: self.required_sample_size(effect_size),
            insufficient_data: false,
        }
    }

    /// Two-sided power of a z-test for standardized effect `d` at `n` samples.
    pub fn power(&self, d: f64, n: usize) -> f64 {
        let z_alpha = z_quantile(1.0 - self.alpha / 2.0);
        let shift = d * (n as f64).sqrt();
        (normal_cdf(shift - z_alpha) + normal_cdf(-shift - z_alpha)).clamp(0.0, 1.0)
    }

    fn required_sample_size(&self, effect_size: f64) -> Option<usize> {
        if effect_size.is_infinite() {
            return Some(2);
        }
        if effect_size <= 0.0 {
            return None;
        }
        let z_alpha = z_quantile(1.0 - self.alpha / 2.0);
        let z_beta = z_quantile(TARGET_POWER);
        let n = ((z_alpha + z_beta) / effect_size).powi(2).ceil();
        n.is_finite().then(|| (n as usize).max(2))
    }
}

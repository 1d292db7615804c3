// estimate.rs - pre-compression size prediction

use serde::{Deserialize, Serialize};

/// Named quality levels offered in the UI. The non-custom presets carry a
/// predetermined encoder quality; `Custom` uses the slider value directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    High,
    #[default]
    Medium,
    Low,
    Custom,
}

impl QualityPreset {
    /// Encoder quality passed along with a compression request.
    pub fn quality_value(&self, custom: u8) -> u8 {
        match self {
            Self::High => 85,
            Self::Medium => 65,
            Self::Low => 40,
            Self::Custom => custom,
        }
    }

    fn factor(&self, quality: u8) -> f64 {
        match self {
            Self::High => 0.70,
            Self::Medium => 0.45,
            Self::Low => 0.25,
            // 0.16 at quality 10, 0.70 at quality 100
            Self::Custom => 0.1 + (quality as f64 / 100.0) * 0.6,
        }
    }
}

/// Cheap size prediction: a fixed multiplier on the raw byte size, rounded to
/// the nearest byte. No pixel data is inspected and no accuracy is promised;
/// this exists purely for feedback before a batch runs. The measured result
/// always replaces it.
pub fn estimate(source_bytes: u64, preset: QualityPreset, quality: u8) -> u64 {
    (source_bytes as f64 * preset.factor(quality)).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_presets_use_fixed_factors() {
        assert_eq!(estimate(1_000_000, QualityPreset::High, 80), 700_000);
        assert_eq!(estimate(1_000_000, QualityPreset::Medium, 80), 450_000);
        assert_eq!(estimate(1_000_000, QualityPreset::Low, 80), 250_000);
        assert_eq!(estimate(0, QualityPreset::High, 80), 0);
    }

    #[test]
    fn custom_endpoints_match_documented_range() {
        assert_eq!(estimate(1_000_000, QualityPreset::Custom, 10), 160_000);
        assert_eq!(estimate(1_000_000, QualityPreset::Custom, 100), 700_000);
    }

    #[test]
    fn custom_factor_is_monotonic_in_quality() {
        let mut previous = 0;
        for quality in 10..=100 {
            let predicted = estimate(1_000_000, QualityPreset::Custom, quality);
            assert!(predicted >= previous, "estimate dropped at quality {}", quality);
            previous = predicted;
        }
    }

    #[test]
    fn estimator_is_pure() {
        let first = estimate(123_456, QualityPreset::Custom, 42);
        let second = estimate(123_456, QualityPreset::Custom, 42);
        assert_eq!(first, second);
    }

    #[test]
    fn preset_switch_scenario() {
        // 1 MB file: medium predicts 450 KB, custom at 55 predicts 430 KB.
        assert_eq!(estimate(1_000_000, QualityPreset::Medium, 80), 450_000);
        assert_eq!(estimate(1_000_000, QualityPreset::Custom, 55), 430_000);
    }

    #[test]
    fn presets_map_to_predetermined_qualities() {
        assert_eq!(QualityPreset::High.quality_value(55), 85);
        assert_eq!(QualityPreset::Medium.quality_value(55), 65);
        assert_eq!(QualityPreset::Low.quality_value(55), 40);
        assert_eq!(QualityPreset::Custom.quality_value(55), 55);
    }
}

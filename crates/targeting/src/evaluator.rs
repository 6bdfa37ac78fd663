//! Pure scoring of targeting criteria against request context.
//!
//! Each sub-dimension (geography, device, interests, demographics,
//! behavior) yields a score in [0, 1]; the final score is the arithmetic
//! mean of the dimensions that were evaluable on both sides. Dimensions
//! absent on either side are skipped, not penalized. Hard (required)
//! constraints are probed separately by the eligibility filter via
//! [`TargetingEvaluator::hard_conflict`].

use adserve_core::config::TargetingConfig;
use adserve_core::types::{DeviceType, RequestContext, TargetingCriteria};
use serde::Serialize;
use std::collections::HashSet;

/// Outcome of scoring one ad's criteria against one request.
#[derive(Debug, Clone, Serialize)]
pub struct TargetingEvaluation {
    /// False only when a required geo/device constraint conflicts with
    /// known context.
    pub matches: bool,
    pub score: f64,
    pub breakdown: TargetingBreakdown,
    pub reasons: Vec<String>,
}

/// Per-dimension sub-scores; `None` means the dimension was not evaluable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetingBreakdown {
    pub geo: Option<f64>,
    pub device: Option<f64>,
    pub interests: Option<f64>,
    pub demographics: Option<f64>,
    pub behaviors: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TargetingEvaluator {
    config: TargetingConfig,
}

impl TargetingEvaluator {
    pub fn new(config: TargetingConfig) -> Self {
        Self { config }
    }

    /// Score `criteria` against `context`. Pure; malformed or absent input
    /// on either side is treated as "no constraint", never an error.
    pub fn score(
        &self,
        criteria: &TargetingCriteria,
        context: &RequestContext,
    ) -> TargetingEvaluation {
        let mut breakdown = TargetingBreakdown::default();
        let mut reasons = Vec::new();

        breakdown.geo = self.score_geo(criteria, context, &mut reasons);
        breakdown.device = self.score_device(criteria, context, &mut reasons);
        breakdown.interests = Self::score_overlap(
            criteria.interests.as_deref(),
            &context.interests,
            "interests",
            &mut reasons,
        );
        breakdown.demographics = self.score_demographics(criteria, context, &mut reasons);
        breakdown.behaviors = Self::score_overlap(
            criteria.behaviors.as_deref(),
            &context.behaviors,
            "behaviors",
            &mut reasons,
        );

        let evaluated: Vec<f64> = [
            breakdown.geo,
            breakdown.device,
            breakdown.interests,
            breakdown.demographics,
            breakdown.behaviors,
        ]
        .into_iter()
        .flatten()
        .collect();

        let score = if evaluated.is_empty() {
            reasons.push("no dimension evaluable, neutral default".to_string());
            self.config.neutral_score
        } else {
            evaluated.iter().sum::<f64>() / evaluated.len() as f64
        };

        TargetingEvaluation {
            matches: self.hard_conflict(criteria, context).is_none(),
            score,
            breakdown,
            reasons,
        }
    }

    /// Returns the reason an ad is outright ineligible for this context,
    /// if any. Only `required` geo/device constraints with a *known*
    /// conflicting context value exclude; unknown context never does.
    pub fn hard_conflict(
        &self,
        criteria: &TargetingCriteria,
        context: &RequestContext,
    ) -> Option<String> {
        if let Some(geo) = &criteria.geo {
            if geo.required && !geo.countries.is_empty() {
                if let Some(country) = context.geo.as_ref().and_then(|g| g.country.as_deref()) {
                    if !contains_ignore_case(&geo.countries, country) {
                        return Some(format!("required geo excludes country {country}"));
                    }
                }
            }
        }
        if let Some(device) = &criteria.device {
            if device.required && !device.device_types.is_empty() {
                if let Some(device_type) = context.device {
                    if !device.device_types.contains(&device_type) {
                        return Some(format!("required device excludes {device_type:?}"));
                    }
                }
            }
        }
        None
    }

    fn score_geo(
        &self,
        criteria: &TargetingCriteria,
        context: &RequestContext,
        reasons: &mut Vec<String>,
    ) -> Option<f64> {
        let geo = criteria.geo.as_ref()?;
        if geo.countries.is_empty() && geo.regions.is_empty() {
            return None;
        }
        let ctx_geo = context.geo.as_ref()?;
        let country = ctx_geo.country.as_deref()?;

        let score = if contains_ignore_case(&geo.countries, country) {
            match (geo.regions.is_empty(), ctx_geo.region.as_deref()) {
                // Region-level targeting with a known region: exact or broader.
                (false, Some(region)) => {
                    if contains_ignore_case(&geo.regions, region) {
                        reasons.push(format!("geo: exact match {country}/{region}"));
                        1.0
                    } else {
                        reasons.push(format!("geo: country match {country}"));
                        self.config.partial_match_score
                    }
                }
                _ => {
                    reasons.push(format!("geo: country match {country}"));
                    1.0
                }
            }
        } else {
            reasons.push(format!("geo: no overlap with {country}"));
            self.config.mismatch_floor
        };
        Some(score)
    }

    fn score_device(
        &self,
        criteria: &TargetingCriteria,
        context: &RequestContext,
        reasons: &mut Vec<String>,
    ) -> Option<f64> {
        let device = criteria.device.as_ref()?;
        if device.device_types.is_empty() {
            return None;
        }
        let ctx_device = context.device?;

        let score = if device.device_types.contains(&ctx_device) {
            reasons.push(format!("device: exact match {ctx_device:?}"));
            1.0
        } else if is_handheld(ctx_device) && device.device_types.iter().copied().any(is_handheld) {
            reasons.push("device: handheld category match".to_string());
            self.config.partial_match_score
        } else {
            reasons.push(format!("device: no overlap with {ctx_device:?}"));
            self.config.mismatch_floor
        };
        Some(score)
    }

    fn score_demographics(
        &self,
        criteria: &TargetingCriteria,
        context: &RequestContext,
        reasons: &mut Vec<String>,
    ) -> Option<f64> {
        let demo = criteria.demographics.as_ref()?;
        let ctx_demo = context.demographics.as_ref()?;

        let mut signals = Vec::new();
        if demo.age_min.is_some() || demo.age_max.is_some() {
            if let Some(age) = ctx_demo.age {
                let in_range = demo.age_min.map_or(true, |min| age >= min)
                    && demo.age_max.map_or(true, |max| age <= max);
                signals.push(if in_range { 1.0 } else { self.config.mismatch_floor });
            }
        }
        if !demo.genders.is_empty() {
            if let Some(gender) = ctx_demo.gender.as_deref() {
                signals.push(if contains_ignore_case(&demo.genders, gender) {
                    1.0
                } else {
                    self.config.mismatch_floor
                });
            }
        }

        if signals.is_empty() {
            return None;
        }
        let score = signals.iter().sum::<f64>() / signals.len() as f64;
        reasons.push(format!("demographics: {score:.2}"));
        Some(score)
    }

    /// Overlap ratio |A ∩ B| / max(|A|, |B|) for set-valued dimensions.
    fn score_overlap(
        declared: Option<&[String]>,
        observed: &[String],
        label: &str,
        reasons: &mut Vec<String>,
    ) -> Option<f64> {
        let declared = declared?;
        if declared.is_empty() || observed.is_empty() {
            return None;
        }
        let a: HashSet<String> = declared.iter().map(|s| s.to_ascii_lowercase()).collect();
        let b: HashSet<String> = observed.iter().map(|s| s.to_ascii_lowercase()).collect();
        let intersection = a.intersection(&b).count();
        let score = intersection as f64 / a.len().max(b.len()) as f64;
        reasons.push(format!("{label}: {intersection} shared"));
        Some(score)
    }
}

fn is_handheld(device: DeviceType) -> bool {
    matches!(device, DeviceType::Mobile | DeviceType::Tablet)
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|s| s.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adserve_core::types::{
        Demographics, DemographicTargeting, DeviceTargeting, GeoContext, GeoTargeting,
    };

    fn evaluator() -> TargetingEvaluator {
        TargetingEvaluator::new(TargetingConfig::default())
    }

    fn context_us_mobile() -> RequestContext {
        RequestContext {
            user_id: Some("user-1".to_string()),
            geo: Some(GeoContext {
                country: Some("US".to_string()),
                region: Some("CA".to_string()),
                city: Some("San Francisco".to_string()),
            }),
            device: Some(DeviceType::Mobile),
            interests: vec!["tech".to_string(), "gaming".to_string()],
            demographics: Some(Demographics {
                age: Some(30),
                gender: Some("female".to_string()),
            }),
            behaviors: vec![],
            attributes: Default::default(),
        }
    }

    fn geo_criteria(countries: &[&str], regions: &[&str]) -> TargetingCriteria {
        TargetingCriteria {
            geo: Some(GeoTargeting {
                countries: countries.iter().map(|s| s.to_string()).collect(),
                regions: regions.iter().map(|s| s.to_string()).collect(),
                required: false,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_geo_exact_match_scores_full() {
        let eval = evaluator().score(&geo_criteria(&["US"], &["CA"]), &context_us_mobile());
        assert_eq!(eval.breakdown.geo, Some(1.0));
        assert!(eval.matches);
    }

    #[test]
    fn test_geo_country_only_scores_partial() {
        let eval = evaluator().score(&geo_criteria(&["US"], &["NY"]), &context_us_mobile());
        assert_eq!(eval.breakdown.geo, Some(0.8));
    }

    #[test]
    fn test_geo_mismatch_scores_floor_not_zero() {
        let eval = evaluator().score(&geo_criteria(&["DE"], &[]), &context_us_mobile());
        assert_eq!(eval.breakdown.geo, Some(0.3));
        // Soft mismatch still matches; only hard constraints exclude.
        assert!(eval.matches);
    }

    #[test]
    fn test_geo_skipped_when_context_unknown() {
        let mut ctx = context_us_mobile();
        ctx.geo = None;
        let eval = evaluator().score(&geo_criteria(&["US"], &[]), &ctx);
        assert!(eval.breakdown.geo.is_none());
    }

    #[test]
    fn test_device_handheld_category_partial() {
        let criteria = TargetingCriteria {
            device: Some(DeviceTargeting {
                device_types: vec![DeviceType::Tablet],
                required: false,
            }),
            ..Default::default()
        };
        let eval = evaluator().score(&criteria, &context_us_mobile());
        assert_eq!(eval.breakdown.device, Some(0.8));
    }

    #[test]
    fn test_interest_overlap_ratio() {
        let criteria = TargetingCriteria {
            interests: Some(vec![
                "tech".to_string(),
                "cooking".to_string(),
                "travel".to_string(),
            ]),
            ..Default::default()
        };
        let eval = evaluator().score(&criteria, &context_us_mobile());
        // 1 shared / max(3, 2)
        assert!((eval.breakdown.interests.unwrap() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_evaluable_dimension_is_neutral() {
        let eval = evaluator().score(&TargetingCriteria::default(), &RequestContext::default());
        assert_eq!(eval.score, 0.5);
        assert!(eval.matches);
    }

    #[test]
    fn test_final_score_is_mean_of_evaluated() {
        let criteria = TargetingCriteria {
            geo: Some(GeoTargeting {
                countries: vec!["US".to_string()],
                regions: vec![],
                required: false,
            }),
            interests: Some(vec!["tech".to_string(), "gaming".to_string()]),
            ..Default::default()
        };
        let eval = evaluator().score(&criteria, &context_us_mobile());
        // geo 1.0 and interests 1.0; device/demographics/behaviors skipped
        // because the criteria declare nothing for them.
        assert_eq!(eval.breakdown.device, None);
        assert!((eval.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_demographics_age_and_gender() {
        let criteria = TargetingCriteria {
            demographics: Some(DemographicTargeting {
                age_min: Some(25),
                age_max: Some(40),
                genders: vec!["male".to_string()],
            }),
            ..Default::default()
        };
        let eval = evaluator().score(&criteria, &context_us_mobile());
        // Age in range (1.0), gender mismatch (0.3) -> 0.65.
        assert!((eval.breakdown.demographics.unwrap() - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_required_geo_conflict_is_hard() {
        let mut criteria = geo_criteria(&["DE"], &[]);
        criteria.geo.as_mut().unwrap().required = true;
        let eval = evaluator().score(&criteria, &context_us_mobile());
        assert!(!eval.matches);
        assert!(evaluator()
            .hard_conflict(&criteria, &context_us_mobile())
            .is_some());
    }

    #[test]
    fn test_required_geo_with_unknown_context_not_excluded() {
        let mut criteria = geo_criteria(&["DE"], &[]);
        criteria.geo.as_mut().unwrap().required = true;
        let mut ctx = context_us_mobile();
        ctx.geo = None;
        assert!(evaluator().hard_conflict(&criteria, &ctx).is_none());
    }
}

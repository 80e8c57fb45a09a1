//! Business adjustment days
//!
//! How far the harvest date sits from what the baseline growth period
//! predicts. The harvest date comes from the first available source: the
//! actual harvest, the planned harvest, or the Wednesday of the target ISO
//! week in the transplant year.

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::trace;

/// Inputs to the adjustment cascade
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdjustmentInputs {
    pub transplant: Option<NaiveDate>,
    pub baseline_days: Option<f64>,
    pub actual_harvest: Option<NaiveDate>,
    pub planned_harvest: Option<NaiveDate>,
    pub target_week: Option<u32>,
}

type HarvestProvider<'a> = Box<dyn Fn() -> Option<NaiveDate> + 'a>;

/// `(harvest - transplant).days - baseline`, undefined without a transplant
/// date, a positive baseline or any harvest source
pub fn business_adjustment_days(inputs: &AdjustmentInputs) -> Option<f64> {
    let transplant = inputs.transplant?;
    let baseline = inputs.baseline_days.filter(|b| *b > 0.0)?;

    let providers: [(&str, HarvestProvider<'_>); 3] = [
        ("actual", Box::new(|| inputs.actual_harvest)),
        ("planned", Box::new(|| inputs.planned_harvest)),
        (
            "calendar_week",
            Box::new(move || iso_week_wednesday(transplant.year(), inputs.target_week?)),
        ),
    ];

    providers.into_iter().find_map(|(source, provider)| {
        let harvest = provider()?;
        trace!(source = source, harvest = %harvest, "Business adjustment harvest date");
        Some((harvest - transplant).num_days() as f64 - baseline)
    })
}

/// Wednesday of ISO week `week` in `year`, if that week exists
pub fn iso_week_wednesday(year: i32, week: u32) -> Option<NaiveDate> {
    NaiveDate::from_isoywd_opt(year, week, Weekday::Wed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn inputs() -> AdjustmentInputs {
        AdjustmentInputs {
            transplant: date(2025, 7, 1),
            baseline_days: Some(50.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_actual_wins() {
        let adj = AdjustmentInputs {
            actual_harvest: date(2025, 8, 25),
            planned_harvest: date(2025, 9, 30),
            target_week: Some(40),
            ..inputs()
        };
        assert_eq!(business_adjustment_days(&adj), Some(5.0));
    }

    #[test]
    fn test_planned_before_week() {
        let adj = AdjustmentInputs {
            planned_harvest: date(2025, 8, 15),
            target_week: Some(40),
            ..inputs()
        };
        assert_eq!(business_adjustment_days(&adj), Some(-5.0));
    }

    #[test]
    fn test_calendar_week_uses_wednesday() {
        // ISO week 35 of 2025 runs Aug 25 to Aug 31
        assert_eq!(iso_week_wednesday(2025, 35), date(2025, 8, 27));
        let adj = AdjustmentInputs {
            target_week: Some(35),
            ..inputs()
        };
        assert_eq!(business_adjustment_days(&adj), Some(7.0));
    }

    #[test]
    fn test_invalid_week_is_undefined() {
        // 2025 has 52 ISO weeks
        assert!(iso_week_wednesday(2025, 53).is_none());
        let adj = AdjustmentInputs {
            target_week: Some(53),
            ..inputs()
        };
        assert_eq!(business_adjustment_days(&adj), None);
    }

    #[test]
    fn test_requires_transplant_and_positive_baseline() {
        let base = AdjustmentInputs {
            actual_harvest: date(2025, 8, 25),
            ..inputs()
        };
        let no_transplant = AdjustmentInputs {
            transplant: None,
            ..base
        };
        assert_eq!(business_adjustment_days(&no_transplant), None);

        let zero_baseline = AdjustmentInputs {
            baseline_days: Some(0.0),
            ..base
        };
        assert_eq!(business_adjustment_days(&zero_baseline), None);

        let no_baseline = AdjustmentInputs {
            baseline_days: None,
            ..base
        };
        assert_eq!(business_adjustment_days(&no_baseline), None);
    }

    #[test]
    fn test_no_harvest_source() {
        assert_eq!(business_adjustment_days(&inputs()), None);
    }

    #[test]
    fn test_fractional_baseline() {
        let adj = AdjustmentInputs {
            baseline_days: Some(52.5),
            actual_harvest: date(2025, 8, 25),
            ..inputs()
        };
        assert_eq!(business_adjustment_days(&adj), Some(2.5));
    }
}

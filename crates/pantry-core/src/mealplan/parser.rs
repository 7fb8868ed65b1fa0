//! Meal-plan TOML parser with validation.
//!
//! Validates:
//! - The plan has at least one event and a household.
//! - Every event starts before it ends and has at least one option.
//! - Events do not overlap.
//! - Option scales are finite and positive.
//! - No meal is offered twice for the same event.

use std::collections::HashSet;

use thiserror::Error;

use super::toml_format::MealPlanToml;
use crate::quantity::ScaleFactor;

#[derive(Debug, Error)]
pub enum MealPlanParseError {
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("meal plan must name a household")]
    NoHousehold,

    #[error("meal plan must contain at least one event")]
    NoEvents,

    #[error("event #{0} must start before it ends")]
    EmptyWindow(usize),

    #[error("event #{0} has no options")]
    NoOptions(usize),

    #[error("events #{0} and #{1} overlap")]
    Overlap(usize, usize),

    #[error("option #{option} of event #{event} has invalid scale {scale}")]
    InvalidScale { event: usize, option: usize, scale: f64 },

    #[error("event #{event} offers meal {meal:?} more than once")]
    DuplicateMeal { event: usize, meal: String },
}

/// Parse and validate a meal-plan TOML string.
pub fn parse_meal_plan_toml(content: &str) -> Result<MealPlanToml, MealPlanParseError> {
    let plan: MealPlanToml = toml::from_str(content)?;
    validate(&plan)?;
    Ok(plan)
}

fn validate(plan: &MealPlanToml) -> Result<(), MealPlanParseError> {
    if plan.plan.household.trim().is_empty() {
        return Err(MealPlanParseError::NoHousehold);
    }
    if plan.events.is_empty() {
        return Err(MealPlanParseError::NoEvents);
    }

    for (i, event) in plan.events.iter().enumerate() {
        let number = i + 1;
        if event.starts_at >= event.ends_at {
            return Err(MealPlanParseError::EmptyWindow(number));
        }
        if event.options.is_empty() {
            return Err(MealPlanParseError::NoOptions(number));
        }
        let mut meals = HashSet::new();
        for (j, option) in event.options.iter().enumerate() {
            if ScaleFactor::new(option.scale).is_err() {
                return Err(MealPlanParseError::InvalidScale {
                    event: number,
                    option: j + 1,
                    scale: option.scale,
                });
            }
            if !meals.insert(option.meal.as_str()) {
                return Err(MealPlanParseError::DuplicateMeal {
                    event: number,
                    meal: option.meal.clone(),
                });
            }
        }
    }

    // Sort by start; any overlap shows up between neighbours.
    let mut windows: Vec<(usize, _, _)> = plan
        .events
        .iter()
        .enumerate()
        .map(|(i, e)| (i + 1, e.starts_at, e.ends_at))
        .collect();
    windows.sort_by_key(|(_, starts, _)| *starts);
    for pair in windows.windows(2) {
        let (a, _, a_ends) = pair[0];
        let (b, b_starts, _) = pair[1];
        if b_starts < a_ends {
            return Err(MealPlanParseError::Overlap(a.min(b), a.max(b)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
[plan]
household = "h1"
voting_deadline = "2026-10-20T18:00:00Z"

[[events]]
meal_name = "lunch"
starts_at = "2026-10-21T12:00:00Z"
ends_at = "2026-10-21T13:00:00Z"

[[events.options]]
meal = "m1"

[[events.options]]
meal = "m2"
scale = 2.0

[[events]]
meal_name = "dinner"
starts_at = "2026-10-21T18:00:00Z"
ends_at = "2026-10-21T19:30:00Z"

[[events.options]]
meal = "m1"
"#;

    #[test]
    fn parse_valid_plan() {
        let plan = parse_meal_plan_toml(PLAN).expect("should parse");
        assert_eq!(plan.events.len(), 2);
        assert_eq!(plan.events[0].options[1].scale, 2.0);
    }

    #[test]
    fn reject_empty_window() {
        let content = PLAN.replace("ends_at = \"2026-10-21T13:00:00Z\"", "ends_at = \"2026-10-21T12:00:00Z\"");
        let err = parse_meal_plan_toml(&content).unwrap_err();
        assert!(matches!(err, MealPlanParseError::EmptyWindow(1)));
    }

    #[test]
    fn reject_overlap() {
        let content = PLAN.replace("ends_at = \"2026-10-21T13:00:00Z\"", "ends_at = \"2026-10-21T18:30:00Z\"");
        let err = parse_meal_plan_toml(&content).unwrap_err();
        assert!(matches!(err, MealPlanParseError::Overlap(1, 2)));
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        let content = PLAN.replace("ends_at = \"2026-10-21T13:00:00Z\"", "ends_at = \"2026-10-21T18:00:00Z\"");
        assert!(parse_meal_plan_toml(&content).is_ok());
    }

    #[test]
    fn reject_non_positive_scale() {
        let content = PLAN.replace("scale = 2.0", "scale = 0.0");
        let err = parse_meal_plan_toml(&content).unwrap_err();
        assert!(matches!(err, MealPlanParseError::InvalidScale { event: 1, option: 2, .. }));
    }

    #[test]
    fn reject_duplicate_meal() {
        let content = PLAN.replace("meal = \"m2\"", "meal = \"m1\"");
        let err = parse_meal_plan_toml(&content).unwrap_err();
        assert!(matches!(err, MealPlanParseError::DuplicateMeal { event: 1, .. }));
    }

    #[test]
    fn reject_no_events() {
        let content = "[plan]\nhousehold = \"h1\"\nvoting_deadline = \"2026-10-20T18:00:00Z\"\n";
        let err = parse_meal_plan_toml(content).unwrap_err();
        assert!(matches!(err, MealPlanParseError::NoEvents));
    }
}

//! Grocery list aggregation across the chosen meals of a plan.
//!
//! Walks events by start time, then each chosen meal's recipes by position,
//! their steps by index, and each step's ingredient uses by position. Uses
//! that only consume a product of an earlier step are not bought and are
//! skipped.
//!
//! Line items are keyed by (ingredient, unit). The first contribution to a
//! key is scaled by `recipe_scale * meal_scale`; later contributions to the
//! same key are merged in unscaled. Units are never converted: an
//! ingredient measured in two units yields two line items and a recorded
//! [`UnitMismatch`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use pantry_db::models::GroceryListItemStatus;

use crate::error::{PlanError, PlanResult};
use crate::mealplan::ChosenMeal;
use crate::quantity::{Measured, QuantityRange, ScaleFactor};

pub const SATURATED_EXPLANATION: &str = "quantity exceeds the largest representable amount";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryLine {
    pub ingredient_id: String,
    pub ingredient_name: String,
    pub measurement_unit_id: String,
    pub quantity: QuantityRange,
    pub status: GroceryListItemStatus,
    pub status_explanation: String,
}

/// An ingredient that showed up under a second unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMismatch {
    pub ingredient_id: String,
    pub existing_unit_id: String,
    pub unit_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroceryAggregation {
    /// Sorted by (ingredient id, unit id).
    pub items: Vec<GroceryLine>,
    pub unit_mismatches: Vec<UnitMismatch>,
}

/// Fold every chosen meal's ingredients into line items.
///
/// Fails only on an invalid scale factor.
pub fn aggregate(meals: &[ChosenMeal]) -> PlanResult<GroceryAggregation> {
    let mut ordered: Vec<&ChosenMeal> = meals.iter().collect();
    ordered.sort_by(|a, b| (a.starts_at, &a.event_id).cmp(&(b.starts_at, &b.event_id)));

    let mut items: BTreeMap<(String, String), (String, Measured)> = BTreeMap::new();
    let mut first_unit: HashMap<String, String> = HashMap::new();
    let mut unit_mismatches = Vec::new();

    for meal in ordered {
        let meal_scale = ScaleFactor::new(meal.meal_scale)?;
        for component in &meal.recipes {
            let factor = ScaleFactor::new(component.recipe_scale)?.compose(meal_scale)?;

            let mut steps: Vec<_> = component.recipe.steps.iter().collect();
            steps.sort_by_key(|s| s.index);

            for step in steps {
                for use_ in &step.ingredients {
                    let Some(ingredient) = &use_.ingredient else {
                        continue;
                    };
                    let key = (ingredient.id.clone(), use_.measurement_unit_id.clone());
                    let contribution = Measured::new(&use_.measurement_unit_id, use_.quantity);

                    if let Some((_, existing)) = items.get_mut(&key) {
                        *existing = existing.merge(&contribution)?;
                        continue;
                    }

                    match first_unit.get(&ingredient.id) {
                        Some(unit) if *unit != use_.measurement_unit_id => {
                            let err = PlanError::UnitMismatch {
                                left: unit.clone(),
                                right: use_.measurement_unit_id.clone(),
                            };
                            tracing::warn!(
                                ingredient_id = %ingredient.id,
                                recipe_id = %component.recipe.id,
                                error = %err,
                                "ingredient needed in more than one unit, keeping separate line items"
                            );
                            unit_mismatches.push(UnitMismatch {
                                ingredient_id: ingredient.id.clone(),
                                existing_unit_id: unit.clone(),
                                unit_id: use_.measurement_unit_id.clone(),
                            });
                        }
                        Some(_) => {}
                        None => {
                            first_unit
                                .insert(ingredient.id.clone(), use_.measurement_unit_id.clone());
                        }
                    }

                    let scaled = Measured::new(&use_.measurement_unit_id, use_.quantity.scale(factor));
                    items.insert(key, (ingredient.name.clone(), scaled));
                }
            }
        }
    }

    let items = items
        .into_iter()
        .map(|((ingredient_id, measurement_unit_id), (ingredient_name, measured))| {
            let (status, status_explanation) = if measured.range.is_saturated() {
                tracing::warn!(
                    ingredient_id = %ingredient_id,
                    unit_id = %measured.unit_id,
                    "grocery quantity saturated"
                );
                (GroceryListItemStatus::Unavailable, SATURATED_EXPLANATION.to_owned())
            } else {
                (GroceryListItemStatus::Needs, String::new())
            };
            GroceryLine {
                ingredient_id,
                ingredient_name,
                measurement_unit_id,
                quantity: measured.range,
                status,
                status_explanation,
            }
        })
        .collect();

    Ok(GroceryAggregation {
        items,
        unit_mismatches,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::mealplan::MealRecipe;
    use crate::quantity::Quantity;
    use crate::recipe::fixtures::{ingredient_use, product_use, recipe, step};
    use crate::recipe::Recipe;

    fn meal(event: &str, hour: u32, meal_scale: f64, recipes: Vec<(f64, Recipe)>) -> ChosenMeal {
        ChosenMeal {
            event_id: event.into(),
            starts_at: Utc.with_ymd_and_hms(2026, 10, 21, hour, 0, 0).unwrap(),
            option_id: format!("{event}-opt"),
            meal_id: format!("{event}-meal"),
            meal_scale,
            recipes: recipes
                .into_iter()
                .map(|(recipe_scale, recipe)| MealRecipe {
                    recipe_scale,
                    recipe,
                })
                .collect(),
        }
    }

    fn flour_recipe(id: &str, unit: &str, hundredths: u32) -> Recipe {
        let mut s = step(0);
        s.ingredients.push(ingredient_use("u1", "flour", unit, hundredths));
        recipe(id, vec![s])
    }

    #[test]
    fn single_recipe_scaled_by_both_factors() {
        let meals = vec![meal("e1", 12, 1.5, vec![(2.0, flour_recipe("r1", "gram", 10_000))])];
        let result = aggregate(&meals).unwrap();

        assert_eq!(result.items.len(), 1);
        let line = &result.items[0];
        assert_eq!(line.ingredient_id, "flour");
        assert_eq!(line.measurement_unit_id, "gram");
        assert_eq!(line.quantity, QuantityRange::exact(Quantity::from_units(300)));
        assert_eq!(line.quantity.min.to_string(), "300.00");
        assert_eq!(line.status, GroceryListItemStatus::Needs);
        assert!(result.unit_mismatches.is_empty());
    }

    #[test]
    fn later_contributions_merge_unscaled() {
        let meals = vec![
            meal("e1", 12, 2.0, vec![(1.0, flour_recipe("r1", "gram", 10_000))]),
            meal("e2", 18, 3.0, vec![(1.0, flour_recipe("r2", "gram", 5_000))]),
        ];
        let result = aggregate(&meals).unwrap();
        assert_eq!(result.items.len(), 1);
        // 100 * 2 scaled, then 50 unscaled.
        assert_eq!(result.items[0].quantity.min, Quantity::from_units(250));
    }

    #[test]
    fn events_are_walked_by_start_time() {
        // Given out of order, the 12:00 event still contributes first.
        let meals = vec![
            meal("e2", 18, 3.0, vec![(1.0, flour_recipe("r2", "gram", 5_000))]),
            meal("e1", 12, 2.0, vec![(1.0, flour_recipe("r1", "gram", 10_000))]),
        ];
        let result = aggregate(&meals).unwrap();
        assert_eq!(result.items[0].quantity.min, Quantity::from_units(250));
    }

    #[test]
    fn different_units_are_never_summed() {
        let meals = vec![meal(
            "e1",
            12,
            1.0,
            vec![
                (1.0, flour_recipe("r1", "gram", 10_000)),
                (1.0, flour_recipe("r2", "ounce", 400)),
            ],
        )];
        let result = aggregate(&meals).unwrap();

        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].measurement_unit_id, "gram");
        assert_eq!(result.items[0].quantity.min, Quantity::from_units(100));
        assert_eq!(result.items[1].measurement_unit_id, "ounce");
        assert_eq!(result.items[1].quantity.min, Quantity::from_units(4));
        assert_eq!(
            result.unit_mismatches,
            vec![UnitMismatch {
                ingredient_id: "flour".into(),
                existing_unit_id: "gram".into(),
                unit_id: "ounce".into(),
            }]
        );
    }

    #[test]
    fn product_only_uses_are_not_bought() {
        let mut s1 = step(0);
        s1.ingredients.push(ingredient_use("u1", "flour", "gram", 10_000));
        s1.products.push(crate::recipe::fixtures::product("dough"));
        let mut s2 = step(1);
        s2.ingredients.push(product_use("u2", "dough"));

        let meals = vec![meal("e1", 12, 1.0, vec![(1.0, recipe("r", vec![s1, s2]))])];
        let result = aggregate(&meals).unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].ingredient_id, "flour");
    }

    #[test]
    fn maxima_combine_when_merging() {
        let mut s = step(0);
        let mut ranged = ingredient_use("u1", "salt", "gram", 500);
        ranged.quantity = QuantityRange::between(Quantity::from_units(5), Quantity::from_units(10));
        s.ingredients.push(ranged);
        s.ingredients.push(ingredient_use("u2", "salt", "gram", 300));

        let meals = vec![meal("e1", 12, 1.0, vec![(1.0, recipe("r", vec![s]))])];
        let result = aggregate(&meals).unwrap();
        assert_eq!(
            result.items[0].quantity,
            QuantityRange::between(Quantity::from_units(8), Quantity::from_units(10))
        );
    }

    #[test]
    fn saturated_quantities_are_unavailable() {
        let meals = vec![meal("e1", 12, 1000.0, vec![(1000.0, flour_recipe("r1", "gram", 10_000))])];
        let result = aggregate(&meals).unwrap();
        assert_eq!(result.items[0].quantity.min, Quantity::MAX);
        assert_eq!(result.items[0].status, GroceryListItemStatus::Unavailable);
        assert_eq!(result.items[0].status_explanation, SATURATED_EXPLANATION);
    }

    #[test]
    fn invalid_scale_fails() {
        let meals = vec![meal("e1", 12, 0.0, vec![(1.0, flour_recipe("r1", "gram", 100))])];
        assert!(matches!(aggregate(&meals), Err(PlanError::InvalidScale(_))));
    }

    #[test]
    fn output_sorted_by_ingredient_then_unit() {
        let mut s = step(0);
        s.ingredients.push(ingredient_use("u1", "yeast", "gram", 700));
        s.ingredients.push(ingredient_use("u2", "butter", "gram", 5_000));
        let meals = vec![meal("e1", 12, 1.0, vec![(1.0, recipe("r", vec![s]))])];
        let result = aggregate(&meals).unwrap();
        let ids: Vec<&str> = result.items.iter().map(|i| i.ingredient_id.as_str()).collect();
        assert_eq!(ids, vec!["butter", "yeast"]);
    }
}

//! Preparation tasks derived from a recipe for one chosen meal-plan option.
//!
//! Two kinds of task come out of a recipe: a defrost reminder for every step
//! that uses a frozen ingredient, and one task per configured
//! [`RecipePrepTask`](crate::recipe::RecipePrepTask).

use serde::{Deserialize, Serialize};

use pantry_db::models::MealPlanTaskStatus;

use crate::ids::IdGenerator;
use crate::recipe::{Recipe, RecipeStep};

pub const PREP_TASK_EXPLANATION: &str = "recipe prep task exists for steps";

/// A task ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedTask {
    pub id: String,
    pub meal_plan_option_id: String,
    pub recipe_id: String,
    /// `None` for defrost tasks.
    pub recipe_prep_task_id: Option<String>,
    pub explanation: String,
    pub assigned_user: Option<String>,
    pub status: MealPlanTaskStatus,
}

/// Derive every task `recipe` needs when served as part of `option_id`.
///
/// Defrost tasks come first, in step order, followed by configured prep
/// tasks in their stored order. A prep task whose steps cannot be found in
/// the recipe is skipped and logged.
pub fn derive_tasks(option_id: &str, recipe: &Recipe, ids: &dyn IdGenerator) -> Vec<DerivedTask> {
    let mut tasks = Vec::new();

    let mut steps: Vec<&RecipeStep> = recipe.steps.iter().collect();
    steps.sort_by_key(|s| s.index);

    for step in steps {
        if let Some(explanation) = defrost_explanation(step) {
            tasks.push(DerivedTask {
                id: ids.next_id(),
                meal_plan_option_id: option_id.to_owned(),
                recipe_id: recipe.id.clone(),
                recipe_prep_task_id: None,
                explanation,
                assigned_user: None,
                status: MealPlanTaskStatus::Unfinished,
            });
        }
    }

    for prep_task in &recipe.prep_tasks {
        let missing = prep_task
            .steps
            .iter()
            .find(|s| recipe.step_by_id(&s.step_id).is_none());
        if let Some(missing) = missing {
            tracing::error!(
                recipe_id = %recipe.id,
                prep_task_id = %prep_task.id,
                step_id = %missing.step_id,
                "prep task refers to a step outside its recipe, skipping"
            );
            continue;
        }

        tasks.push(DerivedTask {
            id: ids.next_id(),
            meal_plan_option_id: option_id.to_owned(),
            recipe_id: recipe.id.clone(),
            recipe_prep_task_id: Some(prep_task.id.clone()),
            explanation: PREP_TASK_EXPLANATION.to_owned(),
            assigned_user: None,
            status: MealPlanTaskStatus::Unfinished,
        });
    }

    tasks
}

/// `frozen ingredients (#1, #3) for step #2 might need to be thawed ahead of
/// time`, or `None` when nothing in the step is frozen.
fn defrost_explanation(step: &RecipeStep) -> Option<String> {
    let positions: Vec<String> = step
        .ingredients
        .iter()
        .enumerate()
        .filter(|(_, u)| u.ingredient.as_ref().is_some_and(|i| i.is_frozen()))
        .map(|(i, _)| format!("#{}", i + 1))
        .collect();

    if positions.is_empty() {
        return None;
    }
    let noun = if positions.len() == 1 {
        "ingredient"
    } else {
        "ingredients"
    };
    Some(format!(
        "frozen {noun} ({}) for step #{} might need to be thawed ahead of time",
        positions.join(", "),
        step.number()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::recipe::fixtures::{ingredient_use, recipe, step};
    use crate::recipe::{PrepTaskStep, RecipePrepTask};

    fn frozen(id: &str, temp: f32) -> crate::recipe::IngredientUse {
        let mut use_ = ingredient_use(id, id, "gram", 100);
        if let Some(ingredient) = use_.ingredient.as_mut() {
            ingredient.min_ideal_storage_temp_c = Some(temp);
        }
        use_
    }

    fn prep_task(id: &str, step_id: &str) -> RecipePrepTask {
        RecipePrepTask {
            id: id.into(),
            name: "marinate".into(),
            description: String::new(),
            min_lead_secs: 3600,
            max_lead_secs: None,
            min_storage_temp_c: None,
            max_storage_temp_c: None,
            steps: vec![PrepTaskStep {
                id: format!("{id}-s"),
                step_id: step_id.into(),
                satisfies_step: true,
            }],
        }
    }

    #[test]
    fn single_frozen_ingredient_and_prep_task() {
        let mut s1 = step(0);
        s1.ingredients.push(frozen("peas", 2.5));
        let mut r = recipe("r1", vec![s1]);
        r.prep_tasks.push(prep_task("pt1", "step-0"));

        let tasks = derive_tasks("opt1", &r, &SequentialIds::new("t"));

        assert_eq!(tasks.len(), 2);
        assert_eq!(
            tasks[0].explanation,
            "frozen ingredient (#1) for step #1 might need to be thawed ahead of time"
        );
        assert!(tasks[0].recipe_prep_task_id.is_none());
        assert_eq!(tasks[1].explanation, PREP_TASK_EXPLANATION);
        assert_eq!(tasks[1].recipe_prep_task_id.as_deref(), Some("pt1"));
        for task in &tasks {
            assert_eq!(task.meal_plan_option_id, "opt1");
            assert_eq!(task.status, MealPlanTaskStatus::Unfinished);
            assert!(task.assigned_user.is_none());
        }
        assert_eq!(tasks[0].id, "t000001");
        assert_eq!(tasks[1].id, "t000002");
    }

    #[test]
    fn plural_positions_are_one_based() {
        let s1 = step(0);
        let mut s2 = step(1);
        s2.ingredients.push(frozen("shrimp", -18.0));
        s2.ingredients.push(ingredient_use("salt", "salt", "gram", 5));
        s2.ingredients.push(frozen("peas", 0.0));

        let tasks = derive_tasks("opt", &recipe("r", vec![s1, s2]), &SequentialIds::new("t"));

        assert_eq!(tasks.len(), 1);
        assert_eq!(
            tasks[0].explanation,
            "frozen ingredients (#1, #3) for step #2 might need to be thawed ahead of time"
        );
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut s1 = step(0);
        s1.ingredients.push(frozen("butter", 3.0));
        let mut s2 = step(1);
        s2.ingredients.push(frozen("milk", 3.5));

        let tasks = derive_tasks("opt", &recipe("r", vec![s1, s2]), &SequentialIds::new("t"));
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].explanation.ends_with("for step #1 might need to be thawed ahead of time"));
    }

    #[test]
    fn prep_task_with_unknown_step_is_skipped() {
        let mut r = recipe("r", vec![step(0)]);
        r.prep_tasks.push(prep_task("bad", "step-9"));
        r.prep_tasks.push(prep_task("good", "step-0"));

        let tasks = derive_tasks("opt", &r, &SequentialIds::new("t"));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].recipe_prep_task_id.as_deref(), Some("good"));
    }

    #[test]
    fn nothing_frozen_means_no_tasks() {
        let mut s1 = step(0);
        s1.ingredients.push(ingredient_use("flour", "flour", "gram", 50_000));
        let tasks = derive_tasks("opt", &recipe("r", vec![s1]), &SequentialIds::new("t"));
        assert!(tasks.is_empty());
    }
}

//! TOML format types for recipe definition files.
//!
//! Steps are numbered by their position in the file, starting at 1.
//! Products are referred to by name; names are unique within a recipe.

use serde::{Deserialize, Serialize};

/// Top-level structure of a recipe file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeToml {
    pub recipe: RecipeMeta,
    #[serde(default)]
    pub steps: Vec<StepToml>,
    #[serde(default)]
    pub prep_tasks: Vec<PrepTaskToml>,
}

/// `[recipe]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A single `[[steps]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepToml {
    pub preparation: String,
    #[serde(default)]
    pub notes: String,
    /// Names of the products this step makes.
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub ingredients: Vec<IngredientToml>,
    #[serde(default)]
    pub instruments: Vec<ToolToml>,
    #[serde(default)]
    pub vessels: Vec<ToolToml>,
    #[serde(default)]
    pub completion_conditions: Vec<CompletionConditionToml>,
}

/// `[[steps.ingredients]]`: a catalog ingredient by name, a product of an
/// earlier step by name, or both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngredientToml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// Measurement unit name from the catalog.
    pub unit: String,
    pub min: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolToml {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionConditionToml {
    pub ingredient_state: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub notes: String,
}

/// A single `[[prep_tasks]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrepTaskToml {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub min_lead_secs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lead_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_storage_temp_c: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_storage_temp_c: Option<f32>,
    #[serde(default)]
    pub steps: Vec<PrepTaskStepToml>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrepTaskStepToml {
    /// 1-based step number.
    pub step: u32,
    #[serde(default)]
    pub satisfies_step: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_recipe() {
        let toml_str = r#"
[recipe]
name = "Toast"

[[steps]]
preparation = "toast"

[[steps.ingredients]]
ingredient = "bread"
unit = "slice"
min = 2
"#;
        let recipe: RecipeToml = toml::from_str(toml_str).expect("should parse");
        assert_eq!(recipe.recipe.name, "Toast");
        assert_eq!(recipe.recipe.description, "");
        assert_eq!(recipe.steps.len(), 1);
        let use_ = &recipe.steps[0].ingredients[0];
        assert_eq!(use_.ingredient.as_deref(), Some("bread"));
        assert_eq!(use_.min, 2.0);
        assert!(use_.max.is_none());
        assert!(recipe.prep_tasks.is_empty());
    }

    #[test]
    fn deserialize_prep_task_steps() {
        let toml_str = r#"
[recipe]
name = "Curry"

[[steps]]
preparation = "marinate chicken"
products = ["marinated chicken"]

[[steps]]
preparation = "cook"

[[steps.ingredients]]
product = "marinated chicken"
unit = "gram"
min = 500
max = 600

[[steps.vessels]]
name = "wok"

[[prep_tasks]]
name = "marinate"
min_lead_secs = 3600
max_lead_secs = 86400
max_storage_temp_c = 4.0

[[prep_tasks.steps]]
step = 1
satisfies_step = true
"#;
        let recipe: RecipeToml = toml::from_str(toml_str).expect("should parse");
        assert_eq!(recipe.steps[0].products, vec!["marinated chicken"]);
        assert_eq!(recipe.steps[1].vessels[0].name, "wok");
        let task = &recipe.prep_tasks[0];
        assert_eq!(task.min_lead_secs, 3600);
        assert_eq!(task.max_lead_secs, Some(86400));
        assert_eq!(task.steps[0].step, 1);
        assert!(task.steps[0].satisfies_step);
    }
}

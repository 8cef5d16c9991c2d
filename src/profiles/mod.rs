//! Subject switching.
//!
//! New plan data arrives as a [`ProfileExtraction`] naming the subject it is
//! for. [`switch_profile`] decides whether that is a re-supply for the active
//! subject or a switch to another one, archives and restores snapshots
//! accordingly, and returns the snapshot to commit.

mod switcher;

pub use switcher::switch_profile;

use crate::types::{ExercisePlan, InventoryItem, MealPlan, Targets};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Plan data extracted for one subject.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileExtraction {
    /// Subject the data is for. May be empty.
    pub subject_name: String,
    pub profile: ExtractedProfile,
    /// Replaces the subject's meal plan wholesale.
    pub meal_plan: MealPlan,
    /// Replaces the subject's exercise plan wholesale.
    pub exercise_plan: ExercisePlan,
    pub schedule: Option<BTreeMap<String, String>>,
    /// Items the plan needs that are running out. Added at the lowest level.
    pub low_stock: Vec<InventoryItem>,
    /// Calorie and water goals. Unset values keep the subject's previous ones.
    pub targets: Targets,
}

/// Profile fields found in an extraction. Unset fields leave the stored
/// value alone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedProfile {
    pub professional: Option<String>,
    pub age: Option<u32>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub fat: Option<f64>,
    pub waist: Option<f64>,
    pub neck: Option<f64>,
    pub arm: Option<f64>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub comorbidities: Option<String>,
    pub goals: Option<String>,
}

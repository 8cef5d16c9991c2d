//! Core types for the snapshot store.

use crate::error::{Result, StoreError};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Weekly meal plan: day name → meal slot → free-text description.
pub type MealPlan = BTreeMap<String, BTreeMap<String, String>>;

/// Weekly exercise plan: day name → ordered exercises.
pub type ExercisePlan = BTreeMap<String, Vec<ExerciseEntry>>;

/// Completed exercises: day name → indices into that day's plan.
pub type DoneExercises = BTreeMap<String, Vec<usize>>;

/// Treat an explicit `null` as the field's default.
///
/// Remote documents are sanitized before they are written, so fields that
/// are omitted locally arrive back as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The complete state for one tracked subject.
///
/// Every field has a default, so partial documents deserialize as their
/// values merged over an empty snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub profile: Profile,

    #[serde(deserialize_with = "null_as_default")]
    pub meal_plan: MealPlan,

    #[serde(deserialize_with = "null_as_default")]
    pub exercise_plan: ExercisePlan,

    /// Optional day → time schedule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<BTreeMap<String, String>>,

    #[serde(deserialize_with = "null_as_default")]
    pub targets: Targets,

    #[serde(deserialize_with = "null_as_default")]
    pub inventory: Vec<InventoryItem>,

    // --- Ephemeral (reset by the daily rollover) ---
    /// Water drunk today, in millilitres.
    #[serde(deserialize_with = "null_as_default")]
    pub water: f64,

    /// Calories eaten today.
    #[serde(deserialize_with = "null_as_default")]
    pub calories: f64,

    #[serde(deserialize_with = "null_as_default")]
    pub done_ex: DoneExercises,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_meal: Option<MealScan>,

    // --- Bookkeeping ---
    /// Calendar day the ephemeral counters belong to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_date: Option<NaiveDate>,

    /// UI gates for destructive actions. Persisted, never interpreted.
    #[serde(deserialize_with = "null_as_default")]
    pub locks: BTreeMap<String, bool>,

    /// Archived snapshots of inactive subjects, keyed by subject name.
    #[serde(
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub profiles: BTreeMap<String, Snapshot>,
}

impl Snapshot {
    /// Parse a snapshot from its JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    /// Build a snapshot from a remote document.
    pub fn from_document(document: serde_json::Value) -> Result<Self> {
        serde_json::from_value(document).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    /// Serialize for the local cache. Absent fields stay omitted.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Trimmed subject name.
    pub fn subject_name(&self) -> &str {
        self.profile.name.trim()
    }

    /// Copy of this snapshot without its archive, as stored inside another
    /// snapshot's `profiles`.
    pub fn archived(&self) -> Snapshot {
        Snapshot {
            profiles: BTreeMap::new(),
            ..self.clone()
        }
    }

    pub fn add_water(&mut self, millilitres: f64) {
        self.water = (self.water + millilitres).max(0.0);
    }

    pub fn add_calories(&mut self, calories: f64) {
        self.calories = (self.calories + calories).max(0.0);
    }

    /// Flip the completion mark of one exercise. Returns the new mark.
    pub fn toggle_exercise(&mut self, day: &str, index: usize) -> bool {
        let done = self.done_ex.entry(day.to_string()).or_default();
        if let Some(pos) = done.iter().position(|i| *i == index) {
            done.remove(pos);
            if done.is_empty() {
                self.done_ex.remove(day);
            }
            false
        } else {
            done.push(index);
            done.sort_unstable();
            true
        }
    }

    /// Set the stock level of every inventory item with the given name.
    /// Returns how many items were updated.
    pub fn set_stock_level(&mut self, name: &str, level: StockLevel) -> usize {
        let mut updated = 0;
        for item in self.inventory.iter_mut().filter(|i| i.name == name) {
            item.level = level;
            updated += 1;
        }
        updated
    }

    /// Items at the lowest stock level.
    pub fn low_stock(&self) -> impl Iterator<Item = &InventoryItem> {
        self.inventory.iter().filter(|i| i.level == StockLevel::Low)
    }
}

/// Subject profile and clinical data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,

    /// Attending professional.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professional: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    /// Body fat percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub waist: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub neck: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comorbidities: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals: Option<String>,

    /// Dated measurement history, oldest first. Append-only.
    #[serde(deserialize_with = "null_as_default")]
    pub evolution: Vec<EvolutionEntry>,
}

impl Profile {
    /// Whether any body measurement has been recorded.
    pub fn has_measurements(&self) -> bool {
        self.weight.is_some()
            || self.fat.is_some()
            || self.waist.is_some()
            || self.neck.is_some()
            || self.arm.is_some()
    }

    /// Capture the current measurements as a history entry.
    pub fn measurements_on(&self, date: NaiveDate) -> EvolutionEntry {
        EvolutionEntry {
            date,
            weight: self.weight,
            fat: self.fat,
            waist: self.waist,
            neck: self.neck,
            arm: self.arm,
        }
    }
}

/// One dated set of body measurements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvolutionEntry {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waist: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neck: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExerciseEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sets: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reps: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Daily calorie and water targets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Targets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    /// Millilitres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water: Option<f64>,
}

/// A pantry item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryItem {
    pub name: String,
    /// Free-text quantity ("2 kg", "half a bag").
    pub quantity: String,
    pub level: StockLevel,
    pub category: String,
    /// Shelf or aisle tag.
    pub aisle: String,
}

impl InventoryItem {
    pub fn new(name: impl Into<String>, level: StockLevel) -> Self {
        Self {
            name: name.into(),
            level,
            ..Default::default()
        }
    }
}

/// Stock level ordinal, low to full. Serialized as 1-4.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StockLevel {
    Low = 1,
    Half = 2,
    High = 3,
    #[default]
    Full = 4,
}

impl TryFrom<u8> for StockLevel {
    type Error = StoreError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(StockLevel::Low),
            2 => Ok(StockLevel::Half),
            3 => Ok(StockLevel::High),
            4 => Ok(StockLevel::Full),
            other => Err(StoreError::InvalidValue(format!(
                "stock level must be 1-4, got {}",
                other
            ))),
        }
    }
}

impl From<StockLevel> for u8 {
    fn from(level: StockLevel) -> u8 {
        level as u8
    }
}

/// Result of the most recent meal scan.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MealScan {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    pub items: Vec<String>,
}

/// An authenticated account, as reported by the auth provider.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Opaque account id. Keys the remote document.
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.uid)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uid)
    }
}

/// Interactive sign-in methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignInMethod {
    Google,
    Facebook,
}

impl fmt::Display for SignInMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignInMethod::Google => write!(f, "google"),
            SignInMethod::Facebook => write!(f, "facebook"),
        }
    }
}

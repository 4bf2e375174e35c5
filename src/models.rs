// The structs in this module mirror what the portal exposes, from the top level dining location
// down to single food items. MenuDocument is the tree handed over to consumers, and its JSON shape
// is what the meal planner reads as menu data, so field names are camelCase.

use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt::Display, str::FromStr};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseUnitError {
    #[error("unit id is empty")]
    EmptyId,
    #[error("unit id {0:?} is not numeric")]
    NonNumericId(String),
}

/// A top level dining location
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub name: String,
    /// Opaque token the portal uses for this location, stable across runs
    pub navigation_id: String,
}

impl Unit {
    pub fn new(navigation_id: &str, name: &str) -> Self {
        Self {
            name: name.into(),
            navigation_id: navigation_id.into(),
        }
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.navigation_id)
    }
}

/// Parses "5=Portola" or just "5", as given on the command line
impl FromStr for Unit {
    type Err = ParseUnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, name) = match s.split_once('=') {
            Some((id, name)) => (id.trim(), name.trim()),
            None => (s.trim(), ""),
        };
        if id.is_empty() {
            return Err(ParseUnitError::EmptyId);
        }
        if !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseUnitError::NonNumericId(id.into()));
        }
        if name.is_empty() {
            return Ok(Self::new(id, &format!("Unit {id}")));
        }
        Ok(Self::new(id, name))
    }
}

/// A navigation node below a unit, e.g. "Takeout Menu" or "Daily Menu"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildUnit {
    pub label: String,
    pub navigation_id: String,
}

/// A named serving period within a daily menu
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MealGroup {
    /// Breakfast, Lunch, Dinner or Brunch
    pub name: String,
    /// Where to navigate for the items of this meal, if the anchor had a usable handler
    #[serde(skip)]
    pub navigation_id: Option<String>,
    pub items: Vec<MenuItem>,
}

impl MealGroup {
    pub fn new(name: &str, navigation_id: Option<&str>) -> Self {
        Self {
            name: name.into(),
            navigation_id: navigation_id.map(Into::into),
            items: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<MenuItem>) -> Self {
        self.items = items;
        self
    }
}

/// The date scoped container reached via the "Daily Menu" child unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyMenu {
    /// The text that matched today's date, empty if no candidate matched
    pub matched_date_label: String,
    /// Length of the markup the menu was parsed from, for diagnostics
    pub raw_fragment_length: usize,
    pub meal_groups: Vec<MealGroup>,
}

impl DailyMenu {
    pub fn date_matched(&self) -> bool {
        !self.matched_date_label.is_empty()
    }
}

/// A single food entry. Macros are None when missing or unreadable in the source.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MenuItem {
    pub name: String,
    pub serving_size: String,
    pub calories: Option<f64>,
    /// Grams
    pub protein: Option<f64>,
    /// Grams
    pub carbs: Option<f64>,
    /// Grams
    pub fat: Option<f64>,
}

impl MenuItem {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Display for MenuItem {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.serving_size.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} [{}]", self.name, self.serving_size)
        }
    }
}

/// The normalized menu of one unit
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MenuDocument {
    pub name: String,
    pub navigation_id: String,
    pub meal_groups: Vec<MealGroup>,
}

impl MenuDocument {
    pub fn item_count(&self) -> usize {
        self.meal_groups.iter().map(|g| g.items.len()).sum()
    }
}

/// Assemble the output tree for a unit. Pure, so it can be called on any partial result.
/// Groups keep their source order, and a group listed twice (same name and target) is only kept
/// at its first position, with any items from the later copy appended to it.
pub fn normalize(unit: &Unit, daily_menu: Option<DailyMenu>) -> MenuDocument {
    let mut meal_groups: Vec<MealGroup> = Vec::new();
    let mut seen = HashSet::new();

    for group in daily_menu.map(|dm| dm.meal_groups).unwrap_or_default() {
        let key = (group.name.clone(), group.navigation_id.clone());
        if seen.insert(key) {
            meal_groups.push(group);
        } else if let Some(first) = meal_groups
            .iter_mut()
            .find(|g| g.name == group.name && g.navigation_id == group.navigation_id)
        {
            first.items.extend(group.items);
        }
    }

    MenuDocument {
        name: unit.name.clone(),
        navigation_id: unit.navigation_id.clone(),
        meal_groups,
    }
}

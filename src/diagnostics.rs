// Anything the crawler skips or degrades on ends up here, so completeness of a run can be audited
// from the report instead of by reading terminal output.

use serde::Serialize;
use std::fmt::Display;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// An expected panel id was not in the navigation response
    MissingPanel,
    /// A child unit anchor without a recognizable navigation handler
    MalformedChildUnit,
    /// The unit has no "Daily Menu" child unit
    NoDailyMenu,
    /// None of the date label candidates were found
    DateNotMatched,
    /// No meal group anchors in the daily menu
    NoMealGroups,
    /// A meal group anchor without a recognizable navigation handler
    MissingMealTarget,
    /// Navigating into a meal group gave an unusable response
    MealFetchFailed,
    /// A meal group ended up without items
    EmptyMealGroup,
    /// An item row without a name
    UnnamedItem,
    /// A numeric cell that had text, but no number
    UnparsableField,
}

impl DiagnosticKind {
    /// Structural problems point at markup drift on the portal side, while the rest are about
    /// individual values
    pub fn is_structural(self) -> bool {
        !matches!(self, Self::UnnamedItem | Self::UnparsableField)
    }
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Self::MissingPanel => "missing_panel",
            Self::MalformedChildUnit => "malformed_child_unit",
            Self::NoDailyMenu => "no_daily_menu",
            Self::DateNotMatched => "date_not_matched",
            Self::NoMealGroups => "no_meal_groups",
            Self::MissingMealTarget => "missing_meal_target",
            Self::MealFetchFailed => "meal_fetch_failed",
            Self::EmptyMealGroup => "empty_meal_group",
            Self::UnnamedItem => "unnamed_item",
            Self::UnparsableField => "unparsable_field",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Default::default()
    }

    /// Store a diagnostic and emit it as a log event within the current span
    pub fn record(&mut self, kind: DiagnosticKind, detail: impl Into<String>) {
        let detail = detail.into();
        if kind.is_structural() {
            warn!(%kind, %detail, "Diagnostic");
        } else {
            debug!(%kind, %detail, "Diagnostic");
        }
        self.0.push(Diagnostic { kind, detail });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.0.iter().filter(|d| d.kind == kind).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let mut d = Diagnostics::new();
        d.record(DiagnosticKind::MalformedChildUnit, "first");
        d.record(DiagnosticKind::UnparsableField, "second");
        d.record(DiagnosticKind::MalformedChildUnit, "third");
        assert_eq!(3, d.len());
        assert_eq!(2, d.count(DiagnosticKind::MalformedChildUnit));
        assert_eq!(0, d.count(DiagnosticKind::NoDailyMenu));
        assert_eq!("first", d.iter().next().unwrap().detail);
    }

    #[test]
    fn serializes_kind_as_snake_case() {
        let d = Diagnostic {
            kind: DiagnosticKind::DateNotMatched,
            detail: String::from("tried 8 formats"),
        };
        let j = serde_json::to_value(&d).unwrap();
        assert_eq!("date_not_matched", j["kind"]);
        assert_eq!(DiagnosticKind::DateNotMatched.to_string(), j["kind"]);
    }
}

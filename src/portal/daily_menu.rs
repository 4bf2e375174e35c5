// Finding today in the daily menu panel. The portal has rendered the date in several ways over
// time, and there's no guarantee the list below is complete, so the formats are data that can be
// extended from configuration rather than something baked into the matching.

use super::{
    nav_id::Handler,
    panels::{CHILD_UNITS_PANEL, MENU_PANEL, PanelSet},
};
use crate::{
    Error, Result,
    diagnostics::{DiagnosticKind, Diagnostics},
    models::{DailyMenu, MealGroup},
    util::*,
};
use chrono::{
    NaiveDate,
    format::{Item, StrftimeItems},
};
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, trace};

pub static MEAL_NAMES: [&str; 4] = ["Breakfast", "Lunch", "Dinner", "Brunch"];

pub static DEFAULT_DATE_FORMATS: &[&str] = &[
    "%A, %B %-d, %Y", // Sunday, October 4, 2026
    "%A, %B %d, %Y",  // Sunday, October 04, 2026
    "%A, %b %-d, %Y", // Sunday, Oct 4, 2026
    "%A, %b %d, %Y",
    "%B %-d, %Y", // October 4, 2026
    "%B %d, %Y",
    "%-m/%-d/%Y", // 10/4/2026
    "%m/%d/%Y",
];

lazy_static! {
    static ref SEL_ANCHOR: Selector = sel("a");
}

/// Ordered list of strftime patterns used to render candidate date labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormats(Vec<String>);

impl Default for DateFormats {
    fn default() -> Self {
        Self(DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect())
    }
}

impl DateFormats {
    /// Only the given formats, in the given order
    pub fn new<I, S>(formats: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Vec::new()).extended(formats)
    }

    /// Append formats to try after the existing ones
    pub fn extended<I, S>(mut self, formats: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for f in formats {
            let f = f.into();
            validate_format(&f)?;
            self.0.push(f);
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render each format for the given date. Formats that render the same text (like padded and
    /// unpadded days after the 9th) only give one candidate.
    pub fn candidates(&self, date: NaiveDate) -> Vec<String> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .map(|f| date.format(f).to_string())
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }
}

fn validate_format(f: &str) -> Result<()> {
    if f.trim().is_empty() || StrftimeItems::new(f).any(|i| matches!(i, Item::Error)) {
        return Err(Error::DateFormat(f.into()));
    }
    Ok(())
}

/// Find today's label and the meal groups in a daily menu response.
/// A date that can't be found doesn't stop anything, it only leaves the label empty.
pub fn match_today_and_meals(
    panels: &PanelSet,
    today: NaiveDate,
    formats: &DateFormats,
    diags: &mut Diagnostics,
) -> DailyMenu {
    match panels.first_of(&[MENU_PANEL, CHILD_UNITS_PANEL]) {
        Some(p) => {
            debug!(panel = %p.id, len = p.len(), "Matching daily menu");
            match_daily_menu(p.html(), today, formats, diags)
        }
        None => {
            diags.record(
                DiagnosticKind::MissingPanel,
                format!("no {MENU_PANEL} or {CHILD_UNITS_PANEL} with content in daily menu response"),
            );
            DailyMenu::default()
        }
    }
}

pub fn match_daily_menu(
    html: &str,
    today: NaiveDate,
    formats: &DateFormats,
    diags: &mut Diagnostics,
) -> DailyMenu {
    let doc = Html::parse_fragment(html);
    let root = doc.root_element();
    let text = element_text(&root);

    let candidates = formats.candidates(today);
    let matched_date_label = match candidates.iter().find(|c| text.contains(c.as_str())) {
        Some(label) => {
            debug!(date_match = %label, "Matched today's date");
            label.clone()
        }
        None => {
            diags.record(
                DiagnosticKind::DateNotMatched,
                format!("none of {candidates:?} found in daily menu"),
            );
            String::new()
        }
    };

    let scope = if matched_date_label.is_empty() {
        root
    } else {
        day_scope(root, &matched_date_label)
    };

    let meal_groups = meal_groups(scope, diags);
    if meal_groups.is_empty() {
        diags.record(
            DiagnosticKind::NoMealGroups,
            format!("no anchors named any of {MEAL_NAMES:?}"),
        );
    }

    DailyMenu {
        matched_date_label,
        raw_fragment_length: html.len(),
        meal_groups,
    }
}

fn is_meal_anchor(e: &ElementRef) -> bool {
    MEAL_NAMES.contains(&element_text(e).as_str())
}

fn has_meal_anchor(e: ElementRef) -> bool {
    e.select(&SEL_ANCHOR).any(|a| is_meal_anchor(&a))
}

/// Narrow the search for meals down to the block that holds today's date. Starting at the
/// innermost element with the date label, walk up until an element also contains meal anchors.
/// Falls back to the whole fragment.
fn day_scope<'a>(root: ElementRef<'a>, label: &str) -> ElementRef<'a> {
    let mut node = root;
    while let Some(child) = node
        .child_elements()
        .find(|c| element_text(c).contains(label))
    {
        node = child;
    }

    let mut scope = node;
    loop {
        if has_meal_anchor(scope) {
            trace!(element = scope.value().name(), "Scoped meals to date block");
            return scope;
        }
        match scope.parent().and_then(ElementRef::wrap) {
            Some(parent) => scope = parent,
            None => return root,
        }
    }
}

fn meal_groups(scope: ElementRef, diags: &mut Diagnostics) -> Vec<MealGroup> {
    let mut groups = Vec::new();
    let mut seen = HashSet::new();

    for anchor in scope.select(&SEL_ANCHOR) {
        let name = element_text(&anchor);
        if !MEAL_NAMES.contains(&name.as_str()) {
            continue;
        }
        let id = Handler::Menu.extract_from(&anchor);
        if !seen.insert((name.clone(), id)) {
            continue;
        }
        if id.is_none() {
            diags.record(
                DiagnosticKind::MissingMealTarget,
                format!("meal anchor {name:?} has no menuListSelectMenu handler"),
            );
        }
        trace!(meal = %name, ?id, "Found meal group");
        groups.push(MealGroup::new(&name, id));
    }

    groups
}

use super::{
    nav_id::Handler,
    panels::{CHILD_UNITS_PANEL, PanelSet},
};
use crate::{
    diagnostics::{DiagnosticKind, Diagnostics},
    models::ChildUnit,
    util::*,
};
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use tracing::trace;

pub static DAILY_MENU_LABEL: &str = "Daily Menu";

lazy_static! {
    static ref SEL_ANCHOR: Selector = sel("a");
}

/// Child units listed in the child units panel, in display order
pub fn resolve_child_units(panels: &PanelSet, diags: &mut Diagnostics) -> Vec<ChildUnit> {
    match panels.get(CHILD_UNITS_PANEL) {
        Some(p) => parse_child_units(p.html(), diags),
        None => {
            diags.record(
                DiagnosticKind::MissingPanel,
                format!("no {CHILD_UNITS_PANEL} in unit selection response"),
            );
            Vec::new()
        }
    }
}

pub fn parse_child_units(html: &str, diags: &mut Diagnostics) -> Vec<ChildUnit> {
    let doc = Html::parse_fragment(html);
    let mut units = Vec::new();

    for anchor in doc.select(&SEL_ANCHOR) {
        let label = element_text(&anchor);
        match Handler::ChildUnit.extract_from(&anchor) {
            Some(id) => {
                trace!(%label, id, "Found child unit");
                units.push(ChildUnit {
                    label,
                    navigation_id: id.into(),
                });
            }
            None => diags.record(
                DiagnosticKind::MalformedChildUnit,
                format!("anchor {label:?} has no childUnitsSelectUnit handler"),
            ),
        }
    }

    units
}

/// The first child unit labeled as a daily menu, if the unit publishes one
pub fn find_daily_menu(child_units: &[ChildUnit]) -> Option<&ChildUnit> {
    child_units
        .iter()
        .find(|c| c.label.contains(DAILY_MENU_LABEL))
}

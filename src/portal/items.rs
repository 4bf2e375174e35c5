use super::panels::{ITEM_PANEL, PanelSet};
use crate::{
    diagnostics::{DiagnosticKind, Diagnostics},
    models::MenuItem,
    util::*,
};
use lazy_static::lazy_static;
use scraper::{CaseSensitivity, ElementRef, Html, Selector};
use tracing::trace;

static ATTR_DATA_LABEL: &str = "data-label";
static ATTR_COLSPAN: &str = "colspan";
static CLASS_GROUP_ROW: &str = "cbo_nn_itemGroupRow";

lazy_static! {
    static ref SEL_ROW: Selector = sel("tr");
    static ref SEL_HEADER_CELL: Selector = sel("th");
    static ref SEL_CELL: Selector = sel("td");
    static ref SEL_ITEM_NAME: Selector = sel("td.cbo_nn_itemHover");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Serving,
    Calories,
    Protein,
    Carbs,
    Fat,
}

impl Field {
    /// Map a column label like "Total Fat (g)" to the field it holds
    fn from_label(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        let label = match label.find('(') {
            Some(i) => label[..i].trim(),
            None => label.trim(),
        };
        match label {
            "item" | "name" | "menu item" | "item name" => Some(Self::Name),
            "calories" | "kcal" | "energy" => Some(Self::Calories),
            "fat" | "total fat" => Some(Self::Fat),
            _ if label.starts_with("serving") => Some(Self::Serving),
            _ if label.starts_with("protein") => Some(Self::Protein),
            _ if label.starts_with("carb") || label.starts_with("total carb") => Some(Self::Carbs),
            _ => None,
        }
    }
}

/// Which column holds which field, as given by the last header row seen
#[derive(Debug, Clone, Default)]
struct Columns(Vec<Option<Field>>);

impl Columns {
    fn from_header(row: ElementRef) -> Self {
        Self(
            row.select(&SEL_HEADER_CELL)
                .map(|th| Field::from_label(&element_text(&th)))
                .collect(),
        )
    }

    fn field_at(&self, idx: usize) -> Option<Field> {
        self.0.get(idx).copied().flatten()
    }
}

/// Items of a meal group, from the item panel of a menu selection response
pub fn extract_panel_items(panels: &PanelSet, diags: &mut Diagnostics) -> Vec<MenuItem> {
    match panels.get(ITEM_PANEL) {
        Some(p) => extract_items(p.html(), diags),
        None => {
            diags.record(
                DiagnosticKind::MissingPanel,
                format!("no {ITEM_PANEL} in menu selection response"),
            );
            Vec::new()
        }
    }
}

pub fn extract_items(html: &str, diags: &mut Diagnostics) -> Vec<MenuItem> {
    let doc = Html::parse_fragment(html);
    let mut columns = Columns::default();
    let mut items = Vec::new();

    for (row_no, row) in doc.select(&SEL_ROW).enumerate() {
        if row.select(&SEL_HEADER_CELL).next().is_some() {
            columns = Columns::from_header(row);
            trace!(?columns, "Item table header");
            continue;
        }
        let cells: Vec<ElementRef> = row.select(&SEL_CELL).collect();
        if cells.is_empty() || is_group_heading(row, &cells, &columns) {
            continue;
        }
        if let Some(item) = parse_row(row, &cells, &columns, row_no, diags) {
            items.push(item);
        }
    }

    items
}

/// Category headings like "Entrees" are rows of their own, not items. The portal marks them
/// with a group row class, otherwise they show up as a lone cell in a table with more columns.
fn is_group_heading(row: ElementRef, cells: &[ElementRef], columns: &Columns) -> bool {
    if row.value().has_class(CLASS_GROUP_ROW, CaseSensitivity::AsciiCaseInsensitive) {
        return true;
    }
    if cells.len() != 1 {
        return false;
    }
    let spans = cells[0]
        .value()
        .attr(ATTR_COLSPAN)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .is_some_and(|span| span > 1);
    spans || columns.0.len() > 1
}

fn parse_row(
    row: ElementRef,
    cells: &[ElementRef],
    columns: &Columns,
    row_no: usize,
    diags: &mut Diagnostics,
) -> Option<MenuItem> {
    let mut values: Vec<(Field, String)> = Vec::new();
    for (idx, cell) in cells.iter().enumerate() {
        let field = cell
            .value()
            .attr(ATTR_DATA_LABEL)
            .and_then(Field::from_label)
            .or_else(|| columns.field_at(idx));
        if let Some(field) = field {
            values.push((field, element_text(cell)));
        }
    }
    let value_of = |field: Field| {
        values
            .iter()
            .find(|(f, v)| *f == field && !v.is_empty())
            .map(|(_, v)| v.as_str())
    };

    let name = value_of(Field::Name)
        .map(String::from)
        .or_else(|| row.select(&SEL_ITEM_NAME).next().map(|e| element_text(&e)))
        .or_else(|| {
            // without any labels, the first cell is the best guess for the name
            if columns.0.is_empty() && values.is_empty() {
                cells.first().map(element_text)
            } else {
                None
            }
        })
        .filter(|n| !n.is_empty());
    let Some(name) = name else {
        diags.record(
            DiagnosticKind::UnnamedItem,
            format!("item row {row_no} has no name"),
        );
        return None;
    };

    let mut number = |field: Field, label: &str| -> Option<f64> {
        let raw = value_of(field)?;
        let v = parse_number(raw);
        if v.is_none() {
            diags.record(
                DiagnosticKind::UnparsableField,
                format!("{label} {raw:?} of {name:?} is not a number"),
            );
        }
        v
    };

    let item = MenuItem {
        calories: number(Field::Calories, "calories"),
        protein: number(Field::Protein, "protein"),
        carbs: number(Field::Carbs, "carbs"),
        fat: number(Field::Fat, "fat"),
        serving_size: value_of(Field::Serving).unwrap_or_default().into(),
        name,
    };
    trace!(%item, "Parsed item");
    Some(item)
}

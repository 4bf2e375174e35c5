// Parsers for the fragments the portal returns. None of these touch the network; they take panel
// markup and produce model values, recording anything they have to skip.

pub mod child_units;
pub mod daily_menu;
pub mod items;
pub mod nav_id;
pub mod panels;

pub use child_units::{find_daily_menu, resolve_child_units};
pub use daily_menu::{DateFormats, match_today_and_meals};
pub use items::{extract_items, extract_panel_items};
pub use panels::{Panel, PanelSet};

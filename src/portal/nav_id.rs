// The portal doesn't put navigation ids in dedicated attributes. They only show up as the argument
// of an inline javascript call, so this is the single place that knows what those calls look like.
// If the markup changes, the patterns below are what needs updating.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::ElementRef;

static ATTR_ONCLICK: &str = "onclick";
static ATTR_HREF: &str = "href";

lazy_static! {
    static ref RE_CHILD_UNIT: Regex =
        Regex::new(r#"childUnitsSelectUnit\(\s*["']?(\d+)["']?\s*\)"#).unwrap();
    static ref RE_MENU: Regex =
        Regex::new(r#"menuListSelectMenu\(\s*["']?(\d+)["']?\s*\)"#).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// `childUnitsSelectUnit(<id>)` on child unit anchors
    ChildUnit,
    /// `menuListSelectMenu(<id>)` on meal anchors
    Menu,
}

impl Handler {
    fn pattern(self) -> &'static Regex {
        match self {
            Self::ChildUnit => &*RE_CHILD_UNIT,
            Self::Menu => &*RE_MENU,
        }
    }

    /// Pull the numeric id out of an event handler attribute value
    pub fn extract(self, attr: &str) -> Option<&str> {
        self.pattern()
            .captures(attr)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Look for the handler call on an element, first in `onclick`, then in a `javascript:` href
    pub fn extract_from<'a>(self, e: &ElementRef<'a>) -> Option<&'a str> {
        if let Some(id) = e.value().attr(ATTR_ONCLICK).and_then(|v| self.extract(v)) {
            return Some(id);
        }
        e.value()
            .attr(ATTR_HREF)
            .filter(|v| v.trim_start().starts_with("javascript:"))
            .and_then(|v| self.extract(v))
    }
}

use serde::Deserialize;

pub static CHILD_UNITS_PANEL: &str = "childUnitsPanel";
pub static MENU_PANEL: &str = "menuPanel";
pub static ITEM_PANEL: &str = "itemPanel";

#[derive(thiserror::Error, Debug)]
pub enum PanelsError {
    #[error("response has no `panels` field")]
    Missing,
    #[error("response is not a panel container")]
    Json(#[from] serde_json::Error),
}

/// A named HTML fragment from a navigation response
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Panel {
    pub id: String,
    html: Option<String>,
}

impl Panel {
    pub fn new(id: &str, html: &str) -> Self {
        Self {
            id: id.into(),
            html: Some(html.into()),
        }
    }

    pub fn html(&self) -> &str {
        self.html.as_deref().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.html().len()
    }

    pub fn is_empty(&self) -> bool {
        self.html().is_empty()
    }
}

#[derive(Deserialize)]
struct Envelope {
    panels: Option<Vec<Panel>>,
}

/// All panels of one navigation response, in the order the portal sent them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelSet(Vec<Panel>);

impl PanelSet {
    pub fn new(panels: Vec<Panel>) -> Self {
        Self(panels)
    }

    pub fn from_json(body: &str) -> Result<Self, PanelsError> {
        let envelope: Envelope = serde_json::from_str(body)?;
        envelope.panels.map(Self).ok_or(PanelsError::Missing)
    }

    /// First panel with the given id
    pub fn get(&self, id: &str) -> Option<&Panel> {
        self.0.iter().find(|p| p.id == id)
    }

    /// First of the given ids that is present and has any markup
    pub fn first_of(&self, ids: &[&str]) -> Option<&Panel> {
        ids.iter()
            .filter_map(|id| self.get(id))
            .find(|p| !p.is_empty())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Panel> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_panels_in_order() {
        let body = r#"{
            "success": true,
            "panels": [
                {"id": "childUnitsPanel", "html": "<a>Daily Menu</a>"},
                {"id": "menuPanel", "html": null},
                {"id": "itemPanel"}
            ]
        }"#;
        let ps = PanelSet::from_json(body).unwrap();
        assert_eq!(3, ps.len());
        let ids: Vec<&str> = ps.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(vec![CHILD_UNITS_PANEL, MENU_PANEL, ITEM_PANEL], ids);
        assert_eq!(17, ps.get(CHILD_UNITS_PANEL).unwrap().len());
        assert!(ps.get(MENU_PANEL).unwrap().is_empty());
        assert!(ps.get("nope").is_none());
    }

    #[test]
    fn missing_panels_field() {
        assert!(matches!(
            PanelSet::from_json(r#"{"success": false}"#),
            Err(PanelsError::Missing)
        ));
        assert!(matches!(
            PanelSet::from_json("<html>Session expired</html>"),
            Err(PanelsError::Json(_))
        ));
    }

    #[test]
    fn first_of_skips_empty_panels() {
        let ps = PanelSet::new(vec![
            Panel::new(MENU_PANEL, ""),
            Panel::new(CHILD_UNITS_PANEL, "<p>x</p>"),
        ]);
        assert_eq!(
            CHILD_UNITS_PANEL,
            ps.first_of(&[MENU_PANEL, CHILD_UNITS_PANEL]).unwrap().id
        );
        assert!(ps.first_of(&[ITEM_PANEL]).is_none());
    }
}

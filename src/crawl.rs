// Each unit is crawled start to finish by its own task with its own Session, so a slow or broken
// unit never holds up the others. Within a unit everything is strictly sequential, since the
// portal tracks navigation state per session cookie.

use crate::{
    Error, Result,
    diagnostics::{Diagnostic, DiagnosticKind, Diagnostics},
    models::{MenuDocument, Unit, normalize},
    portal::{
        DateFormats, child_units::DAILY_MENU_LABEL, extract_panel_items, find_daily_menu,
        match_today_and_meals, resolve_child_units,
    },
    session::{self, Session},
};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct Opts {
    pub session: session::Opts,
    pub date_formats: DateFormats,
}

/// What a successful crawl of one unit produced
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlResult {
    pub document: MenuDocument,
    /// None if the unit has no daily menu, or today's date wasn't found in it
    pub matched_date_label: Option<String>,
}

#[derive(Debug)]
pub enum Outcome {
    Completed(CrawlResult),
    Failed(Error),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub struct UnitReport {
    pub unit: Unit,
    pub outcome: Outcome,
    pub diagnostics: Vec<Diagnostic>,
    pub elapsed: Duration,
}

impl UnitReport {
    pub fn status(&self) -> Status {
        match self.outcome {
            Outcome::Completed(_) => Status::Completed,
            Outcome::Failed(_) => Status::Failed,
            Outcome::Cancelled => Status::Cancelled,
        }
    }

    pub fn document(&self) -> Option<&MenuDocument> {
        match &self.outcome {
            Outcome::Completed(r) => Some(&r.document),
            _ => None,
        }
    }

    pub fn summary(&self) -> ReportEntry<'_> {
        let (error, matched_date_label) = match &self.outcome {
            Outcome::Completed(r) => (None, r.matched_date_label.as_deref()),
            Outcome::Failed(e) => (Some(error_chain(e)), None),
            Outcome::Cancelled => (None, None),
        };
        let doc = self.document();
        ReportEntry {
            name: &self.unit.name,
            navigation_id: &self.unit.navigation_id,
            status: self.status(),
            error,
            matched_date_label,
            meal_groups: doc.map_or(0, |d| d.meal_groups.len()),
            items: doc.map_or(0, MenuDocument::item_count),
            elapsed: humantime::format_duration(truncate_ms(self.elapsed)).to_string(),
            diagnostics: &self.diagnostics,
        }
    }
}

/// One line of the audit report
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry<'a> {
    pub name: &'a str,
    pub navigation_id: &'a str,
    pub status: Status,
    pub error: Option<String>,
    pub matched_date_label: Option<&'a str>,
    pub meal_groups: usize,
    pub items: usize,
    pub elapsed: String,
    pub diagnostics: &'a [Diagnostic],
}

fn truncate_ms(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis().try_into().unwrap_or(u64::MAX))
}

/// Error message with all its causes, outermost first
fn error_chain(e: &Error) -> String {
    let mut msg = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    msg
}

/// Crawl a single unit: open a session, walk to its daily menu and collect the items of each
/// meal group. Problems with the markup end up in `diags`; only transport and session problems,
/// or unusable responses for the unit itself, make this fail.
pub async fn crawl_unit(
    opts: &Opts,
    unit: &Unit,
    today: NaiveDate,
    cancel: CancellationToken,
    diags: &mut Diagnostics,
) -> Result<CrawlResult> {
    let mut session = Session::open(&opts.session, &unit.navigation_id, cancel).await?;

    let panels = session.select_unit(&unit.navigation_id).await?;
    let child_units = resolve_child_units(&panels, diags);
    debug!(count = child_units.len(), "Resolved child units");

    let Some(daily) = find_daily_menu(&child_units) else {
        diags.record(
            DiagnosticKind::NoDailyMenu,
            format!(
                "no {DAILY_MENU_LABEL:?} among {} child units",
                child_units.len()
            ),
        );
        session.close();
        return Ok(CrawlResult {
            document: normalize(unit, None),
            matched_date_label: None,
        });
    };

    let panels = session.select_child_unit(&daily.navigation_id).await?;
    let mut daily_menu = match_today_and_meals(&panels, today, &opts.date_formats, diags);

    for group in daily_menu.meal_groups.iter_mut() {
        // groups without a target were already recorded by the matcher
        let Some(menu_id) = group.navigation_id.clone() else {
            continue;
        };
        session.pause().await?;
        match session.select_menu(&menu_id).await {
            Ok(panels) => group.items = extract_panel_items(&panels, diags),
            Err(Error::Navigation { url, source }) => diags.record(
                DiagnosticKind::MealFetchFailed,
                format!("{} via {url}: {source}", group.name),
            ),
            Err(e) => return Err(e),
        }
        if group.items.is_empty() {
            diags.record(
                DiagnosticKind::EmptyMealGroup,
                format!("{} ({menu_id}) has no items", group.name),
            );
        } else {
            debug!(meal = %group.name, items = group.items.len(), "Collected meal group");
        }
    }

    let matched_date_label = daily_menu
        .date_matched()
        .then(|| daily_menu.matched_date_label.clone());
    let document = normalize(unit, Some(daily_menu));
    session.close();

    Ok(CrawlResult {
        document,
        matched_date_label,
    })
}

#[instrument(
    skip_all,
    fields(crawl_id = %Uuid::new_v4(), unit = %unit.navigation_id, name = %unit.name)
)]
async fn run_unit(
    opts: Arc<Opts>,
    unit: Unit,
    today: NaiveDate,
    cancel: CancellationToken,
) -> UnitReport {
    let started = Instant::now();
    let mut diags = Diagnostics::new();

    let outcome = match crawl_unit(&opts, &unit, today, cancel, &mut diags).await {
        Ok(r) => Outcome::Completed(r),
        Err(Error::Cancelled) => Outcome::Cancelled,
        Err(e) => Outcome::Failed(e),
    };
    let elapsed = started.elapsed();

    match &outcome {
        Outcome::Completed(r) => info!(
            meal_groups = r.document.meal_groups.len(),
            items = r.document.item_count(),
            date = r.matched_date_label.as_deref().unwrap_or_default(),
            diagnostics = diags.len(),
            ?elapsed,
            "Unit crawl completed"
        ),
        Outcome::Failed(e) => error!(err = %error_chain(e), ?elapsed, "Unit crawl failed"),
        Outcome::Cancelled => warn!(?elapsed, "Unit crawl cancelled"),
    }

    UnitReport {
        unit,
        outcome,
        diagnostics: diags.into_vec(),
        elapsed,
    }
}

/// Runs unit crawls concurrently and collects their reports
pub struct Crawler {
    opts: Arc<Opts>,
    today: NaiveDate,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    tx: mpsc::UnboundedSender<(usize, UnitReport)>,
    rx: mpsc::UnboundedReceiver<(usize, UnitReport)>,
    units: Vec<Unit>,
}

impl Crawler {
    pub fn new(opts: Opts) -> Self {
        Self::with_cancellation(opts, CancellationToken::new())
    }

    /// Cancelling the given token cancels every crawl spawned from this crawler
    pub fn with_cancellation(opts: Opts, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            opts: Arc::new(opts),
            today: Local::now().date_naive(),
            cancel,
            tasks: JoinSet::new(),
            tx,
            rx,
            units: Vec::new(),
        }
    }

    /// Use another date than today for matching the daily menus
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.today = date;
        self
    }

    /// Start crawling a unit. The returned token cancels only this unit's crawl.
    pub fn spawn(&mut self, unit: Unit) -> CancellationToken {
        let idx = self.units.len();
        let token = self.cancel.child_token();
        self.units.push(unit.clone());

        let opts = self.opts.clone();
        let today = self.today;
        let cancel = token.clone();
        let tx = self.tx.clone();
        self.tasks.spawn(async move {
            let report = run_unit(opts, unit, today, cancel).await;
            if tx.send((idx, report)).is_err() {
                warn!(idx, "Report sink closed before unit finished");
            }
        });
        token
    }

    /// Wait for all spawned crawls. Reports come back in the order the units were spawned,
    /// regardless of completion order.
    pub async fn join(self) -> Vec<UnitReport> {
        let Self {
            mut tasks,
            tx,
            mut rx,
            units,
            ..
        } = self;
        drop(tx);

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!(err = %e, "Unit crawl task ended abnormally");
            }
        }

        let mut slots: Vec<Option<UnitReport>> = units.iter().map(|_| None).collect();
        while let Some((idx, report)) = rx.recv().await {
            debug!(idx, unit = %report.unit, status = ?report.status(), "Received report");
            if let Some(slot) = slots.get_mut(idx) {
                *slot = Some(report);
            }
        }

        units
            .into_iter()
            .zip(slots)
            .map(|(unit, slot)| {
                slot.unwrap_or_else(|| UnitReport {
                    unit,
                    outcome: Outcome::Failed(Error::Aborted),
                    diagnostics: Vec::new(),
                    elapsed: Duration::ZERO,
                })
            })
            .collect()
    }
}

/// Crawl all given units concurrently, returning one report per unit in the given order
pub async fn crawl_all(
    opts: Opts,
    units: Vec<Unit>,
    today: NaiveDate,
    cancel: CancellationToken,
) -> Vec<UnitReport> {
    let mut crawler = Crawler::with_cancellation(opts, cancel).with_date(today);
    for unit in units {
        crawler.spawn(unit);
    }
    crawler.join().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MealGroup, MenuItem};
    use pretty_assertions::assert_eq;

    fn completed() -> UnitReport {
        let document = MenuDocument {
            name: "Portola".into(),
            navigation_id: "5".into(),
            meal_groups: vec![
                MealGroup::new("Breakfast", Some("1")),
                MealGroup::new("Lunch", Some("2"))
                    .with_items(vec![MenuItem::new("Pho"), MenuItem::new("Rice")]),
            ],
        };
        let mut diags = Diagnostics::new();
        diags.record(DiagnosticKind::EmptyMealGroup, "Breakfast (1) has no items");
        UnitReport {
            unit: Unit::new("5", "Portola"),
            outcome: Outcome::Completed(CrawlResult {
                document,
                matched_date_label: Some("Sunday, October 18, 2026".into()),
            }),
            diagnostics: diags.into_vec(),
            elapsed: Duration::from_micros(1_234_567),
        }
    }

    #[test]
    fn completed_summary() {
        let report = completed();
        assert_eq!(
            serde_json::json!({
                "name": "Portola",
                "navigationId": "5",
                "status": "completed",
                "error": null,
                "matchedDateLabel": "Sunday, October 18, 2026",
                "mealGroups": 2,
                "items": 2,
                "elapsed": "1s 234ms",
                "diagnostics": [
                    { "kind": "empty_meal_group", "detail": "Breakfast (1) has no items" }
                ]
            }),
            serde_json::to_value(report.summary()).unwrap()
        );
    }

    #[test]
    fn failed_summary_has_error_text_and_no_document() {
        let report = UnitReport {
            unit: Unit::new("7", "Carrillo"),
            outcome: Outcome::Failed(Error::Aborted),
            diagnostics: Vec::new(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(Status::Failed, report.status());
        assert!(report.document().is_none());
        let summary = report.summary();
        assert_eq!(Some("crawl task ended without reporting"), summary.error.as_deref());
        assert_eq!(0, summary.items);
    }

    #[test]
    fn error_chain_includes_sources() {
        let e = Error::Navigation {
            url: "http://x/Unit/SelectChildUnit".into(),
            source: crate::portal::panels::PanelsError::Missing,
        };
        assert_eq!(
            "unexpected navigation response from http://x/Unit/SelectChildUnit: response has no `panels` field",
            error_chain(&e)
        );
    }

    #[tokio::test]
    async fn join_without_units() {
        let crawler = Crawler::new(Opts::default());
        assert!(crawler.join().await.is_empty());
    }
}

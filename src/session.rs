// A Session is one walk through the portal for one unit. The portal keeps track of where each
// session cookie currently is in its navigation, so every step of a crawl has to go through the
// same Session, one request at a time. Navigation methods take `&mut self` and Session is not
// Clone.

use crate::{
    Error, Result,
    error::is_transient_request_error,
    portal::PanelSet,
};
use rand::Rng;
use reqwest::RequestBuilder;
use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

static APP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub static DEFAULT_BASE_URL: &str = "https://nutrition.sa.ucsb.edu/NetNutrition";
pub static DEFAULT_ENTRY_PATH: &str = "1";

static PATH_SELECT_UNIT: &str = "Unit/SelectUnitFromUnitsList";
static PATH_SELECT_CHILD_UNIT: &str = "Unit/SelectChildUnit";
static PATH_SELECT_MENU: &str = "Menu/SelectMenu";
static FIELD_UNIT_OID: &str = "unitOid";
static FIELD_MENU_OID: &str = "menuOid";

#[derive(Clone, Debug)]
pub struct Opts {
    /// Portal root, e.g. https://nutrition.sa.ucsb.edu/NetNutrition
    pub base_url: Url,
    /// Path below the root that hands out the session cookie
    pub entry_path: String,
    /// Upper bound for each single request
    pub request_timeout: Duration,
    /// Pause between consecutive menu requests within a session
    pub request_delay: Duration,
    /// How many times a transient failure is retried before giving up
    pub retries: u32,
    /// Backoff before the first retry, doubled for each following one
    pub retry_backoff: Duration,
    /// If set, every received panel is written here for inspection
    pub dump_dir: Option<PathBuf>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            entry_path: DEFAULT_ENTRY_PATH.into(),
            request_timeout: Duration::from_secs(15),
            request_delay: Duration::from_millis(250),
            retries: 3,
            retry_backoff: Duration::from_millis(500),
            dump_dir: None,
        }
    }
}

impl Opts {
    fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::ClientBuilder::new()
            .user_agent(APP_USER_AGENT)
            .timeout(self.request_timeout)
            .cookie_store(true)
            .build()
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path.trim_start_matches('/')))?)
    }

    /// Backoff before retry number `retry` (1-based), with up to 50% jitter added
    fn backoff(&self, retry: u32) -> Duration {
        let base = self
            .retry_backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)));
        let jitter = rand::rng().random_range(0.0..=0.5);
        base.mul_f64(1.0 + jitter)
    }
}

/// Where in the portal's navigation the session currently is
#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    Entry,
    Unit(String),
    ChildUnit(String),
    Menu(String),
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Entry => write!(f, "entry"),
            Self::Unit(id) => write!(f, "unit:{id}"),
            Self::ChildUnit(id) => write!(f, "child_unit:{id}"),
            Self::Menu(id) => write!(f, "menu:{id}"),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    client: reqwest::Client,
    opts: Opts,
    unit_id: String,
    cancel: CancellationToken,
    position: Position,
    step: u32,
}

impl Session {
    /// Open a session for crawling the given unit by requesting the entry page, which sets the
    /// session cookie. Failing here is fatal for the crawl of that unit.
    pub async fn open(opts: &Opts, unit_id: &str, cancel: CancellationToken) -> Result<Self> {
        let url = opts.endpoint(&opts.entry_path)?;
        let client = opts.build_client().map_err(|source| Error::Session {
            url: url.to_string(),
            source,
        })?;
        let mut this = Self {
            client,
            opts: opts.clone(),
            unit_id: unit_id.into(),
            cancel,
            position: Position::Entry,
            step: 0,
        };

        debug!(%url, "Opening portal session");
        let client = this.client.clone();
        let target = url.clone();
        match this.send(&url, || client.get(target.clone())).await {
            Ok(_) => Ok(this),
            Err(Error::Transport { url, source, .. }) => Err(Error::Session { url, source }),
            Err(e) => Err(e),
        }
    }

    /// Select a top level unit, which gives the panels listing its child units
    pub async fn select_unit(&mut self, unit_id: &str) -> Result<PanelSet> {
        let panels = self
            .post_panels(PATH_SELECT_UNIT, FIELD_UNIT_OID, unit_id)
            .await?;
        self.position = Position::Unit(unit_id.into());
        Ok(panels)
    }

    /// Navigate into a child unit, e.g. the daily menu
    pub async fn select_child_unit(&mut self, child_unit_id: &str) -> Result<PanelSet> {
        let panels = self
            .post_panels(PATH_SELECT_CHILD_UNIT, FIELD_UNIT_OID, child_unit_id)
            .await?;
        self.position = Position::ChildUnit(child_unit_id.into());
        Ok(panels)
    }

    /// Navigate into a meal group, which gives the panel with its items
    pub async fn select_menu(&mut self, menu_id: &str) -> Result<PanelSet> {
        let panels = self
            .post_panels(PATH_SELECT_MENU, FIELD_MENU_OID, menu_id)
            .await?;
        self.position = Position::Menu(menu_id.into());
        Ok(panels)
    }

    /// Wait the configured delay between requests, unless cancelled
    pub async fn pause(&self) -> Result<()> {
        self.sleep(self.opts.request_delay).await
    }

    /// End the session. The cookie jar and connections go away with the client.
    pub fn close(self) {
        debug!(position = %self.position, requests = self.step, "Closing portal session");
    }

    async fn post_panels(&mut self, path: &str, field: &str, value: &str) -> Result<PanelSet> {
        let url = self.opts.endpoint(path)?;
        trace!(%url, field, value, from = %self.position, "Navigating");

        let client = self.client.clone();
        let target = url.clone();
        let form = [(field.to_string(), value.to_string())];
        let body = self
            .send(&url, || client.post(target.clone()).form(&form))
            .await?;
        let panels = PanelSet::from_json(&body).map_err(|source| Error::Navigation {
            url: url.to_string(),
            source,
        })?;
        debug!(
            %url,
            panels = ?panels.iter().map(|p| (p.id.as_str(), p.len())).collect::<Vec<_>>(),
            "Received panels"
        );
        self.dump(path, &panels);
        Ok(panels)
    }

    /// Send a request and read its body, retrying transient failures of either with backoff.
    /// The request is rebuilt for every attempt, since a sent request is consumed.
    async fn send<F>(&mut self, url: &Url, build: F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        self.step += 1;
        let attempts = self.opts.retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.or_cancel(fetch_text(build())).await? {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };
            if attempt >= attempts || !is_transient_request_error(&err) {
                return Err(Error::Transport {
                    url: url.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }
            let wait = self.opts.backoff(attempt);
            warn!(%url, attempt, err = %err, ?wait, "Request failed, retrying");
            self.sleep(wait).await?;
        }
    }

    async fn or_cancel<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            out = fut => Ok(out),
        }
    }

    async fn sleep(&self, duration: Duration) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if duration.is_zero() {
            return Ok(());
        }
        self.or_cancel(tokio::time::sleep(duration)).await
    }

    fn dump(&self, path: &str, panels: &PanelSet) {
        let Some(dir) = self.opts.dump_dir.as_ref() else {
            return;
        };
        let step = path.rsplit('/').next().unwrap_or(path);
        for p in panels.iter() {
            let file = dump_path(dir, &self.unit_id, self.step, step, &p.id);
            if let Err(err) = fs::create_dir_all(dir).and_then(|_| fs::write(&file, p.html())) {
                warn!(%err, file = %file.display(), "Failed to dump panel");
            } else {
                trace!(file = %file.display(), "Dumped panel");
            }
        }
    }
}

async fn fetch_text(req: RequestBuilder) -> reqwest::Result<String> {
    req.send().await?.error_for_status()?.text().await
}

fn dump_path(dir: &Path, unit_id: &str, n: u32, step: &str, panel_id: &str) -> PathBuf {
    let panel_id: String = panel_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    dir.join(format!("{unit_id}-{n:02}-{step}-{panel_id}.html"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let opts = Opts::default();
        assert_eq!(
            "https://nutrition.sa.ucsb.edu/NetNutrition/Unit/SelectChildUnit",
            opts.endpoint(PATH_SELECT_CHILD_UNIT).unwrap().as_str()
        );
        let opts = Opts {
            base_url: Url::parse("http://127.0.0.1:8080/nn/").unwrap(),
            ..Default::default()
        };
        assert_eq!("http://127.0.0.1:8080/nn/1", opts.endpoint("/1").unwrap().as_str());
    }

    #[test]
    fn backoff_grows() {
        let opts = Opts {
            retry_backoff: Duration::from_millis(100),
            ..Default::default()
        };
        for (retry, min) in [(1, 100), (2, 200), (3, 400)] {
            let b = opts.backoff(retry);
            assert!(b >= Duration::from_millis(min), "{b:?}");
            assert!(b <= Duration::from_millis(min * 3 / 2), "{b:?}");
        }
    }

    #[test]
    fn dump_file_names() {
        assert_eq!(
            PathBuf::from("/tmp/d/5-02-SelectChildUnit-menuPanel.html"),
            dump_path(Path::new("/tmp/d"), "5", 2, "SelectChildUnit", "menuPanel")
        );
        assert_eq!(
            PathBuf::from("/tmp/d/5-10-SelectMenu-a_b.html"),
            dump_path(Path::new("/tmp/d"), "5", 10, "SelectMenu", "a/b")
        );
    }
}

use crate::{
    crawl,
    models::Unit,
    portal::DateFormats,
    session::{self, DEFAULT_BASE_URL, DEFAULT_ENTRY_PATH},
};
use anyhow::{Error, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{ErrorLevel, Verbosity};
use std::{io, path::PathBuf, time::Duration};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};
use url::Url;

#[derive(Debug, Clone, Default, ValueEnum)]
pub enum LogFormat {
    Normal,
    Compact,
    Pretty,
    #[default]
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// Log level verbosity
    #[command(flatten)]
    pub verbosity: Verbosity<ErrorLevel>,

    /// Which log formatter to use
    // env will pick up the value if the field name is given as the key in uppercase
    #[arg(short = 'f', long, env, default_value_t, value_enum)]
    pub log_format: LogFormat,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Crawl today's menus of the given units
    Crawl(CrawlArgs),
    /// Print the date labels that would be searched for
    DateLabels(DateLabelArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DateFormatArgs {
    /// Date to look for in the daily menus [default: today]
    #[arg(short, long)]
    pub date: Option<NaiveDate>,

    /// Extra strftime pattern for rendering the date label, tried after the built in ones
    #[arg(long = "date-format", env = "DATE_FORMATS", value_delimiter = ';')]
    pub date_formats: Vec<String>,

    /// Use only the patterns given with --date-format
    #[arg(long, requires = "date_formats")]
    pub only_date_formats: bool,
}

impl DateFormatArgs {
    pub fn formats(&self) -> Result<DateFormats> {
        let formats = if self.only_date_formats {
            DateFormats::new(self.date_formats.iter().cloned())?
        } else {
            DateFormats::default().extended(self.date_formats.iter().cloned())?
        };
        Ok(formats)
    }
}

#[derive(Debug, Clone, Args)]
pub struct DateLabelArgs {
    #[command(flatten)]
    pub dates: DateFormatArgs,
}

#[derive(Debug, Clone, Args)]
pub struct CrawlArgs {
    /// Unit to crawl, as ID or ID=NAME. Repeat for more units.
    #[arg(
        short,
        long = "unit",
        env = "UNITS",
        value_delimiter = ',',
        required = true
    )]
    pub units: Vec<Unit>,

    /// Root URL of the nutrition portal
    #[arg(long, env, default_value = DEFAULT_BASE_URL)]
    pub base_url: Url,

    /// Path below the base URL that starts a session
    #[arg(long, env, default_value = DEFAULT_ENTRY_PATH)]
    pub entry_path: String,

    #[command(flatten)]
    pub dates: DateFormatArgs,

    /// Timeout for each request
    #[arg(long, env, default_value = "15s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    /// Pause between meal requests within a unit
    #[arg(long, env, default_value = "250ms", value_parser = humantime::parse_duration)]
    pub request_delay: Duration,

    /// How many times to retry a request that failed transiently
    #[arg(long, env, default_value_t = 3)]
    pub retries: u32,

    /// Wait before the first retry, doubled for each following one
    #[arg(long, env, default_value = "500ms", value_parser = humantime::parse_duration)]
    pub retry_backoff: Duration,

    /// Write menus here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pretty print the menu JSON
    #[arg(long)]
    pub pretty: bool,

    /// Write a per unit status report with diagnostics to this file
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Save every received panel as HTML in this directory
    #[arg(long, env)]
    pub dump_dir: Option<PathBuf>,
}

impl CrawlArgs {
    pub fn opts(&self) -> Result<crawl::Opts> {
        Ok(crawl::Opts {
            session: session::Opts {
                base_url: self.base_url.clone(),
                entry_path: self.entry_path.clone(),
                request_timeout: self.request_timeout,
                request_delay: self.request_delay,
                retries: self.retries,
                retry_backoff: self.retry_backoff,
                dump_dir: self.dump_dir.clone(),
            },
            date_formats: self.dates.formats()?,
        })
    }
}

impl Cli {
    /// Parse from an explicit argument list instead of the process arguments
    pub fn try_parse_opts<I, T>(itr: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(itr).map_err(Error::from)
    }

    // this thin wrapper makes it possible to do the parsing without importing clap::Parser at the
    // call site
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Default level for the log filter, overridden per target by RUST_LOG
    fn level_filter(&self) -> LevelFilter {
        self.verbosity.tracing_level_filter()
    }

    pub fn init_logger(&self) -> Result<()> {
        let layer = match self.log_format {
            LogFormat::Json => fmt::layer().json().with_writer(io::stderr).boxed(),
            LogFormat::Pretty => fmt::layer().pretty().with_writer(io::stderr).boxed(),
            LogFormat::Compact => fmt::layer()
                .without_time()
                .compact()
                .with_writer(io::stderr)
                .boxed(),
            LogFormat::Normal => fmt::layer().with_writer(io::stderr).boxed(),
        };
        tracing_subscriber::registry()
            .with(
                EnvFilter::builder()
                    .with_default_directive(self.level_filter().into())
                    .from_env()?,
            )
            .with(layer)
            .init();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn crawl_args(args: &[&str]) -> CrawlArgs {
        let cli = Cli::try_parse_opts(["gauchogrub", "crawl"].iter().chain(args)).unwrap();
        match cli.command {
            Commands::Crawl(args) => args,
            c => panic!("unexpected command: {c:?}"),
        }
    }

    #[test]
    fn crawl_defaults() {
        let args = crawl_args(&["-u", "5=Portola", "--unit", "12"]);
        assert_eq!(
            vec![Unit::new("5", "Portola"), Unit::new("12", "Unit 12")],
            args.units
        );
        let opts = args.opts().unwrap();
        assert_eq!(DEFAULT_BASE_URL, opts.session.base_url.as_str());
        assert_eq!("1", opts.session.entry_path);
        assert_eq!(Duration::from_secs(15), opts.session.request_timeout);
        assert_eq!(Duration::from_millis(250), opts.session.request_delay);
        assert_eq!(3, opts.session.retries);
        assert_eq!(None, opts.session.dump_dir);
        assert_eq!(DateFormats::default(), opts.date_formats);
        assert!(!args.pretty);
    }

    #[test]
    fn comma_separated_units() {
        let args = crawl_args(&["--unit", "5=Portola,7=Carrillo"]);
        assert_eq!(2, args.units.len());
        assert_eq!("Carrillo", args.units[1].name);
    }

    #[test]
    fn durations_and_paths() {
        let args = crawl_args(&[
            "-u",
            "5",
            "--request-timeout",
            "2s 500ms",
            "--request-delay",
            "0s",
            "--retries",
            "0",
            "--dump-dir",
            "/tmp/panels",
            "--base-url",
            "http://127.0.0.1:9999/NetNutrition",
        ]);
        let opts = args.opts().unwrap();
        assert_eq!(Duration::from_millis(2500), opts.session.request_timeout);
        assert!(opts.session.request_delay.is_zero());
        assert_eq!(0, opts.session.retries);
        assert_eq!(Some(PathBuf::from("/tmp/panels")), opts.session.dump_dir);
        assert_eq!("127.0.0.1", opts.session.base_url.host_str().unwrap());
    }

    #[test]
    fn date_formats() {
        let args = crawl_args(&["-u", "5", "--date-format", "%d.%m.%Y", "--date", "2026-10-18"]);
        let formats = args.opts().unwrap().date_formats;
        assert_eq!(DateFormats::default().len() + 1, formats.len());
        assert_eq!(NaiveDate::from_ymd_opt(2026, 10, 18), args.dates.date);

        let args = crawl_args(&["-u", "5", "--date-format", "%d.%m.%Y", "--only-date-formats"]);
        let formats = args.opts().unwrap().date_formats;
        assert_eq!(
            vec!["18.10.2026"],
            formats.candidates(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap())
        );

        let args = crawl_args(&["-u", "5", "--date-format", "%A %Q"]);
        assert!(args.opts().is_err());
    }

    #[test]
    fn verbosity_flags() {
        let level = |args: &[&str]| {
            let mut argv = vec!["gauchogrub"];
            argv.extend_from_slice(args);
            argv.push("date-labels");
            Cli::try_parse_opts(argv).unwrap().level_filter()
        };
        assert_eq!(LevelFilter::ERROR, level(&[]));
        assert_eq!(LevelFilter::WARN, level(&["-v"]));
        assert_eq!(LevelFilter::DEBUG, level(&["-vvv"]));
        assert_eq!(LevelFilter::OFF, level(&["-q"]));
    }

    #[test]
    fn invalid_input_is_rejected() {
        assert!(Cli::try_parse_opts(["gauchogrub", "crawl", "-u", "abc"]).is_err());
        assert!(Cli::try_parse_opts(["gauchogrub", "crawl", "-u", "5", "--only-date-formats"]).is_err());
        assert!(Cli::try_parse_opts(["gauchogrub", "crawl", "-u", "5", "--base-url", "not a url"]).is_err());
    }
}

//! log4rs setup for the cursor engine.
//!
//! Two rolling files are produced under the chosen directory: `cursor.log` for
//! the root logger and `cursor_events.log` for the structured
//! `nexus_cursor::events` target.

use crate::utils::events::EVENT_TARGET;
use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::error::Error;
use std::path::{Path, PathBuf};

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_BYTES: u64 = 10 * 1024 * 1024;

/// Load a log4rs YAML file.
pub fn init_path(path: &Path) -> Result<(), Box<dyn Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

#[must_use]
pub fn level_filter(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, Box<dyn Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_BYTES)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?;
    Ok(appender)
}

/// Build (without installing) the logging config.
///
/// `events` controls whether cursor events get their own file; when off they
/// still flow to the root appender at the chosen level.
pub fn build_config(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    events: bool,
) -> Result<Config, Box<dyn Error>> {
    let base = match dir {
        Some(d) => PathBuf::from(d),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&base)?;
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = level_filter(level);

    let mut builder =
        Config::builder().appender(Appender::builder().build("app", Box::new(rolling(&base, "cursor", keep)?)));
    if events {
        builder = builder
            .appender(
                Appender::builder().build("events", Box::new(rolling(&base, "cursor_events", keep)?)),
            )
            .logger(
                Logger::builder()
                    .appender("events")
                    .additive(false)
                    .build(EVENT_TARGET, LevelFilter::Debug),
            );
    }
    Ok(builder.build(Root::builder().appender("app").build(lvl))?)
}

/// Install the logging config process-wide.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    events: bool,
) -> Result<(), Box<dyn Error>> {
    let config = build_config(dir, level, retention, events)?;
    log4rs::init_config(config)?;
    Ok(())
}

/// Configure logging from the environment:
/// - NEXUS_CURSOR_LOG_DIR
/// - NEXUS_CURSOR_LOG_LEVEL
/// - NEXUS_CURSOR_LOG_RETENTION
/// - NEXUS_CURSOR_EVENTS (1/true/yes)
pub fn configure_from_env() -> Result<(), Box<dyn Error>> {
    let dir = std::env::var("NEXUS_CURSOR_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("NEXUS_CURSOR_LOG_LEVEL").ok();
    let retention =
        std::env::var("NEXUS_CURSOR_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    let events = std::env::var("NEXUS_CURSOR_EVENTS")
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    configure_logging(dir.as_deref(), level.as_deref(), retention, events)
}

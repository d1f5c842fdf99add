use bson::Document;
use clap::Parser;
use nexus_cursor::memory::{MemoryCollection, StreamOp};
use nexus_cursor::{CursorConfig, CursorError, SortSpec, telemetry};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "nexus-cursor", version, about = "Run a resilient cursor over an NDJSON file", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). If omitted, NEXUS_CURSOR_CONFIG or ./nexus_cursor.toml is used when present.")]
    config: Option<PathBuf>,
    #[arg(long, help = "NDJSON file to load; one document per line")]
    file: PathBuf,
    #[arg(long, default_value = "{}", help = "Filter JSON (e.g., {\"age\": {\"$gte\": 21}})")]
    filter: String,
    #[arg(long, help = "Projection fields comma-separated; prefix with '-' to exclude (e.g., name,age or -secret)")]
    project: Option<String>,
    #[arg(long, help = "Sort spec comma-separated (e.g., age:desc,name)")]
    sort: Option<String>,
    #[arg(long, help = "Limit results; 0 means no limit")]
    limit: Option<i64>,
    #[arg(long, help = "Skip N results")]
    skip: Option<i64>,
    #[arg(long, help = "Batch size passed to the stream")]
    batch_size: Option<i32>,
    #[arg(long, help = "Retry bound for transient failures (overrides config/env)")]
    retries: Option<u32>,
    #[arg(long, default_value_t = 0, help = "Inject N transient failures on the first reads")]
    fail_first: u32,
    #[arg(long, help = "Print the query plan instead of results")]
    explain: bool,
    #[arg(long, help = "Print the number of matching records instead of results")]
    count: bool,
    #[arg(long, help = "Print cursor counters to stderr when done")]
    metrics: bool,
}

fn projection_from(list: &str) -> Document {
    let mut d = Document::new();
    for field in list.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        match field.strip_prefix('-') {
            Some(excluded) => d.insert(excluded, 0),
            None => d.insert(field, 1),
        };
    }
    d
}

fn load_ndjson(col: &MemoryCollection, path: &Path) -> Result<usize, CursorError> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut n = 0;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Document = serde_json::from_str(&line)
            .map_err(|e| CursorError::Json(format!("{}:{}: {e}", path.display(), lineno + 1)))?;
        col.insert(doc);
        n += 1;
    }
    Ok(n)
}

fn run(cli: Cli) -> Result<(), CursorError> {
    let mut cfg = CursorConfig::load(cli.config.as_deref())?;
    if let Some(r) = cli.retries {
        cfg.retries = r;
    }
    if cfg.log_dir.is_some()
        && let Err(e) = cfg.init_logging()
    {
        eprintln!("warning: logging not initialized: {e}");
    }

    let col = MemoryCollection::new("ndjson");
    let loaded = load_ndjson(&col, &cli.file)?;
    log::info!("loaded {loaded} documents from {}", cli.file.display());
    if cli.fail_first > 0 {
        col.faults().fail_next(
            StreamOp::Advance,
            cli.fail_first,
            CursorError::ConnectionLost("injected by --fail-first".into()),
        );
    }

    let filter: Document = serde_json::from_str(&cli.filter)?;
    let projection = cli.project.as_deref().map(projection_from).unwrap_or_default();
    let mut cursor = col.find_with_projection(filter, projection)?.with_config(&cfg);
    if let Some(s) = cli.sort.as_deref() {
        cursor.sort(SortSpec::parse_list(s)?)?;
    }
    if let Some(n) = cli.limit {
        cursor.limit(n)?;
    }
    if let Some(n) = cli.skip {
        cursor.skip(n)?;
    }
    if let Some(n) = cli.batch_size {
        cursor.batch_size(n)?;
    }

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    if cli.explain {
        writeln!(out, "{}", serde_json::to_string_pretty(&cursor.explain()?)?)?;
    } else if cli.count {
        writeln!(out, "{}", cursor.count(true)?)?;
    } else {
        for record in cursor.to_vec()? {
            writeln!(out, "{}", serde_json::to_string(&record.document())?)?;
        }
    }
    out.flush()?;
    if cli.metrics {
        eprint!("{}", telemetry::metrics_text());
    }
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

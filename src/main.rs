use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::Parser;

use cddis_fetch::{
    Archive, Batch, CancelFlag, DEFAULT_RETRIES, DateSpan, Environment, FileType, RequestTemplate,
    diagnose,
};

const LOG_DIR: &str = "logs";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Download GNSS broadcast ephemeris and IONEX files from NASA CDDIS",
    long_about = None
)]
struct Cli {
    /// Single date to download (YYYY-MM-DD).
    #[arg(long, conflicts_with_all = ["start", "end"], required_unless_present_any = ["start", "diagnose"])]
    date: Option<NaiveDate>,

    /// First date of an inclusive range (YYYY-MM-DD).
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,

    /// Last date of an inclusive range (YYYY-MM-DD).
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// rinex-v2-gps, rinex-v3-gnss, rinex-v4-gnss, ionex-v1 or ionex-v2.
    #[arg(long = "type", default_value = "rinex-v2-gps")]
    file_type: String,

    /// Output root; files land in <out>/<yyyy>/.
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Also write the decompressed file next to the download.
    #[arg(long)]
    decompress: bool,

    /// Do not download files that already exist locally.
    #[arg(long)]
    skip_existing: bool,

    /// Total attempts per file.
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Proxy URL for all requests (overrides HTTP(S)_PROXY).
    #[arg(long)]
    proxy: Option<String>,

    /// Do not try the alternate IONEX format when the requested one is missing.
    #[arg(long)]
    no_fallback: bool,

    /// Show a progress bar per download.
    #[arg(long)]
    progress: bool,

    /// Print a JSON run summary on stdout.
    #[arg(long)]
    json: bool,

    /// Debug-level logging for this tool.
    #[arg(short, long)]
    verbose: bool,

    /// Report credential, proxy and CA settings, then exit.
    #[arg(long)]
    diagnose: bool,
}

/// Log sink that mirrors every record to stderr and, when available, a file.
struct Tee {
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            if file.write_all(buf).is_err() {
                self.file = None;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        io::stderr().flush()
    }
}

fn init_logging(verbose: bool, log_name: &str) {
    let path = PathBuf::from(LOG_DIR).join(log_name);
    let file = fs::create_dir_all(LOG_DIR)
        .and_then(|_| fs::OpenOptions::new().create(true).append(true).open(&path));
    let (file, open_error) = match file {
        Ok(f) => (Some(f), None),
        Err(e) => (None, Some(e)),
    };

    let default_filter = if verbose { "info,cddis_fetch=debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Pipe(Box::new(Tee { file })))
        .try_init();

    if let Some(e) = open_error {
        log::warn!("cannot write log file {}: {}", path.display(), e);
    }
}

fn date_span(cli: &Cli) -> Result<DateSpan> {
    match (cli.date, cli.start, cli.end) {
        (Some(date), _, _) => Ok(DateSpan::Single(date)),
        (None, Some(start), Some(end)) => Ok(DateSpan::Range { start, end }),
        _ => bail!("either --date or both --start and --end are required"),
    }
}

fn run(cli: Cli) -> Result<i32> {
    let parsed = FileType::parse_key(&cli.file_type);
    let log_name = match &parsed {
        Ok((ft, _)) if ft.is_ionex() => "ionex_downloader.log",
        _ => "ephemeris_downloader.log",
    };
    init_logging(cli.verbose, log_name);

    let env = Environment::capture();
    let archive = Archive::cddis();

    if cli.diagnose {
        let report = diagnose(&env, &archive.auth_host);
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to encode diagnostic")?
            );
        } else {
            println!("{}", report);
        }
        return Ok(0);
    }

    let (file_type, alias) = parsed.context("invalid --type")?;
    if let Some(alias) = alias {
        log::warn!("file type `{}` is deprecated; use `{}`", alias, file_type);
    }
    let span = date_span(&cli)?;

    let mut template = RequestTemplate::new(file_type, &cli.out);
    template.decompress = cli.decompress;
    template.skip_existing = cli.skip_existing;
    template.retries = cli.retries;
    template.timeout = Duration::from_secs(cli.timeout);
    template.proxy = cli.proxy.clone();
    template.progress = cli.progress;

    let batch = Batch::http(template, archive, &env).context("failed to set up HTTP client")?;

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::warn!("interrupt received; stopping after the current file");
        handler_flag.cancel();
    }) {
        log::warn!("cannot install Ctrl-C handler: {}", e);
    }

    log::info!(
        "downloading {} into {} ({})",
        file_type,
        cli.out.display(),
        file_type.profile().description
    );
    let summary = batch
        .with_cancel(cancel)
        .with_fallback(!cli.no_fallback)
        .run(span, &env);

    if cli.json {
        println!("{}", summary.to_json().context("failed to encode run summary")?);
    }
    Ok(summary.exit_code())
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            1
        }
    };
    std::process::exit(code);
}

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

use pkgwatch::{
    attribution::{self, CommandProvider},
    collector::Sampler,
    config::Config,
    db::{self, UsageLog},
    index::FrequencyIndex,
    resolver::SearchPaths,
};

/// Executable usage collector.
#[derive(Parser)]
#[command(name = "pkgwatch", about = "Tracks how often installed executables run", version)]
struct Args {
    /// Show the collected data attributed to packages and exit.
    #[arg(short, long)]
    show: bool,

    /// Debug logging.
    #[arg(short, long)]
    debug: bool,

    /// Also collect memory-mapped files of each process.
    #[arg(short = 'm', long)]
    collect_mapped: bool,

    /// File the collected data is written to.
    #[arg(short = 'f', long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Seconds to sleep between collection cycles.
    #[arg(short, long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Path to the proc filesystem.
    #[arg(short = 'p', long, value_name = "PATH")]
    proc_dir: Option<String>,

    /// Config file path.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("pkgwatch={}", level).parse().unwrap());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> Result<Config> {
    if let Some(path) = &args.config {
        return Config::load(path)
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e));
    }
    let path = Config::config_path();
    if path.exists() {
        Ok(Config::load(&path).unwrap_or_else(|e| {
            warn!("failed to load config: {}, using defaults", e);
            Config::default()
        }))
    } else {
        debug!("no config file found, using defaults");
        Ok(Config::default())
    }
}

fn main() -> Result<()> {
    // Help and version exit 0; any argument error exits 1.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    init_logging(args.debug);

    let mut config = load_config(&args)?;
    if let Some(path) = args.log_file {
        config.log_file = path;
    }
    if let Some(interval) = args.interval {
        config.interval = interval;
    }
    if let Some(proc_dir) = args.proc_dir {
        config.proc_dir = proc_dir;
    }
    if args.collect_mapped {
        config.collect_mapped = true;
    }

    let log = UsageLog::new(config.log_file.clone());

    if args.show {
        return show_data(&log);
    }
    collect(&config, &log)
}

/// Report mode: attribute the persisted log to packages and print the result.
fn show_data(log: &UsageLog) -> Result<()> {
    let attributed = attribution::attribute(&CommandProvider::new(), log)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    db::write_index(&attributed, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Collection mode: sample once per interval until a stop signal arrives.
fn collect(config: &Config, log: &UsageLog) -> Result<()> {
    anyhow::ensure!(config.interval > 0, "interval must be a positive number of seconds");
    let search_paths = SearchPaths::from_env()?;

    let mut index = FrequencyIndex::new();
    log.load_into(&mut index);

    let sampler = Sampler::new(&config.proc_dir, search_paths)
        .with_mapped_files(config.collect_mapped)
        .with_ignored_prefixes(config.ignored_prefixes.clone());

    if let Some(parent) = config.log_file.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("failed to set signal handler: {}", e);
    }

    info!(
        "collecting from {} every {}s into {}",
        config.proc_dir,
        config.interval,
        config.log_file.display()
    );

    let interval = Duration::from_secs(config.interval);
    while running.load(Ordering::SeqCst) {
        debug!("collecting data");
        sampler.run_cycle(&mut index)?;

        debug!("writing {} entries to {}", index.len(), config.log_file.display());
        // Collected data is useless if it cannot be persisted.
        log.save(&index)
            .with_context(|| format!("cannot write {}", config.log_file.display()))?;

        if !running.load(Ordering::SeqCst) {
            break;
        }

        // Sleep in small slices so a stop signal is honored promptly, but
        // never between a completed cycle and its write.
        debug!("sleeping for {} second(s)", config.interval);
        let slice = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let nap = remaining.min(slice);
            std::thread::sleep(nap);
            remaining = remaining.saturating_sub(nap);
        }
    }

    info!("shutting down");
    Ok(())
}

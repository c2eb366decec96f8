// slogd: local syslog collector
// Listens on /dev/log, copies every message to the given log files and
// prints the most frequent one on SIGINT.
use anyhow::{Context, Result};
use clap::Parser;
use slogd::{
    Collector, CollisionPolicy, Config, Detach, FileFanout, FrequencyTable, PidFile,
    ShutdownController, ShutdownToken, UnixDatagramListener,
};
use std::env;
use std::io::{self, IsTerminal, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slogd")]
#[command(about = "Local syslog collector: fans messages out to files and reports the most common one", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Detach into the background (only honoured together with at least one sink)
    #[arg(short = 'f', long = "fork")]
    fork: bool,

    /// Datagram socket to listen on [default: /dev/log, env: SLOGD_SOCKET]
    #[arg(short, long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Number of frequency table buckets [default: 999, env: SLOGD_TABLE_CAPACITY]
    #[arg(long, value_name = "N")]
    capacity: Option<NonZeroUsize>,

    /// Bucket collision handling: faithful or separate [env: SLOGD_COLLISIONS]
    #[arg(long, value_name = "POLICY")]
    collisions: Option<CollisionPolicy>,

    /// Print every received datagram on stdout [env: SLOGD_ECHO]
    #[arg(long)]
    echo: bool,

    /// Write the daemon pid here once it is ready [env: SLOGD_PID_FILE]
    #[arg(long, value_name = "PATH")]
    pid_file: Option<PathBuf>,

    /// Log files to create; every accepted message is appended to each
    #[arg(value_name = "SINK")]
    sinks: Vec<PathBuf>,
}

impl Cli {
    /// Command-line flags take precedence over the environment.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(ref socket) = self.socket {
            config.socket_path = socket.clone();
        }
        if let Some(capacity) = self.capacity {
            config.table_capacity = capacity;
        }
        if let Some(collisions) = self.collisions {
            config.collisions = collisions;
        }
        if self.echo {
            config.echo_raw = true;
        }
        if let Some(ref pid_file) = self.pid_file {
            config.pid_file = Some(pid_file.clone());
        }
        config
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = cli.apply(Config::from_env());

    let detach = cli.fork && !cli.sinks.is_empty();
    if cli.fork && !detach {
        warn!("-f needs at least one sink, staying in the foreground");
    }

    // Detaching moves us to /, so relative paths must be resolved first
    let mut sinks = cli.sinks;
    if detach {
        sinks = sinks.iter().map(|p| absolute(p)).collect::<Result<_>>()?;
        config.socket_path = absolute(&config.socket_path)?;
        config.pid_file = config.pid_file.as_deref().map(absolute).transpose()?;
    }

    // Open and bind before detaching so failures reach the invoking shell
    let fanout = FileFanout::create(&sinks)?;
    let listener = UnixDatagramListener::bind(&config.socket_path)?;

    if detach {
        Detach::new()
            .keep_all(fanout.raw_fds())
            .keep_all(listener.as_raw_fd())
            .detach()
            .context("failed to detach")?;
    }

    let token = ShutdownToken::new().context("failed to create shutdown token")?;
    let _controller = ShutdownController::install(token.clone())?;
    let _pid_file = config.pid_file.as_ref().map(PidFile::create).transpose()?;

    let table = FrequencyTable::new(config.table_capacity, config.collisions);
    info!(
        sinks = fanout.len(),
        capacity = table.capacity(),
        collisions = %table.policy(),
        "collector started"
    );

    let mut collector = Collector::new(listener, fanout, table).echo_raw(config.echo_raw);
    let reason = collector.run(&token)?;
    info!(?reason, accepted = collector.accepted(), "receive loop stopped");

    let mut stdout = io::stdout().lock();
    collector
        .report()
        .write_line(&mut stdout)
        .and_then(|()| stdout.flush())
        .context("failed to print report")?;
    drop(stdout);
    collector.close()?;
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("failed to read current directory")?;
    Ok(cwd.join(path))
}

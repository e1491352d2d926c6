//! nmlock - run a command while the notmuch mail index is locked.
//!
//! Opens the index named by the notmuch configuration in exclusive write
//! mode, spawns COMMAND while the write lock is held, releases the lock
//! after the hold duration, and exits with COMMAND's exit status. A test
//! suite points a second program at the same index to observe its
//! behavior under lock contention.
//!
//! Every failure of the tool itself (usage, configuration, database
//! open) exits with code 1; only a normally-exited child's code is
//! forwarded. Diagnostics go to standard error.

use clap::Parser;
use nmlock_core::config::Config;
use nmlock_core::harness::{EXIT_FAILURE, Harness, HoldDuration};
use nmlock_core::process::CommandSpec;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Utility to test behaviour of programs while the notmuch database is
/// locked.
#[derive(Parser, Debug)]
#[command(name = "nmlock")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Hold the lock for N microseconds; random between 1ms and 10min
    /// when N is omitted
    #[arg(
        short = 's',
        long,
        value_name = "N",
        num_args = 0..=1,
        require_equals = true
    )]
    sleep: Option<Option<u64>>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Command to run while the lock is held
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required = true
    )]
    command: Vec<String>,
}

fn main() {
    // A usage error is this tool's own failure: report it with the
    // tool's failure sentinel rather than clap's default exit code.
    // `--help` and `--version` also land here and still exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_FAILURE } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        },
    };

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let hold = match cli.sleep {
        Some(Some(micros)) => HoldDuration::from_micros(micros),
        Some(None) | None => HoldDuration::random(),
    };

    let command = match CommandSpec::new(cli.command) {
        Ok(command) => command,
        Err(err) => {
            error!("{err}");
            std::process::exit(EXIT_FAILURE);
        },
    };

    // Configuration is resolved before the database is ever opened.
    let config = match Config::resolve() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            std::process::exit(EXIT_FAILURE);
        },
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to build tokio runtime: {err}");
            std::process::exit(EXIT_FAILURE);
        },
    };

    let harness = Harness::new(command, hold);
    match runtime.block_on(harness.run_with_config(&config)) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("{err}");
            std::process::exit(EXIT_FAILURE);
        },
    }
}

//! # ubsan-trigger
//!
//! Fires the UBSan report runtime's handlers from synthetic payloads, so the
//! sinks, policy handling and termination path can be checked without a
//! sanitizer-instrumented C program.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::field::{debug, display};
use ubsan_config::logging::{init_logging, LogLevel};
use ubsan_config::{log_cli_debug, log_cli_info, log_cli_warn, SinkPolicy, ENV_VAR_NAME};

mod cases;

use cases::Case;

/// Drive the UBSan report runtime by hand
#[derive(Parser)]
#[command(name = "ubsan-trigger")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log runtime decisions (policy, firings) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hit one check's handler as instrumented code would
    Trigger {
        #[arg(value_enum, value_name = "CASE")]
        case: Case,

        /// Use the `_abort` entry point (never returns)
        #[arg(long)]
        abort: bool,

        /// Fire from this many threads at once
        #[arg(short = 'j', long, default_value_t = 1)]
        threads: usize,

        /// Hits per thread
        #[arg(short, long, default_value_t = 1)]
        repeat: usize,

        /// Print the last recorded report to stdout afterwards
        #[arg(long)]
        show_last: bool,
    },

    /// Show how a LIBC_UBSAN value is interpreted
    Policy {
        /// Flag string; defaults to the current environment
        #[arg(value_name = "FLAGS", env = "LIBC_UBSAN")]
        flags: Option<String>,

        /// Reject characters outside [aAeElLoO] instead of ignoring them
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    });

    match cli.command {
        Commands::Trigger {
            case,
            abort,
            threads,
            repeat,
            show_last,
        } => cmd_trigger(case, abort, threads, repeat, show_last),
        Commands::Policy { flags, strict } => cmd_policy(flags.as_deref(), strict),
    }
}

fn cmd_trigger(
    case: Case,
    abort: bool,
    threads: usize,
    repeat: usize,
    show_last: bool,
) -> Result<()> {
    if threads == 0 || repeat == 0 {
        bail!("--threads and --repeat must both be at least 1");
    }
    if cases::always_fatal(case) {
        log_cli_debug!("case terminates regardless of policy", case = debug(case));
    }
    log_cli_info!(
        "firing handler",
        case = debug(case),
        abort = abort,
        threads = threads,
        repeat = repeat
    );

    let before = ubsan_rt::reports_emitted();
    std::thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                for _ in 0..repeat {
                    cases::fire(case, abort);
                }
            });
        }
    });
    let emitted = ubsan_rt::reports_emitted() - before;
    log_cli_info!("handler returned", reports = emitted);

    if show_last {
        let last = ubsan_rt::report::last_report().context("no report was recorded")?;
        println!(
            "{} {}:{}:{}: {}",
            last.kind, last.filename, last.line, last.column, last.message
        );
        println!("reports emitted: {emitted}");
    }
    Ok(())
}

fn cmd_policy(flags: Option<&str>, strict: bool) -> Result<()> {
    let policy = match flags {
        Some(flags) if strict => SinkPolicy::parse_strict(flags)
            .with_context(|| format!("invalid {ENV_VAR_NAME} value {flags:?}"))?,
        Some(flags) => {
            if let Err(err) = SinkPolicy::parse_strict(flags) {
                log_cli_warn!("ignoring characters in policy string", error = display(&err));
            }
            SinkPolicy::parse(flags.as_bytes())
        }
        None => SinkPolicy::DEFAULT,
    };
    println!("{policy}");
    Ok(())
}

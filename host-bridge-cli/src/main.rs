//! Host Bridge CLI Application
//!
//! Command-line front end for the host-bridge-core library. It exposes the
//! OS utilities directly and can load callback plugins from a shared library
//! to check that they register and evaluate the way the host would see them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use host_bridge_core::{os, ConstraintInput, ConstraintOutput};
use std::path::PathBuf;

mod config;
mod plugins;

use config::AppConfig;

/// Host Bridge - interop utilities for a numerical host runtime
#[derive(Parser, Debug)]
#[command(name = "host-bridge")]
#[command(about = "Inspect and exercise the host bridge", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report total and free physical memory
    MemInfo {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Raise the stack soft limit to BYTES
    Stack {
        #[arg(value_name = "BYTES")]
        bytes: u64,
    },

    /// Run a shell command and exit with its status
    Run {
        #[arg(value_name = "COMMAND", required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Test whether VALUE is NaN
    Isnan {
        #[arg(value_name = "VALUE", allow_hyphen_values = true)]
        value: f64,
    },

    /// Load the configured plugin library and register its symbols
    Plugins {
        /// Evaluate the constraint registered at INDEX
        #[arg(long, value_name = "INDEX")]
        constraint: Option<i64>,

        /// Positions (comma separated)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        pos: Vec<f64>,

        /// Velocities (comma separated, default all zero)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        velo: Vec<f64>,

        /// Time
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        t: f64,

        /// Auxiliary data (comma separated)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        data: Vec<f64>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::debug!("Host Bridge CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using bridge library v{}", host_bridge_core::VERSION);

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    match args.command {
        Command::MemInfo { json } => mem_info_command(json),
        Command::Stack { bytes } => stack_command(bytes),
        Command::Run { command } => run_command(&command.join(" "), &config),
        Command::Isnan { value } => {
            println!("{}", os::is_nan(value));
            Ok(())
        }
        Command::Plugins {
            constraint,
            pos,
            velo,
            t,
            data,
        } => plugins_command(&config, constraint, &pos, &velo, t, &data),
    }
}

fn mem_info_command(json: bool) -> Result<()> {
    let info = os::mem_info().context("Failed to query memory")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Total memory: {} bytes", info.total);
    match info.free {
        Some(free) => println!("Free memory:  {} bytes", free),
        None => println!("Free memory:  unknown"),
    }
    Ok(())
}

fn stack_command(bytes: u64) -> Result<()> {
    let outcome = os::increase_stack(bytes).context("Failed to adjust the stack limit")?;

    match outcome {
        os::StackOutcome::AlreadySufficient { soft } => {
            println!("Stack soft limit already {} bytes", soft)
        }
        os::StackOutcome::Raised { from, to } => {
            println!("Stack soft limit raised from {} to {} bytes", from, to)
        }
        os::StackOutcome::ExceedsHardLimit { hard } => {
            anyhow::bail!("{} bytes exceeds the hard stack limit of {} bytes", bytes, hard)
        }
    }
    Ok(())
}

fn run_command(command: &str, config: &AppConfig) -> Result<()> {
    log::debug!("Running: {}", command);
    let status = os::run_command(command.as_bytes(), config.bridge.command_buffer_len)
        .with_context(|| format!("Failed to run: {}", command))?;

    if let Some(signal) = status.signal() {
        log::warn!("Command terminated by signal {}", signal);
        std::process::exit(128 + signal);
    }
    std::process::exit(status.exit_code().unwrap_or(1));
}

fn plugins_command(
    config: &AppConfig,
    constraint: Option<i64>,
    pos: &[f64],
    velo: &[f64],
    t: f64,
    data: &[f64],
) -> Result<()> {
    let loaded = plugins::load_plugins(&config.plugins, config.bridge.clone())?;

    println!("Constraints ({}/{}):", loaded.constraints.len(), config.bridge.constraint_capacity);
    for registration in &loaded.constraints {
        println!("  #{:<3} {}", registration.index, registration.symbol);
    }
    println!("Potential callbacks ({}/{}):", loaded.potentials.len(), config.bridge.potential_capacity);
    for registration in &loaded.potentials {
        println!("  #{:<3} {}", registration.index, registration.symbol);
    }

    let Some(index) = constraint else {
        return Ok(());
    };

    let zeros;
    let velo = if velo.is_empty() {
        zeros = vec![0.0; pos.len()];
        &zeros[..]
    } else {
        velo
    };

    let mut gradient = vec![0.0; pos.len()];
    let mut output = ConstraintOutput::new(&mut gradient);
    let input = ConstraintInput { pos, velo, t, data };
    loaded
        .bridge
        .invoke_constraint(index, &input, &mut output)
        .with_context(|| format!("Failed to evaluate constraint #{}", index))?;

    println!("\nConstraint #{}", index);
    println!("  C     = {}", output.c);
    println!("  dC/dr = {:?}", output.dc_dr);
    println!("  dC/dt = {}", output.dc_dt);
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

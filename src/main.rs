// SPDX-License-Identifier: GPL-2.0
//! NU801 LED daemon
//!
//! Usage:
//!   nu801d "Cisco MX100-HW"      # Drive the LEDs of a supported board
//!   nu801d --list                # Show supported boards

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use nix::sys::signal::Signal;
use tracing::info;

use nu801d::{profile, signal, DaemonConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Userspace LED driver for the NumEn NU801 LED controller
#[derive(Parser)]
#[command(name = "nu801d", version = VERSION, about)]
struct Cli {
    /// Board identifier, e.g. "Cisco MX100-HW"
    #[arg(required_unless_present = "list")]
    device_id: Option<String>,

    /// List supported boards and exit
    #[arg(short, long)]
    list: bool,

    /// Override the per-bit delay of the board profile (nanoseconds)
    #[arg(long, value_name = "NS")]
    bit_delay_ns: Option<u64>,

    /// uleds control device
    #[arg(long, value_name = "PATH", default_value = nu801d::uleds::ULEDS_PATH)]
    uleds: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn do_list() {
    for hw in profile::SUPPORTED_HARDWARE {
        let mode = if hw.has_latch_line() { "3-wire" } else { "2-wire" };
        println!(
            "{} (board: {}, {}, {} LEDs, {})",
            hw.id,
            hw.board.unwrap_or("-"),
            hw.gpiochip,
            hw.channel_labels().count(),
            mode
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list {
        do_list();
        return Ok(());
    }

    setup_logging(cli.verbose);

    let device_id = cli.device_id.unwrap_or_default();
    let hw = profile::lookup(&device_id)?;
    info!("Found supported device: '{}'", hw.id);

    let wakeup = signal::install().context("Failed to install signal handlers")?;

    let config = DaemonConfig {
        uleds_path: cli.uleds,
        bit_delay: cli.bit_delay_ns.map(Duration::from_nanos),
    };
    let mut daemon = nu801d::start(hw, &config)
        .with_context(|| format!("Failed to set up '{}'", hw.id))?
        .with_wakeup(wakeup);

    daemon.run()?;

    exit_status(signal::received())
}

/// Map the signal that stopped the daemon to the process outcome
fn exit_status(sig: Option<Signal>) -> Result<()> {
    match sig {
        Some(sig) if !signal::is_clean_exit(sig) => bail!("Terminated by {}", sig),
        Some(sig) => info!("Exiting on {}", sig),
        None => info!("Exiting"),
    }
    Ok(())
}

//! Configure the 12-input SNAP pocket correlator and capture visibilities.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

use std::{
    net::{SocketAddr, ToSocketAddrs},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, UNIX_EPOCH},
};

use anyhow::Context;
use clap::Parser;
use fixed::types::U32F0;
use spoco::{
    acquisition::Acquisition,
    archive::{self, Archiver},
    baseline::{self, Baseline},
    correlator::{self, SnapPoco},
    transport::katcp::{Katcp, DEFAULT_PORT},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Configure the 12-input SNAP pocket correlator and capture accumulated
/// visibilities to disk
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Program the FPGA before capture (this does not perform ADC calibration)
    #[arg(short, long)]
    prog: bool,
    /// Which boffile to program
    #[arg(short, long, default_value = "spoco12_100_2017-03-17_1809.bof")]
    boffile: String,
    /// FFT shift schedule, decimal or 0x-prefixed hex
    #[arg(short, long, default_value = "0xffff", value_parser = parse_shift)]
    fftshift: u16,
    /// EQ value, applied to all inputs and channels
    #[arg(short, long, default_value_t = 100)]
    eq: u32,
    /// Number of spectra to accumulate
    #[arg(short, long, default_value_t = 1 << 20)]
    acc_len: u32,
    /// Comma separated list of visibilities to grab
    // The qualified Vec keeps clap treating this as one comma list rather
    // than a repeatable argument
    #[arg(short, long, default_value = "aa,bb,ab", value_parser = baseline::parse_list)]
    visibilities: std::vec::Vec<Baseline>,
    /// Time in seconds of each data file
    #[arg(short = 't', long, default_value_t = 600)]
    filetime: u64,
    /// SNAP hostname or IP
    #[arg(short, long, default_value = "10.10.10.101")]
    snap: String,
    /// Directory to write data files into
    #[arg(short, long, default_value = ".")]
    directory: PathBuf,
    /// Data file name prefix
    #[arg(long, default_value = archive::DEFAULT_PREFIX)]
    prefix: String,
}

fn parse_shift(s: &str) -> Result<u16, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x") {
        u16::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;

    let addr: SocketAddr = (cli.snap.as_str(), DEFAULT_PORT)
        .to_socket_addrs()?
        .next()
        .with_context(|| format!("could not resolve `{}`", cli.snap))?;
    info!(%addr, "connecting");
    let mut transport = Katcp::connect(addr)?;
    transport.watchdog()?;
    info!("connected");

    let poco = SnapPoco::new(transport);

    if cli.prog {
        info!(boffile = %cli.boffile, "programming");
        poco.program(&cli.boffile)?;
    }

    let clock_mhz = poco.estimate_clock()?;
    info!(clock_mhz, "estimated FPGA board clock");

    info!(schedule = %format!("{:#x}", cli.fftshift), "setting FFT shift");
    poco.set_fft_shift(cli.fftshift)?;

    info!(eq = cli.eq, "setting all EQ values");
    poco.set_eq_level(U32F0::from_num(cli.eq))?;

    let period = correlator::accumulation_period(cli.acc_len);
    info!(
        spectra = cli.acc_len,
        seconds = period.as_secs_f64(),
        "setting accumulation length"
    );
    poco.set_accumulation_length(cli.acc_len)?;

    let sync_time = poco.arm_and_sync()?;
    info!(
        unix_s = sync_time.duration_since(UNIX_EPOCH)?.as_secs_f64(),
        "triggered sync"
    );

    let archiver = Archiver::new(&cli.directory, &cli.prefix);
    let mut acquisition = Acquisition::new(
        poco,
        cli.visibilities,
        archiver,
        Duration::from_secs(cli.filetime),
    );
    info!("entering capture loop, Ctrl-C to stop");
    acquisition.run(&stop)?;
    Ok(())
}

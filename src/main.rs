use clap::Parser;
use env_logger::{Env, Target};
use log::info;
use std::fs::OpenOptions;
use std::path::PathBuf;
use zesarux_dap::dap;

/// Debug adapter for Z80 programs running in ZEsarUX.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Write the adapter log to this file instead of stderr.
    #[clap(long, env = "ZESARUX_DAP_LOG")]
    log_file: Option<PathBuf>,

    /// Serve DAP on this local TCP port instead of stdio.
    #[clap(long)]
    port: Option<u16>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> zesarux_dap::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let mut logger = env_logger::Builder::from_env(Env::default().default_filter_or(default_level));
    // stdout carries the DAP stream
    match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            logger.target(Target::Pipe(Box::new(file)));
        }
        None => {
            logger.target(Target::Stderr);
        }
    }
    logger.init();

    info!(target: "dap", "zesarux-dap {} started", env!("CARGO_PKG_VERSION"));
    dap::run_dap_mode(args.port)?;
    info!(target: "dap", "exiting");
    Ok(())
}

//! # cwnd-monitor
//!
//! Follows the kernel log (or replays a captured one) and writes the selected
//! metric from the tracking module as `<label>-KERNEL-<METRIC>.dat`. Runs until
//! the source closes or the process is terminated; every sample is flushed as
//! it is written, so an interrupted run leaves a usable file.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tcp_cc_bench::{
    cli::MonitorArgs,
    logging,
    monitor::{LogInput, LogTailer, MonitorConfig},
    series::OutputFiles,
};
use tracing::{debug, error, info};

fn main() -> ExitCode {
    let args = MonitorArgs::parse();

    // Held until main returns so the file writer flushes the final lines.
    let _guard = match logging::init(args.verbose, args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &MonitorArgs) -> Result<()> {
    debug!("Configuration: {:?}", args);
    let config = MonitorConfig::from_args(args)?;

    let outputs = OutputFiles::new(&config.output_dir, &config.label);
    let series = outputs.create_kernel_series(config.metric)?;
    let input = LogInput::open(&config.source)?;
    let tailer = LogTailer::new(config.metric, series);

    info!(
        "Extracting {} (id {}) from {} into {}",
        tailer.metric(),
        tailer.metric().id(),
        config.source,
        outputs.kernel_metric_path(tailer.metric()).display()
    );

    let stats = tailer.run(input)?;

    info!(
        "Log source closed: {} lines, {} samples, {} malformed",
        stats.lines, stats.emitted, stats.malformed
    );
    Ok(())
}

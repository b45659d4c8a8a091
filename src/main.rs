//! # cc-client
//!
//! Bulk-transfer client of the congestion-control harness.
//!
//! 1. **Parse arguments** and validate them into a `TransferConfig`
//! 2. **Initialize logging** on stderr, optionally mirrored to a file
//! 3. **Open the series files** under the output directory
//! 4. **Connect** with the requested congestion-control algorithm
//! 5. **Run the sampler** until the whole payload has been handed to the kernel
//! 6. **Write the run summary** unless `--no-summary` was given
//!
//! Any setup, send or `TCP_INFO` failure exits non-zero. Series files that
//! were already opened keep whatever was written before the failure.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tcp_cc_bench::{
    cli::ClientArgs,
    logging,
    results::RunSummary,
    sampler::{TransferConfig, TransferSampler},
    series::OutputFiles,
    transport::TcpProbe,
    utils,
};
use tracing::{debug, error, info};

fn main() -> ExitCode {
    let args = ClientArgs::parse();

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

fn run(args: &ClientArgs) -> Result<()> {
    debug!("Configuration: {:?}", args);
    let config = TransferConfig::from_args(args)?;

    let outputs = OutputFiles::new(&args.output_path, &args.label);
    let mut sinks = outputs.create_transfer_sinks()?;

    let probe = TcpProbe::connect(config.destination, &config.congestion_control)
        .context("Connection setup failed")?;
    info!(
        "Connected to {} with '{}'",
        probe.peer(),
        probe.congestion_control()
    );

    let report = TransferSampler::new(config.clone(), probe).run(&mut sinks)?;
    sinks.finish().context("Failed to close series files")?;

    info!("{} sent", utils::format_bytes(report.bytes_sent));
    info!(
        "Flow completed in {} ({} send calls, {})",
        utils::format_duration(report.flow_completion),
        report.send_calls,
        utils::format_mbps(report.average_rate_mbps())
    );
    info!(
        "RTT min/p50/p99/max: {:.2}/{:.2}/{:.2}/{:.2} ms over {} samples",
        report.rtt.min_ms, report.rtt.p50_ms, report.rtt.p99_ms, report.rtt.max_ms, report.rtt_samples
    );

    if !args.no_summary {
        RunSummary::new(&config, &report).write(&outputs.summary_path())?;
    }

    Ok(())
}

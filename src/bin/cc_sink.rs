//! # cc-sink
//!
//! Receiver for `cc-client`: accepts connections and discards the data until
//! interrupted with Ctrl-C.

use anyhow::Result;
use clap::Parser;
use tcp_cc_bench::{
    cli::SinkArgs,
    logging,
    sink::{DrainSink, SinkConfig},
};
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = SinkArgs::parse();
    let _guard = logging::init(args.verbose, None)?;
    debug!("Configuration: {:?}", args);

    let config = SinkConfig::from_args(&args)?;
    let sink = DrainSink::bind(&config).await?;

    sink.serve_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to wait for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

mod config;
mod records;

use anyhow::{Context, Result};
use clap::Parser;
use config::{CliConfig, Config};
use records::LabelledTx;
use std::fs::File;
use std::io;
use tracing::{info, warn};
use tx_handler::{BatchOutcome, TxHandler};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CliConfig::parse();

    resolve_batch(&config)?;

    info!("Processing completed successfully");

    Ok(())
}

fn resolve_batch<C: Config>(config: &C) -> Result<()> {
    let pool_file = File::open(config.pool_path()).context("Failed to open pool file")?;
    let pool = records::read_pool(pool_file).context("Failed to load pool snapshot")?;

    let batch_file = File::open(config.batch_path()).context("Failed to open batch file")?;
    let batch = records::read_batch(batch_file);

    info!(
        "Loaded {} unspent outputs and {} candidate transactions",
        pool.len(),
        batch.len()
    );

    let mut handler = TxHandler::new(&pool);
    let outcome = match handler.handle_batch(batch.iter().map(|t| t.tx.clone())) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(
                "Batch aborted at transaction {}, reporting {} transactions accepted before the fault",
                batch[e.position].label,
                e.outcome.accepted.len()
            );
            write_report(&batch, &e.outcome)?;

            return Err(e).context("Signature verification unavailable");
        }
    };

    info!(
        "Accepted {} transactions, rejected {}, pool now holds {} outputs",
        outcome.accepted.len(),
        outcome.rejected.len(),
        handler.pool().len()
    );

    write_report(&batch, &outcome)
}

fn write_report(batch: &[LabelledTx], outcome: &BatchOutcome) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::WriterBuilder::new().from_writer(handle);

    for record in records::report(batch, outcome) {
        writer
            .serialize(&record)
            .context("Failed to serialize report")?;
    }

    writer.flush().context("Failed to flush stdout")?;

    Ok(())
}

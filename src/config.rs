use clap::Parser;
use std::path::{Path, PathBuf};

/// Trait for reading configuration parameters
pub trait Config {
    fn pool_path(&self) -> &Path;
    fn batch_path(&self) -> &Path;
}

/// CLI configuration
#[derive(Parser, Debug)]
#[command(
    name = "utxo-handler",
    about = "Resolves a batch of candidate transactions against a UTXO pool snapshot",
    version
)]
pub struct CliConfig {
    /// Path to the CSV pool snapshot (`tx_hash,index,value,address`)
    #[arg(value_name = "POOL_FILE")]
    pool_file: PathBuf,

    /// Path to the CSV candidate batch (`tx,leg,prev_tx,index,value,address,signature`)
    #[arg(value_name = "BATCH_FILE")]
    batch_file: PathBuf,
}

impl Config for CliConfig {
    fn pool_path(&self) -> &Path {
        &self.pool_file
    }

    fn batch_path(&self) -> &Path {
        &self.batch_file
    }
}

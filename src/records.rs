//! CSV row formats for pool snapshots, candidate batches and batch reports.

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use tracing::warn;
use tx_handler::{BatchOutcome, Input, Output, PublicKey, Transaction, TxHash, Utxo, UtxoPool};

/// Pool snapshot row: `tx_hash,index,value,address`
#[derive(Debug, Clone, Deserialize)]
pub struct PoolRecord {
    pub tx_hash: String,
    pub index: u32,
    pub value: Decimal,
    pub address: String,
}

impl PoolRecord {
    fn into_entry(self) -> Result<(Utxo, Output)> {
        let tx_hash: TxHash = self.tx_hash.parse().context("Invalid tx_hash")?;
        let address: PublicKey = self.address.parse().context("Invalid address")?;

        Ok((
            Utxo::new(tx_hash, self.index),
            Output::new(self.value, address),
        ))
    }
}

/// Side of a transaction a batch row describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    Input,
    Output,
}

/// Batch row: `tx,leg,prev_tx,index,value,address,signature`.
///
/// Rows sharing `tx` form one transaction, legs in row order.
#[derive(Debug, Clone, Deserialize)]
pub struct LegRecord {
    pub tx: u32,
    pub leg: Leg,
    #[serde(default)]
    pub prev_tx: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl LegRecord {
    fn apply_to(&self, tx: &mut Transaction) -> Result<()> {
        match self.leg {
            Leg::Input => {
                let prev_tx: TxHash = self
                    .prev_tx
                    .as_deref()
                    .ok_or_else(|| anyhow!("Input requires prev_tx"))?
                    .parse()
                    .context("Invalid prev_tx")?;
                let index = self
                    .index
                    .ok_or_else(|| anyhow!("Input requires index"))?;
                let signature = match self.signature.as_deref() {
                    Some(signature) => hex::decode(signature).context("Invalid signature")?,
                    None => Vec::new(),
                };

                tx.push_input(Input {
                    prev_tx_hash: prev_tx,
                    output_index: index,
                    signature,
                });
            }
            Leg::Output => {
                let value = self
                    .value
                    .ok_or_else(|| anyhow!("Output requires value"))?;
                let address: PublicKey = self
                    .address
                    .as_deref()
                    .ok_or_else(|| anyhow!("Output requires address"))?
                    .parse()
                    .context("Invalid address")?;

                tx.add_output(Output::new(value, address));
            }
        }

        Ok(())
    }
}

/// Candidate transaction together with its batch label
#[derive(Debug, Clone)]
pub struct LabelledTx {
    pub label: u32,
    pub tx: Transaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Accepted,
    Rejected,
}

/// Report row: `tx,hash,status,pass,reason`
#[derive(Debug, Clone, Serialize)]
pub struct ReportRecord {
    pub tx: u32,
    pub hash: String,
    pub status: Status,
    pub pass: Option<usize>,
    pub reason: Option<String>,
}

fn reader<R: io::Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input)
}

/// Reads a pool snapshot. Any bad row fails the whole snapshot
pub fn read_pool<R: io::Read>(input: R) -> Result<UtxoPool> {
    reader(input)
        .deserialize::<PoolRecord>()
        .enumerate()
        .map(|(row, result)| {
            result
                .context("Failed to parse pool row")
                .and_then(PoolRecord::into_entry)
                .with_context(|| format!("Pool row {}", row + 1))
        })
        .collect()
}

/// Reads a candidate batch, keeping transactions in order of their first row.
///
/// Unparseable rows are skipped. A row that parses but cannot be applied
/// (bad hex, missing field for its leg) drops its whole transaction.
pub fn read_batch<R: io::Read>(input: R) -> Vec<LabelledTx> {
    let mut order = Vec::new();
    let mut building: HashMap<u32, Option<Transaction>> = HashMap::new();

    for result in reader(input).deserialize::<LegRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to parse batch row: {e}");
                continue;
            }
        };

        let slot = building.entry(record.tx).or_insert_with(|| {
            order.push(record.tx);
            Some(Transaction::new())
        });

        let Some(tx) = slot.as_mut() else {
            continue;
        };

        if let Err(e) = record.apply_to(tx) {
            warn!(tx = record.tx, "Dropping transaction: {e:#}");
            *slot = None;
        }
    }

    order
        .into_iter()
        .filter_map(|label| {
            building
                .remove(&label)
                .flatten()
                .map(|tx| LabelledTx { label, tx })
        })
        .collect()
}

/// One report row per resolved transaction: accepted ones in acceptance
/// order, then rejected ones in batch order.
///
/// `outcome` must come from resolving `batch` in order.
pub fn report(batch: &[LabelledTx], outcome: &BatchOutcome) -> Vec<ReportRecord> {
    let label = |position: usize| batch[position].label;

    let accepted = outcome.accepted.iter().map(|a| ReportRecord {
        tx: label(a.position),
        hash: a.tx.hash().to_string(),
        status: Status::Accepted,
        pass: Some(a.pass),
        reason: None,
    });

    let rejected = outcome.rejected.iter().map(|r| ReportRecord {
        tx: label(r.position),
        hash: r.tx.hash().to_string(),
        status: Status::Rejected,
        pass: None,
        reason: Some(r.reason.to_string()),
    });

    accepted.chain(rejected).collect()
}

use crate::transaction::{PublicKey, TxHash};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

/// Identifier of a transaction output: producing transaction hash plus output index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Utxo {
    tx_hash: TxHash,
    index: u32,
}

impl Utxo {
    pub const fn new(tx_hash: TxHash, index: u32) -> Self {
        Self { tx_hash, index }
    }

    pub const fn tx_hash(&self) -> &TxHash {
        &self.tx_hash
    }

    pub const fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for Utxo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

/// Transaction output: an amount locked to a recipient's verification key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub value: Decimal,
    pub address: PublicKey,
}

impl Output {
    pub const fn new(value: Decimal, address: PublicKey) -> Self {
        Self { value, address }
    }
}

/// Set of spendable outputs keyed by their identifier.
///
/// `Clone` is a deep copy: the handler clones the caller's snapshot so that
/// acceptance never touches the original.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoPool {
    utxos: HashMap<Utxo, Output>,
}

impl UtxoPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, utxo: &Utxo) -> bool {
        self.utxos.contains_key(utxo)
    }

    pub fn get(&self, utxo: &Utxo) -> Option<&Output> {
        self.utxos.get(utxo)
    }

    /// Inserts the output, replacing any previous entry under the same id
    pub fn add(&mut self, utxo: Utxo, output: Output) {
        self.utxos.insert(utxo, output);
    }

    /// Removes the entry if present. Removing an unknown id is a no-op
    pub fn remove(&mut self, utxo: &Utxo) {
        self.utxos.remove(utxo);
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Utxo, &Output)> {
        self.utxos.iter()
    }
}

impl FromIterator<(Utxo, Output)> for UtxoPool {
    fn from_iter<I: IntoIterator<Item = (Utxo, Output)>>(iter: I) -> Self {
        Self {
            utxos: iter.into_iter().collect(),
        }
    }
}

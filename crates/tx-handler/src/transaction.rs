use crate::utxo::{Output, Utxo};
use hex::FromHex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// SHA-256 digest identifying a transaction
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl FromStr for TxHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <[u8; 32]>::from_hex(s).map(Self)
    }
}

/// Raw ed25519 verification key bytes of an output's recipient.
///
/// The bytes are not checked to be a valid curve point here; that happens at
/// verification time.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl FromStr for PublicKey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <[u8; 32]>::from_hex(s).map(Self)
    }
}

/// Transaction input: a claim on a previous output plus the owner's signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub prev_tx_hash: TxHash,
    pub output_index: u32,
    pub signature: Vec<u8>,
}

impl Input {
    pub const fn new(prev_tx_hash: TxHash, output_index: u32) -> Self {
        Self {
            prev_tx_hash,
            output_index,
            signature: Vec::new(),
        }
    }

    /// Identifier of the output this input spends
    pub const fn utxo(&self) -> Utxo {
        Utxo::new(self.prev_tx_hash, self.output_index)
    }
}

/// Transaction made of ordered inputs and ordered outputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    inputs: Vec<Input>,
    outputs: Vec<Output>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, prev_tx_hash: TxHash, output_index: u32) {
        self.inputs.push(Input::new(prev_tx_hash, output_index));
    }

    pub fn push_input(&mut self, input: Input) {
        self.inputs.push(input);
    }

    pub fn add_output(&mut self, output: Output) {
        self.outputs.push(output);
    }

    /// Attaches a signature to the input at `index`. Returns false if there is no such input
    pub fn add_signature(&mut self, index: usize, signature: Vec<u8>) -> bool {
        match self.inputs.get_mut(index) {
            Some(input) => {
                input.signature = signature;
                true
            }
            None => false,
        }
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Bytes the owner of input `index` signs: the claimed output reference
    /// followed by every output of this transaction. Signatures are excluded.
    pub fn raw_data_to_sign(&self, index: usize) -> Option<Vec<u8>> {
        let input = self.inputs.get(index)?;

        let mut data = Vec::with_capacity(36 + self.outputs.len() * 48);
        data.extend_from_slice(input.prev_tx_hash.as_bytes());
        data.extend_from_slice(&input.output_index.to_be_bytes());
        for output in &self.outputs {
            encode_output(&mut data, output);
        }

        Some(data)
    }

    /// Content hash over all inputs (signatures included) and outputs
    pub fn hash(&self) -> TxHash {
        let mut hasher = Sha256::new();

        for input in &self.inputs {
            hasher.update(input.prev_tx_hash.as_bytes());
            hasher.update(input.output_index.to_be_bytes());
            let signature_len = u32::try_from(input.signature.len()).unwrap_or(u32::MAX);
            hasher.update(signature_len.to_be_bytes());
            hasher.update(&input.signature);
        }

        let mut outputs = Vec::with_capacity(self.outputs.len() * 48);
        for output in &self.outputs {
            encode_output(&mut outputs, output);
        }
        hasher.update(&outputs);

        TxHash(hasher.finalize().into())
    }
}

// Normalized so that 1.0 and 1.00 sign identically
fn encode_output(buf: &mut Vec<u8>, output: &Output) {
    buf.extend_from_slice(&output.value.normalize().serialize());
    buf.extend_from_slice(output.address.as_bytes());
}

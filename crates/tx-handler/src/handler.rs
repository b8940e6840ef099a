use crate::crypto::{Ed25519Verifier, SignatureVerifier};
use crate::error::{BatchError, Rejection, TxError, VerificationError};
use crate::transaction::Transaction;
use crate::utxo::{Utxo, UtxoPool};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Transaction accepted during a batch
#[derive(Debug, Clone)]
pub struct Accepted {
    /// Index of the transaction in the submitted batch
    pub position: usize,
    /// Pass (starting at 1) in which it was accepted
    pub pass: usize,
    pub tx: Transaction,
}

/// Transaction left over when a batch reached its fixed point
#[derive(Debug, Clone)]
pub struct Rejected {
    pub position: usize,
    pub tx: Transaction,
    /// Failure seen on the last pass
    pub reason: Rejection,
}

/// Result of resolving one batch
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// In acceptance order
    pub accepted: Vec<Accepted>,
    /// In batch order
    pub rejected: Vec<Rejected>,
    pub passes: usize,
}

/// Validates transactions against an owned UTXO pool and applies accepted ones
#[derive(Debug, Clone)]
pub struct TxHandler<V = Ed25519Verifier> {
    pool: UtxoPool,
    verifier: V,
}

impl TxHandler {
    /// Creates a handler over a private copy of `pool`
    pub fn new(pool: &UtxoPool) -> Self {
        Self::with_verifier(pool, Ed25519Verifier)
    }
}

impl<V: SignatureVerifier> TxHandler<V> {
    pub fn with_verifier(pool: &UtxoPool, verifier: V) -> Self {
        Self {
            pool: pool.clone(),
            verifier,
        }
    }

    pub const fn pool(&self) -> &UtxoPool {
        &self.pool
    }

    pub fn into_pool(self) -> UtxoPool {
        self.pool
    }

    /// Returns true if `tx` could be accepted against the current pool.
    ///
    /// Never mutates the pool. Fails only when signature verification
    /// itself is unavailable.
    pub fn is_valid_tx(&self, tx: &Transaction) -> Result<bool, VerificationError> {
        match self.check_tx(tx) {
            Ok(()) => Ok(true),
            Err(TxError::Rejected(_)) => Ok(false),
            Err(TxError::Verification(err)) => Err(err),
        }
    }

    /// Like [`Self::is_valid_tx`] but reports the first failed check.
    ///
    /// Per input, in order: no repeated claim, claimed output is in the pool,
    /// signature verifies under the claimed output's key. Then every output
    /// must be non-negative and the inputs must cover the outputs.
    pub fn check_tx(&self, tx: &Transaction) -> Result<(), TxError> {
        let mut claimed = HashSet::with_capacity(tx.inputs().len());
        let mut input_sum = Decimal::ZERO;

        for (index, input) in tx.inputs().iter().enumerate() {
            let utxo = input.utxo();

            if !claimed.insert(utxo) {
                return Err(Rejection::DuplicateInput { index, utxo }.into());
            }

            let spent = self
                .pool
                .get(&utxo)
                .ok_or(Rejection::MissingInput { index, utxo })?;

            let message = tx
                .raw_data_to_sign(index)
                .ok_or(Rejection::InvalidSignature { index })?;

            if !self
                .verifier
                .verify(&spent.address, &message, &input.signature)?
            {
                return Err(Rejection::InvalidSignature { index }.into());
            }

            input_sum = input_sum
                .checked_add(spent.value)
                .ok_or(Rejection::ValueOverflow)?;
        }

        let mut output_sum = Decimal::ZERO;

        for (index, output) in tx.outputs().iter().enumerate() {
            if output.value < Decimal::ZERO {
                return Err(Rejection::NegativeOutput {
                    index,
                    value: output.value,
                }
                .into());
            }

            output_sum = output_sum
                .checked_add(output.value)
                .ok_or(Rejection::ValueOverflow)?;
        }

        if input_sum < output_sum {
            return Err(Rejection::InsufficientInputs {
                inputs: input_sum,
                outputs: output_sum,
            }
            .into());
        }

        Ok(())
    }

    /// Resolves an unordered batch and returns the accepted transactions in
    /// acceptance order. See [`Self::handle_batch`].
    pub fn handle_txs(
        &mut self,
        candidates: impl IntoIterator<Item = Transaction>,
    ) -> Result<Vec<Transaction>, BatchError> {
        let outcome = self.handle_batch(candidates)?;

        Ok(outcome.accepted.into_iter().map(|a| a.tx).collect())
    }

    /// Accepts transactions in repeated passes over the pending list until a
    /// pass accepts nothing.
    ///
    /// Each acceptance updates the pool immediately, so within a pass the
    /// earlier of two conflicting transactions wins, and a transaction
    /// spending an output created later in the same pass becomes eligible on
    /// the next one. Leftovers are reported with the reason from their last
    /// attempt.
    ///
    /// A verification fault aborts the batch. Transactions accepted before
    /// the fault stay applied to the pool and are returned in the error.
    pub fn handle_batch(
        &mut self,
        candidates: impl IntoIterator<Item = Transaction>,
    ) -> Result<BatchOutcome, BatchError> {
        let mut pending: Vec<(usize, Transaction)> = candidates.into_iter().enumerate().collect();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut pass = 0;

        while !pending.is_empty() {
            pass += 1;
            let accepted_before = accepted.len();
            rejected = Vec::with_capacity(pending.len());

            for (position, tx) in pending {
                match self.try_accept(&tx) {
                    Ok(()) => {
                        debug!(pass, position, hash = %tx.hash(), "Accepted transaction");
                        accepted.push(Accepted { position, pass, tx });
                    }
                    Err(TxError::Rejected(reason)) => {
                        debug!(pass, position, %reason, "Deferred transaction");
                        rejected.push(Rejected {
                            position,
                            tx,
                            reason,
                        });
                    }
                    Err(TxError::Verification(fault)) => {
                        warn!(pass, position, %fault, "Batch aborted");
                        return Err(BatchError {
                            outcome: BatchOutcome {
                                accepted,
                                rejected: Vec::new(),
                                passes: pass,
                            },
                            position,
                            fault,
                        });
                    }
                }
            }

            let progress = accepted.len() - accepted_before;
            debug!(pass, progress, pending = rejected.len(), "Pass finished");

            if progress == 0 {
                break;
            }

            pending = std::mem::take(&mut rejected)
                .into_iter()
                .map(|r| (r.position, r.tx))
                .collect();
        }

        info!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            passes = pass,
            pool_size = self.pool.len(),
            "Batch resolved"
        );

        Ok(BatchOutcome {
            accepted,
            rejected,
            passes: pass,
        })
    }

    fn try_accept(&mut self, tx: &Transaction) -> Result<(), TxError> {
        self.inputs_in_pool(tx)?;
        self.check_tx(tx)?;
        self.apply(tx);

        Ok(())
    }

    fn inputs_in_pool(&self, tx: &Transaction) -> Result<(), Rejection> {
        match tx
            .inputs()
            .iter()
            .enumerate()
            .find(|(_, input)| !self.pool.contains(&input.utxo()))
        {
            Some((index, input)) => Err(Rejection::MissingInput {
                index,
                utxo: input.utxo(),
            }),
            None => Ok(()),
        }
    }

    fn apply(&mut self, tx: &Transaction) {
        for input in tx.inputs() {
            self.pool.remove(&input.utxo());
        }

        let hash = tx.hash();
        for (index, output) in (0u32..).zip(tx.outputs()) {
            self.pool.add(Utxo::new(hash, index), output.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{PublicKey, TxHash};
    use crate::utxo::Output;
    use ed25519_dalek::{Signer, SigningKey};

    const GENESIS: TxHash = TxHash::from_bytes([0; 32]);

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn address(key: &SigningKey) -> PublicKey {
        PublicKey::from_bytes(key.verifying_key().to_bytes())
    }

    fn coins(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    fn genesis_pool(owner: &SigningKey, values: &[i64]) -> UtxoPool {
        (0u32..)
            .zip(values)
            .map(|(index, value)| {
                (
                    Utxo::new(GENESIS, index),
                    Output::new(coins(*value), address(owner)),
                )
            })
            .collect()
    }

    fn spend(
        inputs: &[(TxHash, u32, &SigningKey)],
        outputs: &[(i64, &SigningKey)],
    ) -> Transaction {
        let mut tx = Transaction::new();
        for (hash, index, _) in inputs {
            tx.add_input(*hash, *index);
        }
        for (value, owner) in outputs {
            tx.add_output(Output::new(coins(*value), address(owner)));
        }
        for (index, (_, _, signer)) in inputs.iter().enumerate() {
            let message = tx.raw_data_to_sign(index).unwrap();
            tx.add_signature(index, signer.sign(&message).to_bytes().to_vec());
        }
        tx
    }

    struct UnavailableVerifier;

    impl SignatureVerifier for UnavailableVerifier {
        fn verify(&self, key: &PublicKey, _: &[u8], _: &[u8]) -> Result<bool, VerificationError> {
            Err(VerificationError::MalformedKey {
                key: key.to_string(),
            })
        }
    }

    #[test]
    fn test_valid_transaction() {
        let alice = key(1);
        let bob = key(2);
        let handler = TxHandler::new(&genesis_pool(&alice, &[10]));

        let tx = spend(&[(GENESIS, 0, &alice)], &[(6, &bob), (4, &alice)]);

        assert_eq!(handler.is_valid_tx(&tx), Ok(true));
    }

    #[test]
    fn test_missing_input() {
        let alice = key(1);
        let handler = TxHandler::new(&genesis_pool(&alice, &[10]));

        let tx = spend(&[(GENESIS, 1, &alice)], &[(5, &alice)]);

        assert_eq!(
            handler.check_tx(&tx),
            Err(TxError::Rejected(Rejection::MissingInput {
                index: 0,
                utxo: Utxo::new(GENESIS, 1),
            }))
        );
    }

    #[test]
    fn test_duplicate_input() {
        let alice = key(1);
        let handler = TxHandler::new(&genesis_pool(&alice, &[10]));

        let tx = spend(&[(GENESIS, 0, &alice), (GENESIS, 0, &alice)], &[(15, &alice)]);

        assert_eq!(
            handler.check_tx(&tx),
            Err(TxError::Rejected(Rejection::DuplicateInput {
                index: 1,
                utxo: Utxo::new(GENESIS, 0),
            }))
        );
    }

    #[test]
    fn test_signature_by_wrong_owner() {
        let alice = key(1);
        let mallory = key(3);
        let handler = TxHandler::new(&genesis_pool(&alice, &[10]));

        let tx = spend(&[(GENESIS, 0, &mallory)], &[(10, &mallory)]);

        assert_eq!(
            handler.check_tx(&tx),
            Err(TxError::Rejected(Rejection::InvalidSignature { index: 0 }))
        );
    }

    #[test]
    fn test_tampered_output_invalidates_signature() {
        let alice = key(1);
        let mallory = key(3);
        let handler = TxHandler::new(&genesis_pool(&alice, &[10]));

        let signed = spend(&[(GENESIS, 0, &alice)], &[(10, &alice)]);
        let mut tampered = Transaction::new();
        tampered.add_input(GENESIS, 0);
        tampered.add_output(Output::new(coins(10), address(&mallory)));
        tampered.add_signature(0, signed.inputs()[0].signature.clone());

        assert_eq!(handler.is_valid_tx(&tampered), Ok(false));
    }

    #[test]
    fn test_negative_output() {
        let alice = key(1);
        let handler = TxHandler::new(&genesis_pool(&alice, &[10]));

        let tx = spend(&[(GENESIS, 0, &alice)], &[(-5, &alice), (5, &alice)]);

        assert_eq!(
            handler.check_tx(&tx),
            Err(TxError::Rejected(Rejection::NegativeOutput {
                index: 0,
                value: coins(-5),
            }))
        );
    }

    #[test]
    fn test_outputs_exceed_inputs() {
        let alice = key(1);
        let handler = TxHandler::new(&genesis_pool(&alice, &[10]));

        let tx = spend(&[(GENESIS, 0, &alice)], &[(11, &alice)]);

        assert_eq!(
            handler.check_tx(&tx),
            Err(TxError::Rejected(Rejection::InsufficientInputs {
                inputs: coins(10),
                outputs: coins(11),
            }))
        );
    }

    #[test]
    fn test_fractional_sums_are_exact() {
        let alice = key(1);
        let pool: UtxoPool = [
            (
                Utxo::new(GENESIS, 0),
                Output::new(Decimal::new(1, 1), address(&alice)),
            ),
            (
                Utxo::new(GENESIS, 1),
                Output::new(Decimal::new(2, 1), address(&alice)),
            ),
        ]
        .into_iter()
        .collect();
        let handler = TxHandler::new(&pool);

        let mut tx = Transaction::new();
        tx.add_input(GENESIS, 0);
        tx.add_input(GENESIS, 1);
        tx.add_output(Output::new(Decimal::new(3, 1), address(&alice)));
        for index in 0..2 {
            let message = tx.raw_data_to_sign(index).unwrap();
            tx.add_signature(index, alice.sign(&message).to_bytes().to_vec());
        }

        assert_eq!(handler.is_valid_tx(&tx), Ok(true));
    }

    #[test]
    fn test_overflowing_outputs() {
        let alice = key(1);
        let handler = TxHandler::new(&genesis_pool(&alice, &[10]));

        let mut tx = Transaction::new();
        tx.add_input(GENESIS, 0);
        tx.add_output(Output::new(Decimal::MAX, address(&alice)));
        tx.add_output(Output::new(Decimal::MAX, address(&alice)));
        let message = tx.raw_data_to_sign(0).unwrap();
        tx.add_signature(0, alice.sign(&message).to_bytes().to_vec());

        assert_eq!(
            handler.check_tx(&tx),
            Err(TxError::Rejected(Rejection::ValueOverflow))
        );
    }

    #[test]
    fn test_no_inputs_no_outputs_is_valid() {
        let handler = TxHandler::new(&UtxoPool::new());

        assert_eq!(handler.is_valid_tx(&Transaction::new()), Ok(true));
    }

    #[test]
    fn test_validation_does_not_mutate_pool() {
        let alice = key(1);
        let pool = genesis_pool(&alice, &[10]);
        let handler = TxHandler::new(&pool);

        let tx = spend(&[(GENESIS, 0, &alice)], &[(10, &alice)]);

        assert_eq!(handler.is_valid_tx(&tx), Ok(true));
        assert_eq!(handler.is_valid_tx(&tx), Ok(true));
        assert_eq!(handler.pool(), &pool);
    }

    #[test]
    fn test_verification_fault_is_not_a_rejection() {
        let alice = key(1);
        let handler = TxHandler::with_verifier(&genesis_pool(&alice, &[10]), UnavailableVerifier);

        let tx = spend(&[(GENESIS, 0, &alice)], &[(10, &alice)]);

        assert!(handler.is_valid_tx(&tx).is_err());
        assert!(matches!(
            handler.check_tx(&tx),
            Err(TxError::Verification(_))
        ));
    }

    #[test]
    fn test_verification_fault_aborts_batch() {
        let alice = key(1);
        let mut handler =
            TxHandler::with_verifier(&genesis_pool(&alice, &[10]), UnavailableVerifier);

        let tx = spend(&[(GENESIS, 0, &alice)], &[(10, &alice)]);

        let err = handler.handle_txs([tx]).unwrap_err();

        assert_eq!(err.position, 0);
        assert!(err.outcome.accepted.is_empty());
        assert!(handler.pool().contains(&Utxo::new(GENESIS, 0)));
    }

    #[test]
    fn test_verification_fault_returns_earlier_acceptances() {
        let alice = key(1);
        let mut off_curve = [0u8; 32];
        off_curve[0] = 2;
        let mut handler = TxHandler::new(&genesis_pool(&alice, &[10]));

        let mut a = Transaction::new();
        a.add_input(GENESIS, 0);
        a.add_output(Output::new(coins(10), PublicKey::from_bytes(off_curve)));
        let message = a.raw_data_to_sign(0).unwrap();
        a.add_signature(0, alice.sign(&message).to_bytes().to_vec());

        let mut junk = Transaction::new();
        junk.add_input(a.hash(), 0);
        junk.add_output(Output::new(coins(10), address(&alice)));
        junk.add_signature(0, vec![0; 64]);

        let err = handler.handle_batch([a.clone(), junk]).unwrap_err();

        assert!(matches!(err.fault, VerificationError::MalformedKey { .. }));
        assert_eq!(err.position, 1);
        assert_eq!(err.outcome.accepted.len(), 1);
        assert_eq!(err.outcome.accepted[0].tx, a);
        assert!(!handler.pool().contains(&Utxo::new(GENESIS, 0)));
        assert!(handler.pool().contains(&Utxo::new(a.hash(), 0)));
    }

    #[test]
    fn test_handler_copies_pool() {
        let alice = key(1);
        let pool = genesis_pool(&alice, &[10]);
        let mut handler = TxHandler::new(&pool);

        let tx = spend(&[(GENESIS, 0, &alice)], &[(10, &alice)]);
        handler.handle_txs([tx]).unwrap();

        assert!(pool.contains(&Utxo::new(GENESIS, 0)));
        assert!(!handler.pool().contains(&Utxo::new(GENESIS, 0)));
    }

    #[test]
    fn test_outcome_reports_passes_and_reasons() {
        let alice = key(1);
        let bob = key(2);
        let mut handler = TxHandler::new(&genesis_pool(&alice, &[10]));

        let a = spend(&[(GENESIS, 0, &alice)], &[(10, &bob)]);
        let b = spend(&[(a.hash(), 0, &bob)], &[(10, &alice)]);
        let orphan = spend(&[(TxHash::from_bytes([9; 32]), 0, &alice)], &[(1, &alice)]);

        let outcome = handler
            .handle_batch([b.clone(), orphan.clone(), a.clone()])
            .unwrap();

        let accepted: Vec<_> = outcome
            .accepted
            .iter()
            .map(|a| (a.position, a.pass))
            .collect();
        assert_eq!(accepted, vec![(2, 1), (0, 2)]);
        assert_eq!(outcome.passes, 3);

        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].position, 1);
        assert_eq!(outcome.rejected[0].tx, orphan);
        assert!(matches!(
            outcome.rejected[0].reason,
            Rejection::MissingInput { index: 0, .. }
        ));
    }

    #[test]
    fn test_forged_signature_carried_then_rejected() {
        let alice = key(1);
        let mallory = key(3);
        let pool = genesis_pool(&alice, &[10, 5]);
        let mut handler = TxHandler::new(&pool);

        let forged = spend(&[(GENESIS, 1, &mallory)], &[(5, &mallory)]);
        let a = spend(&[(GENESIS, 0, &alice)], &[(10, &alice)]);

        let outcome = handler.handle_batch([forged.clone(), a.clone()]).unwrap();

        assert_eq!(outcome.passes, 2);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].tx, a);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].position, 0);
        assert_eq!(outcome.rejected[0].tx, forged);
        assert_eq!(
            outcome.rejected[0].reason,
            Rejection::InvalidSignature { index: 0 }
        );
        assert!(handler.pool().contains(&Utxo::new(GENESIS, 1)));
        assert!(!handler.pool().contains(&Utxo::new(forged.hash(), 0)));
    }

    #[test]
    fn test_empty_batch() {
        let mut handler = TxHandler::new(&UtxoPool::new());

        let outcome = handler.handle_batch(Vec::<Transaction>::new()).unwrap();

        assert!(outcome.accepted.is_empty());
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.passes, 0);
    }
}

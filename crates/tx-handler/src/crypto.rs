use crate::error::VerificationError;
use crate::transaction::PublicKey;
use ed25519_dalek::{Signature, VerifyingKey};

/// Trait for checking an input signature against the spent output's key
pub trait SignatureVerifier {
    /// `Ok(false)` means the signature does not authorize the message.
    /// `Err` means verification itself could not run.
    fn verify(
        &self,
        key: &PublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, VerificationError>;
}

/// Ed25519 signature verifier
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(
        &self,
        key: &PublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, VerificationError> {
        let verifying_key = VerifyingKey::from_bytes(key.as_bytes()).map_err(|_| {
            VerificationError::MalformedKey {
                key: key.to_string(),
            }
        })?;

        // A signature of the wrong length is the signer's fault, not ours
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };

        Ok(verifying_key.verify_strict(message, &signature).is_ok())
    }
}

//! Account key pairs and shard-targeted key generation

use crate::types::{decode_fixed, Address, DecodeError, ShardId, SHARD_COUNT};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{CryptoRng, RngCore};
use std::fmt;
use std::str::FromStr;

/// Key errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("malformed private key: {0}")]
    Malformed(#[from] DecodeError),
    #[error("shard {0} is out of range")]
    InvalidShard(ShardId),
}

/// Signing key plus the address derived from it
#[derive(Clone)]
pub struct LedgerKeypair {
    signing: SigningKey,
    address: Address,
}

impl LedgerKeypair {
    pub fn from_signing_key(signing: SigningKey) -> Self {
        let address = Address::new(signing.verifying_key().to_bytes());
        Self { signing, address }
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_signing_key(SigningKey::generate(rng))
    }

    /// Draw key pairs until one lands on `shard`
    pub fn generate_on_shard<R: RngCore + CryptoRng>(
        shard: ShardId,
        rng: &mut R,
    ) -> Result<Self, KeyError> {
        if shard == 0 || shard > SHARD_COUNT {
            return Err(KeyError::InvalidShard(shard));
        }
        loop {
            let keypair = Self::generate(rng);
            if keypair.shard() == shard {
                return Ok(keypair);
            }
        }
    }

    /// Parse a base58-encoded 32 byte secret
    pub fn from_secret_str(s: &str) -> Result<Self, KeyError> {
        let secret = decode_fixed::<32>(s.trim())?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&secret)))
    }

    /// Base58 form of the secret, as read by [`LedgerKeypair::from_secret_str`]
    pub fn secret_string(&self) -> String {
        bs58::encode(self.signing.to_bytes()).into_string()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn shard(&self) -> ShardId {
        self.address.shard()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

impl FromStr for LedgerKeypair {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_secret_str(s)
    }
}

impl fmt::Debug for LedgerKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerKeypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Verify `signature` over `message` against the key behind `address`
pub fn verify_signature(address: &Address, message: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(address.as_bytes()) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(signature)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_on_shard() {
        let mut rng = rand::thread_rng();
        for shard in 1..=SHARD_COUNT {
            let keypair = LedgerKeypair::generate_on_shard(shard, &mut rng).unwrap();
            assert_eq!(keypair.shard(), shard);
        }
        assert_eq!(
            LedgerKeypair::generate_on_shard(0, &mut rng).unwrap_err(),
            KeyError::InvalidShard(0)
        );
        assert_eq!(
            LedgerKeypair::generate_on_shard(SHARD_COUNT + 1, &mut rng).unwrap_err(),
            KeyError::InvalidShard(SHARD_COUNT + 1)
        );
    }

    #[test]
    fn test_secret_roundtrip_keeps_address() {
        let keypair = LedgerKeypair::generate(&mut rand::thread_rng());
        let line = format!("  {}\r", keypair.secret_string());
        let parsed: LedgerKeypair = line.parse().unwrap();
        assert_eq!(parsed.address(), keypair.address());
    }

    #[test]
    fn test_malformed_secret() {
        assert!(matches!(
            LedgerKeypair::from_secret_str("not-a-key"),
            Err(KeyError::Malformed(_))
        ));
    }

    #[test]
    fn test_debug_hides_secret() {
        let keypair = LedgerKeypair::generate(&mut rand::thread_rng());
        let debug = format!("{:?}", keypair);
        assert!(!debug.contains(&keypair.secret_string()));
    }
}

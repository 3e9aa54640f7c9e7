//! Core ledger types shared by every client implementation

use crate::keys::{verify_signature, LedgerKeypair};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of shards the address space is split into
pub const SHARD_COUNT: u32 = 4;

/// Shard identifier, in `1..=SHARD_COUNT`
pub type ShardId = u32;

/// Errors decoding base58 identifiers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base58: {0}")]
    InvalidBase58(String),
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}

pub(crate) fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], DecodeError> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| DecodeError::InvalidBase58(e.to_string()))?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| DecodeError::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}

macro_rules! base58_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_bytes(self) -> [u8; $len] {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&bs58::encode(self.0).into_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

base58_id!(
    /// Account address: the ed25519 verifying key of the account
    Address,
    32
);

base58_id!(
    /// Transaction hash: blake3 over the borsh-encoded transfer
    TxHash,
    32
);

impl Address {
    /// Shard this address belongs to
    pub fn shard(&self) -> ShardId {
        let sum: u32 = self.0.iter().map(|b| u32::from(*b)).sum();
        sum % SHARD_COUNT + 1
    }
}

/// A simple value transfer
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
}

impl Transfer {
    /// Canonical encoding used for hashing and signing
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("Transfer serialization should not fail")
    }

    pub fn hash(&self) -> TxHash {
        TxHash(*blake3::hash(&self.to_bytes()).as_bytes())
    }

    /// Sign with the sender's key pair
    pub fn sign(self, keypair: &LedgerKeypair) -> SignedTransfer {
        let hash = self.hash();
        let signature = keypair.sign(hash.as_bytes());
        SignedTransfer {
            transfer: self,
            hash,
            signature,
        }
    }
}

/// A transfer plus its hash and the sender's signature over that hash
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignedTransfer {
    pub transfer: Transfer,
    pub hash: TxHash,
    pub signature: [u8; 64],
}

impl SignedTransfer {
    /// Check the hash matches the payload and the signature matches the sender
    pub fn verify(&self) -> bool {
        self.transfer.hash() == self.hash
            && verify_signature(&self.transfer.from, self.hash.as_bytes(), &self.signature)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("SignedTransfer serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }

    /// Wire form for `ledger_sendTransaction`
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    pub fn from_base64(s: &str) -> Result<Self, DecodeError> {
        let bytes = BASE64
            .decode(s)
            .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes).map_err(|e| DecodeError::InvalidEncoding(e.to_string()))
    }
}

/// Transaction details reported by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfo {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    #[serde(rename = "accountNonce")]
    pub nonce: u64,
}

/// Where a node currently sees a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxLookup {
    /// Included in a block
    Block(TxInfo),
    /// Waiting in the node's pending pool
    Pool(TxInfo),
    /// Neither in a block nor in the pool
    Unknown,
}

impl TxLookup {
    pub fn is_included(&self) -> bool {
        matches!(self, TxLookup::Block(_))
    }
}

/// Node identity, used to learn which shard an endpoint serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub coinbase: Address,
}

impl NodeInfo {
    pub fn shard(&self) -> ShardId {
        self.coinbase.shard()
    }
}

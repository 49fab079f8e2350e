use blake3::hash as blake3_hash;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    convert::TryInto,
    fmt::{Display, Error, Formatter},
    hash::Hasher,
    str::FromStr,
};

pub const HASH_SIZE: usize = 32; // 32 bytes / 256 bits

/// Domain separator for contract addresses (CREATE2-style)
const CONTRACT_ADDRESS_PREFIX: u8 = 0xff;

#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    pub const fn zero() -> Self {
        Hash::new([0; HASH_SIZE])
    }

    pub const fn max() -> Self {
        Hash::new([u8::MAX; HASH_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; HASH_SIZE]
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; HASH_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Hash {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| "Invalid hex string")?;
        let bytes: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| "Invalid hash")?;
        Ok(Hash::new(bytes))
    }
}

// Hash a byte array using the blake3 algorithm
#[inline(always)]
pub fn hash(value: &[u8]) -> Hash {
    let result: [u8; HASH_SIZE] = blake3_hash(value).into();
    Hash(result)
}

/// Compute deterministic contract address (CREATE2-style)
///
/// Formula: address = blake3(0xff || deployer || deployer_nonce || code_name)
///
/// The deployer nonce makes two deployments of the same contract by the
/// same account land on different addresses.
pub fn compute_contract_address(deployer: &Hash, deployer_nonce: u64, code_name: &str) -> Hash {
    let mut data = Vec::with_capacity(1 + HASH_SIZE + 8 + code_name.len());
    data.push(CONTRACT_ADDRESS_PREFIX);
    data.extend_from_slice(deployer.as_bytes());
    data.extend_from_slice(&deployer_nonce.to_le_bytes());
    data.extend_from_slice(code_name.as_bytes());
    hash(&data)
}

impl std::hash::Hash for Hash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl AsRef<Hash> for Hash {
    fn as_ref(&self) -> &Hash {
        self
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", &self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = <String as Deserialize>::deserialize(deserializer)?;
        if hex.len() != HASH_SIZE * 2 {
            return Err(SerdeError::custom("Invalid hex length"));
        }

        let decoded_hex = hex::decode(hex).map_err(SerdeError::custom)?;
        let bytes: [u8; 32] = decoded_hex
            .try_into()
            .map_err(|_| SerdeError::custom("Could not transform hex to bytes array for Hash"))?;
        Ok(Hash::new(bytes))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<'a> From<Hash> for Cow<'a, Hash> {
    fn from(value: Hash) -> Self {
        Cow::Owned(value)
    }
}

impl<'a> From<&'a Hash> for Cow<'a, Hash> {
    fn from(value: &'a Hash) -> Self {
        Cow::Borrowed(value)
    }
}

use crate::crypto::{Hash, HASH_SIZE};

use super::{ContractEnvironment, ContractError};

/// prefix || account
pub fn account_key(prefix: u8, account: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + HASH_SIZE);
    key.push(prefix);
    key.extend_from_slice(account.as_bytes());
    key
}

/// prefix || first || second
pub fn pair_key(prefix: u8, first: &Hash, second: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + HASH_SIZE * 2);
    key.push(prefix);
    key.extend_from_slice(first.as_bytes());
    key.extend_from_slice(second.as_bytes());
    key
}

/// Read a little-endian u64, missing slots read as zero.
pub fn read_u64(env: &mut dyn ContractEnvironment, key: &[u8]) -> Result<u64, ContractError> {
    match env.storage_read(key)? {
        Some(bytes) => {
            let bytes: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| ContractError::InvalidInput(format!("corrupt u64 slot of {} bytes", bytes.len())))?;
            Ok(u64::from_le_bytes(bytes))
        }
        None => Ok(0),
    }
}

/// Write a little-endian u64. Zero clears the slot.
pub fn write_u64(env: &mut dyn ContractEnvironment, key: &[u8], value: u64) -> Result<(), ContractError> {
    if value == 0 {
        env.storage_delete(key)
    } else {
        env.storage_write(key, value.to_le_bytes().to_vec())
    }
}

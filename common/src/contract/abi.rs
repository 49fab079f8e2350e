use borsh::{BorshDeserialize, BorshSerialize};

use super::ContractError;

/// Entry point selector
pub type EntryId = u16;

/// Decode borsh arguments, rejecting trailing bytes.
pub fn decode_args<T: BorshDeserialize>(input: &[u8]) -> Result<T, ContractError> {
    borsh::from_slice(input).map_err(|e| ContractError::InvalidInput(e.to_string()))
}

pub fn encode_return<T: BorshSerialize>(value: &T) -> Result<Vec<u8>, ContractError> {
    borsh::to_vec(value).map_err(|e| ContractError::InvalidInput(e.to_string()))
}

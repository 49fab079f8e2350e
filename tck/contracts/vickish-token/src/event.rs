use borsh::{BorshDeserialize, BorshSerialize};
use savings_common::crypto::Hash;

pub const TOPIC_TRANSFER: &str = "Transfer";
pub const TOPIC_APPROVAL: &str = "Approval";

/// Mints are reported with `from` set to the zero address.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TransferEvent {
    pub from: Hash,
    pub to: Hash,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ApprovalEvent {
    pub owner: Hash,
    pub spender: Hash,
    pub amount: u64,
}

use borsh::{BorshDeserialize, BorshSerialize};
use savings_common::crypto::Hash;

pub const TOPIC_DEPOSIT: &str = "DepositSuccessful";
pub const TOPIC_WITHDRAW: &str = "WithdrawSuccessful";

/// Payload of both savings events. `asset` is the token address, or the
/// native asset id for native coin movements.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SavingsEvent {
    pub account: Hash,
    pub asset: Hash,
    pub amount: u64,
}

use crate::crypto::Hash;

// Native coin (plaintext balances held by the ledger itself)
pub const NATIVE_ASSET: Hash = Hash::zero();

// Native coin decimals
pub const COIN_DECIMALS: u8 = 8;
// 10^8 base units = 1.00000000 coin
pub const COIN_VALUE: u64 = 10u64.pow(COIN_DECIMALS as u32);

// ===== GAS SCHEDULE =====
//
// Flat costs charged by the runtime for each host operation.
// A transaction pays gas_used * gas_price in native base units.

pub const GAS_BASE_TRANSACTION: u64 = 21_000;
pub const GAS_STORAGE_READ: u64 = 200;
pub const GAS_STORAGE_WRITE: u64 = 5_000;
pub const GAS_STORAGE_DELETE: u64 = 500;
// Refunded when a write clears a slot
pub const GAS_STORAGE_CLEAR_REFUND: u64 = 2_400;
pub const GAS_NATIVE_TRANSFER: u64 = 2_300;
pub const GAS_INNER_CALL: u64 = 700;
pub const GAS_EVENT: u64 = 375;
pub const GAS_EVENT_PER_BYTE: u64 = 8;

pub const DEFAULT_GAS_LIMIT: u64 = 3_000_000;
pub const DEFAULT_GAS_PRICE: u64 = 1;

// Maximum depth of nested contract calls (the entry call is depth 1)
pub const MAX_CALL_DEPTH: usize = 16;

// Maximum size of a single event payload
pub const MAX_EVENT_DATA_SIZE: usize = 1024;

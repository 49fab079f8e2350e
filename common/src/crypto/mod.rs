mod hash;

pub use hash::{compute_contract_address, hash, Hash, HASH_SIZE};

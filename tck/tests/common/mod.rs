// Shared helpers for the savings integration tests

use savings_tck::fixtures::SavingsFixture;

/// Install env_logger once per test binary; RUST_LOG controls the level.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fresh fixture with logging enabled
#[allow(dead_code)]
pub async fn setup() -> SavingsFixture {
    init_logger();
    SavingsFixture::deploy()
        .await
        .expect("savings fixture should deploy")
}

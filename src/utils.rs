use std::sync::atomic::{AtomicU64, Ordering};

static TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique transaction ID for log correlation
pub fn next_transaction_id() -> u64 {
    TRANSACTION_ID.fetch_add(1, Ordering::SeqCst)
}

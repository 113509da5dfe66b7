use std::sync::Mutex;

use cached::{Cached, TimedCache};

use crate::transfer::TransferResponse;

/// How long a memoized transfer response stays replayable from memory.
pub const TTL_SECONDS: u64 = 24 * 60 * 60;

/// Read-through cache of terminal transfer responses, keyed by idempotency
/// key. A latency optimization only: correctness of idempotent replay rests
/// on the unique constraint in `transaction_logs`, so losing this cache (or
/// all of it) never produces a duplicate transfer.
pub struct ResponseCache {
	entries: Mutex<TimedCache<String, TransferResponse>>,
}

impl ResponseCache {
	pub fn new() -> Self {
		ResponseCache {
			entries: Mutex::new(TimedCache::with_lifespan(TTL_SECONDS)),
		}
	}

	fn cache_key(idempotency_key: &str) -> String {
		format!("idempotency:{}", idempotency_key)
	}

	pub fn get(&self, idempotency_key: &str) -> Option<TransferResponse> {
		let mut entries = self.entries.lock().ok()?;
		entries.cache_get(&Self::cache_key(idempotency_key)).cloned()
	}

	pub fn store(&self, idempotency_key: &str, response: TransferResponse) {
		if let Ok(mut entries) = self.entries.lock() {
			entries.cache_set(Self::cache_key(idempotency_key), response);
		}
	}
}

impl Default for ResponseCache {
	fn default() -> Self {
		ResponseCache::new()
	}
}

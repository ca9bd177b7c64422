//! Mirror selection for the mirrored metadata API.

use rand::Rng;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::upstream::{RetryPolicy, Timeouts, UpstreamClient};

/// Draws up to `k` distinct entries from `pool` in random order.
pub fn select_instances<'a, R>(pool: &'a [String], k: usize, rng: &mut R) -> Vec<&'a str>
where
    R: Rng + ?Sized,
{
    let amount = k.min(pool.len());
    rand::seq::index::sample(rng, pool.len(), amount)
        .into_iter()
        .map(|index| pool[index].as_str())
        .collect()
}

/// Known mirrors plus the per-call attempt budget.
#[derive(Debug, Clone)]
pub struct MirrorPool {
    instances: Vec<String>,
    attempts: usize,
}

impl MirrorPool {
    pub const DEFAULT_ATTEMPTS: usize = 3;

    pub fn new(instances: Vec<String>) -> Self {
        Self {
            instances,
            attempts: Self::DEFAULT_ATTEMPTS,
        }
    }

    pub fn instances(&self) -> &[String] {
        &self.instances
    }

    /// Tries a fresh random sample of mirrors one after another and returns
    /// the first response that decodes as `T`. `None` once every sampled
    /// mirror has failed.
    pub fn request<T: DeserializeOwned>(
        &self,
        client: &UpstreamClient,
        path: &str,
        timeouts: Timeouts,
    ) -> Option<T> {
        let attempts = select_instances(&self.instances, self.attempts, &mut rand::thread_rng());
        for instance in &attempts {
            let url = api_url(instance, path);
            match client.get_json(&url, timeouts, RetryPolicy::MIRROR) {
                Ok(value) => return Some(value),
                Err(err) => debug!(%url, error = %err, "mirror request failed"),
            }
        }
        warn!(path, tried = attempts.len(), "all sampled mirrors failed");
        None
    }
}

fn api_url(instance: &str, path: &str) -> String {
    format!("{}/api/v1{}", instance.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::{Value, json};
    use std::{collections::HashSet, sync::Arc};

    fn pool_of(size: usize) -> Vec<String> {
        (0..size).map(|i| format!("https://m{i}.test/")).collect()
    }

    #[test]
    fn selection_is_distinct_and_bounded() {
        let pool = pool_of(9);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let picked = select_instances(&pool, 3, &mut rng);
            assert_eq!(picked.len(), 3);
            let unique: HashSet<_> = picked.iter().collect();
            assert_eq!(unique.len(), 3);
            assert!(picked.iter().all(|p| pool.iter().any(|m| m == p)));
        }
    }

    #[test]
    fn selection_shrinks_with_small_pool() {
        let pool = pool_of(2);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(select_instances(&pool, 3, &mut rng).len(), 2);
        let empty: Vec<String> = Vec::new();
        assert!(select_instances(&empty, 3, &mut rng).is_empty());
    }

    #[test]
    fn selection_spreads_load() {
        let pool = pool_of(9);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.extend(select_instances(&pool, 3, &mut rng));
        }
        assert_eq!(seen.len(), 9);
    }

    #[test]
    fn api_url_joins_without_double_slash() {
        assert_eq!(
            api_url("https://m.test/", "/popular"),
            "https://m.test/api/v1/popular"
        );
        assert_eq!(
            api_url("https://m.test", "/popular"),
            "https://m.test/api/v1/popular"
        );
    }

    #[test]
    fn request_returns_first_success() {
        let fake = Arc::new(FakeTransport::new());
        for instance in pool_of(3) {
            fake.respond_json(&api_url(&instance, "/popular"), json!({"from": instance}));
        }
        let pool = MirrorPool::new(pool_of(3));
        let client = UpstreamClient::new(fake.clone());
        let value: Value = pool
            .request(&client, "/popular", Timeouts::secs(1, 1))
            .unwrap();
        assert_eq!(fake.calls().len(), 1);
        assert!(fake.calls()[0].starts_with(value["from"].as_str().unwrap().trim_end_matches('/')));
    }

    #[test]
    fn request_skips_failing_mirrors() {
        let fake = Arc::new(FakeTransport::new());
        let pool = pool_of(3);
        fake.respond_json(&api_url(&pool[1], "/popular"), json!([1, 2]));
        let mirrors = MirrorPool::new(pool);
        let client = UpstreamClient::new(fake.clone());
        let value: Option<Value> = mirrors.request(&client, "/popular", Timeouts::secs(1, 1));
        assert_eq!(value, Some(json!([1, 2])));
    }

    #[test]
    fn request_gives_up_after_three_mirrors() {
        let fake = Arc::new(FakeTransport::new());
        let mirrors = MirrorPool::new(pool_of(9));
        let client = UpstreamClient::new(fake.clone());
        let value: Option<Value> = mirrors.request(&client, "/popular", Timeouts::secs(1, 1));
        assert!(value.is_none());
        let calls = fake.calls();
        assert_eq!(calls.len(), 3);
        let unique: HashSet<_> = calls.iter().collect();
        assert_eq!(unique.len(), 3);
    }
}

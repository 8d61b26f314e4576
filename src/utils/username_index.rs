use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures_util::StreamExt;
use moka::future::Cache;
use sqlx::MySqlPool;
use std::sync::RwLock;
use std::time::Duration;

/// Expected capacity and false-positive rate.
/// Tune these based on real user counts.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;
const CACHE_CAPACITY: u64 = 500_000;
const CACHE_TTL: Duration = Duration::from_secs(86_400);

#[inline]
fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}

/// What the in-memory layers know about a username.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Filter says it was never inserted: definitely free.
    Free,
    /// Cache confirms it is in use.
    Taken,
    /// Filter hit without cache confirmation; ask the database.
    Unknown,
}

/// Username availability index: a cuckoo filter for fast negatives in front of
/// a moka cache for fast positives. The database stays authoritative.
pub struct UsernameIndex {
    filter: RwLock<CuckooFilter<String>>,
    taken: Cache<String, ()>,
}

impl Default for UsernameIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl UsernameIndex {
    pub fn new() -> Self {
        Self {
            filter: RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)),
            taken: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    fn might_exist(&self, username: &String) -> bool {
        match self.filter.read() {
            Ok(filter) => filter.contains(username),
            // a poisoned filter must not report false negatives
            Err(_) => true,
        }
    }

    pub async fn lookup(&self, username: &str) -> Availability {
        let username = normalize(username);

        if !self.might_exist(&username) {
            return Availability::Free;
        }

        if self.taken.contains_key(&username) {
            return Availability::Taken;
        }

        Availability::Unknown
    }

    /// Records a username as in use in both layers.
    pub async fn mark_taken(&self, username: &str) {
        let username = normalize(username);
        if let Ok(mut filter) = self.filter.write() {
            filter.add(&username);
        }
        self.taken.insert(username, ()).await;
    }

    /// Returns `true` when the username can be registered.
    pub async fn is_available(&self, username: &str, pool: &MySqlPool) -> Result<bool> {
        match self.lookup(username).await {
            Availability::Free => Ok(true),
            Availability::Taken => Ok(false),
            Availability::Unknown => {
                let username = normalize(username);
                let exists = sqlx::query_scalar::<_, i64>(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(username) = ? LIMIT 1)",
                )
                .bind(&username)
                .fetch_one(pool)
                .await?
                    != 0;

                if exists {
                    self.taken.insert(username, ()).await;
                }
                Ok(!exists)
            }
        }
    }

    /// Streams every username into the filter and recently active ones into the cache.
    pub async fn warmup(&self, pool: &MySqlPool, recent_days: u32, batch_size: usize) -> Result<()> {
        let mut stream = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT username,
                   COALESCE(last_login_at >= NOW() - INTERVAL ? DAY, 0) AS recent
            FROM users
            "#,
        )
        .bind(recent_days)
        .fetch(pool);

        let mut batch: Vec<(String, bool)> = Vec::with_capacity(batch_size);
        let mut total = 0usize;

        while let Some(row) = stream.next().await {
            let (username, recent) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;
            batch.push((normalize(&username), recent != 0));
            total += 1;

            if batch.len() == batch_size {
                self.insert_batch(&batch).await;
                batch.clear();
            }
        }

        if !batch.is_empty() {
            self.insert_batch(&batch).await;
        }

        log::info!("Username index warmup complete: {} users", total);
        Ok(())
    }

    async fn insert_batch(&self, usernames: &[(String, bool)]) {
        if let Ok(mut filter) = self.filter.write() {
            for (username, _) in usernames {
                filter.add(username);
            }
        }

        let inserts: Vec<_> = usernames
            .iter()
            .filter(|(_, recent)| *recent)
            .map(|(u, _)| self.taken.insert(u.clone(), ()))
            .collect();
        futures::future::join_all(inserts).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseen_username_is_free() {
        let index = UsernameIndex::new();
        assert_eq!(index.lookup("alice").await, Availability::Free);
    }

    #[tokio::test]
    async fn marked_username_is_taken_case_insensitively() {
        let index = UsernameIndex::new();
        index.mark_taken("Alice").await;
        assert_eq!(index.lookup("alice").await, Availability::Taken);
        assert_eq!(index.lookup("  ALICE ").await, Availability::Taken);
    }

    #[tokio::test]
    async fn filter_hit_without_cache_entry_is_unknown() {
        let index = UsernameIndex::new();
        index.mark_taken("bob").await;
        index.taken.invalidate("bob").await;
        assert_eq!(index.lookup("bob").await, Availability::Unknown);
    }
}

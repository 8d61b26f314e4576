//! List-page cache with resource-keyed invalidation.
//!
//! Each resource carries a generation counter that is part of every cache key.
//! A mutation bumps the generation, so all cached pages of that resource become
//! unreachable at once and age out through the TTL.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use actix_web::HttpResponse;
use moka::future::Cache;
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::{error::ApiError, listing::ListParams, model::resource::Resource};

/// Whose rows a cached page contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Same rows for every caller
    Shared,
    /// Rows belonging to one employee
    Employee(u64),
}

impl Scope {
    fn key(self) -> String {
        match self {
            Scope::Shared => "all".to_string(),
            Scope::Employee(id) => format!("emp{id}"),
        }
    }
}

pub struct QueryCache {
    pages: Cache<String, Arc<String>>,
    generations: HashMap<Resource, AtomicU64>,
}

impl QueryCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            pages: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            generations: Resource::iter().map(|r| (r, AtomicU64::new(0))).collect(),
        }
    }

    pub fn generation(&self, resource: Resource) -> u64 {
        self.generations
            .get(&resource)
            .map(|g| g.load(Ordering::Acquire))
            .unwrap_or_default()
    }

    pub fn key(&self, resource: Resource, scope: Scope, params: &ListParams) -> String {
        format!(
            "{}:{}:{}:{}",
            resource,
            self.generation(resource),
            scope.key(),
            params.cache_key()
        )
    }

    /// Marks every cached list of `resource`, and of the lists embedding it, stale.
    pub fn invalidate(&self, resource: Resource) {
        for stale in std::iter::once(resource).chain(resource.dependents().iter().copied()) {
            if let Some(g) = self.generations.get(&stale) {
                let next = g.fetch_add(1, Ordering::AcqRel) + 1;
                tracing::debug!(resource = %stale, generation = next, "Invalidated cached lists");
            }
        }
    }

    /// Returns the serialized page, loading it once for concurrent identical requests.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        resource: Resource,
        scope: Scope,
        params: &ListParams,
        load: F,
    ) -> Result<Arc<String>, ApiError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let key = self.key(resource, scope, params);

        self.pages
            .try_get_with(key, async move {
                let value = load().await?;
                serde_json::to_string(&value)
                    .map(Arc::new)
                    .map_err(|e| ApiError::internal(format!("failed to serialize page: {e}")))
            })
            .await
            .map_err(|e: Arc<ApiError>| (*e).clone())
    }

    /// Convenience wrapper producing the JSON response directly.
    pub async fn respond<T, F, Fut>(
        &self,
        resource: Resource,
        scope: Scope,
        params: &ListParams,
        load: F,
    ) -> Result<HttpResponse, ApiError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let body = self.get_or_load(resource, scope, params, load).await?;
        Ok(HttpResponse::Ok()
            .content_type("application/json")
            .body(body.as_ref().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{ListQuery, Page};
    use std::sync::atomic::AtomicUsize;

    fn cache() -> QueryCache {
        QueryCache::new(100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let cache = cache();
        let params = ListParams::default();
        let loads = AtomicUsize::new(0);

        for _ in 0..2 {
            let body = cache
                .get_or_load(Resource::Announcements, Scope::Shared, &params, || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Page::<u32>::empty(&params))
                })
                .await
                .unwrap();
            assert!(body.contains("\"totalCount\":0"));
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    async fn load_counting(cache: &QueryCache, resource: Resource, loads: &AtomicUsize) {
        let params = ListParams::default();
        cache
            .get_or_load(resource, Scope::Shared, &params, || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1u8])
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalidation_forces_reload_of_that_resource_only() {
        let cache = cache();
        let loads = AtomicUsize::new(0);

        load_counting(&cache, Resource::Leave, &loads).await;
        load_counting(&cache, Resource::Events, &loads).await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);

        cache.invalidate(Resource::Leave);
        assert_eq!(cache.generation(Resource::Leave), 1);
        load_counting(&cache, Resource::Leave, &loads).await;
        load_counting(&cache, Resource::Events, &loads).await;
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn employee_change_reloads_review_queues() {
        let cache = cache();
        let loads = AtomicUsize::new(0);

        load_counting(&cache, Resource::Leave, &loads).await;
        load_counting(&cache, Resource::Events, &loads).await;
        cache.invalidate(Resource::Employees);

        load_counting(&cache, Resource::Leave, &loads).await;
        load_counting(&cache, Resource::Events, &loads).await;
        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert_eq!(cache.generation(Resource::Feedback), 1);
        assert_eq!(cache.generation(Resource::AttendanceRequests), 1);
    }

    #[tokio::test]
    async fn scopes_do_not_share_pages() {
        let cache = cache();
        let params = ListQuery::default().normalize();
        let a = cache.key(Resource::Leave, Scope::Employee(1), &params);
        let b = cache.key(Resource::Leave, Scope::Employee(2), &params);
        let c = cache.key(Resource::Leave, Scope::Shared, &params);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn failed_loads_are_not_cached() {
        let cache = cache();
        let params = ListParams::default();

        let err = cache
            .get_or_load::<Vec<u8>, _, _>(Resource::Feedback, Scope::Shared, &params, || async {
                Err(ApiError::internal("db down"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));

        let ok = cache
            .get_or_load(Resource::Feedback, Scope::Shared, &params, || async {
                Ok(vec![7u8])
            })
            .await
            .unwrap();
        assert_eq!(ok.as_str(), "[7]");
    }
}

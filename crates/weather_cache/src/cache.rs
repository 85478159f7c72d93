//! Time-bounded cache in front of a [`WeatherFetcher`].
//!
//! Uses `DashMap` so concurrent lookups for different locations don't
//! contend. No shard lock is held across the upstream call: two concurrent
//! misses for the same key both fetch and the later insert wins.
//!
//! Expiry is lazy. A lookup that finds an expired entry removes it and
//! reports a miss; entries nobody asks for again stay until restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    CurrentWeather, Error, Location, RequestContext, Result, WeatherForecast, WeatherReport,
};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::key::CacheKey;
use crate::{WeatherFetcher, WeatherRepository};

/// Used when the configured TTL is zero.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    report: WeatherReport,
    cached_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time counters, for logging only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    /// Stored entries, including expired ones not yet looked up.
    pub entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct WeatherCache {
    fetcher: Arc<dyn WeatherFetcher>,
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    counters: Counters,
}

impl WeatherCache {
    /// A zero `ttl` falls back to [`DEFAULT_CACHE_TTL`].
    pub fn new(fetcher: Arc<dyn WeatherFetcher>, ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_CACHE_TTL } else { ttl };
        Self {
            fetcher,
            entries: DashMap::new(),
            ttl,
            counters: Counters::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            fetch_failures: self.counters.fetch_failures.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    /// Pick a value out of the live entry for `key`, evicting the entry first
    /// if it has expired. A live entry that `pick` rejects counts as a miss.
    fn lookup<T>(
        &self,
        key: &CacheKey,
        pick: impl Fn(&WeatherReport) -> Option<T>,
    ) -> Option<T> {
        let now = Instant::now();

        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let picked = pick(&entry.report);
                if picked.is_some() {
                    Counters::bump(&self.counters.hits);
                    debug!(
                        "Cache hit: {} (age {:?})",
                        key,
                        now.saturating_duration_since(entry.cached_at)
                    );
                } else {
                    Counters::bump(&self.counters.misses);
                }
                return picked;
            }
            Some(_) => {}
            None => {
                Counters::bump(&self.counters.misses);
                return None;
            }
        }

        // Re-check under the shard write lock; a concurrent insert may have
        // refreshed the entry since the read above.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            Counters::bump(&self.counters.expired);
            debug!("Evicted expired cache entry {}", key);
        }
        Counters::bump(&self.counters.misses);
        None
    }

    /// Replace whatever is stored under `key` with a fresh entry.
    fn insert(&self, key: CacheKey, mut report: WeatherReport) {
        let now = Instant::now();
        report.cached_at = Some(Utc::now());
        debug!("Caching {} for {:?}", key, self.ttl);
        self.entries.insert(
            key,
            CacheEntry {
                report,
                cached_at: now,
                expires_at: now + self.ttl,
            },
        );
    }

    async fn fetch<T, F>(&self, ctx: &RequestContext, key: &CacheKey, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>> + Send,
    {
        Counters::bump(&self.counters.fetches);
        match ctx.run(fut).await {
            Ok(value) => Ok(value),
            Err(e) => {
                Counters::bump(&self.counters.fetch_failures);
                warn!("Upstream fetch for {} failed: {}", key, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl WeatherRepository for WeatherCache {
    async fn get_current_weather(
        &self,
        ctx: &RequestContext,
        location: &Location,
    ) -> Result<CurrentWeather> {
        let key = CacheKey::current(location);
        if let Some(current) = self.lookup(&key, |report| report.current.clone()) {
            return Ok(current);
        }

        debug!("Cache miss: {}", key);
        let current = self
            .fetch(ctx, &key, self.fetcher.fetch_current(ctx, location))
            .await?;

        self.insert(
            key,
            WeatherReport::from_current(location.clone(), current.clone()),
        );
        Ok(current)
    }

    async fn get_forecast(
        &self,
        ctx: &RequestContext,
        location: &Location,
        days: u32,
    ) -> Result<WeatherForecast> {
        let key = CacheKey::forecast(location, days);
        if let Some(forecast) = self.lookup(&key, |report| report.forecast.clone()) {
            return Ok(forecast);
        }

        debug!("Cache miss: {}", key);
        let forecast = self
            .fetch(ctx, &key, self.fetcher.fetch_forecast(ctx, location, days))
            .await?;

        self.insert(
            key,
            WeatherReport::from_forecast(location.clone(), forecast.clone()),
        );
        Ok(forecast)
    }

    async fn get_cached_weather(
        &self,
        _ctx: &RequestContext,
        location: &Location,
    ) -> Result<WeatherReport> {
        self.lookup(&CacheKey::current(location), |report| Some(report.clone()))
            .ok_or_else(|| Error::not_found("weather", location.label()))
    }

    async fn cache_weather(&self, _ctx: &RequestContext, report: WeatherReport) -> Result<()> {
        self.insert(CacheKey::current(&report.location), report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Barrier;

    const TTL: Duration = Duration::from_secs(60);

    fn ctx() -> RequestContext {
        RequestContext::background()
    }

    fn forecast_for(location: &Location, days: u32) -> WeatherForecast {
        let current = CurrentWeather::basic(location.clone(), 20.5);
        WeatherForecast {
            location: location.clone(),
            forecasts: (0..days)
                .map(|i| common::DailyForecast {
                    date: Utc::now() + chrono::Duration::days(i as i64 + 1),
                    temp_min: 10.0,
                    temp_max: 20.0,
                    temp_morning: 12.0,
                    temp_day: 18.0,
                    temp_evening: 15.0,
                    temp_night: 11.0,
                    humidity: 60,
                    pressure: 1012,
                    wind_speed: 3.0,
                    wind_direction: 180,
                    cloudiness: 20,
                    precipitation: 0.0,
                    condition: Default::default(),
                    pop: 0.1,
                })
                .collect(),
            current,
            generated_at: Utc::now(),
        }
    }

    /// Counts calls and fails every call after the first `succeed_for`.
    struct CountingFetcher {
        current_calls: AtomicUsize,
        forecast_calls: AtomicUsize,
        succeed_for: usize,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Self::failing_after(usize::MAX)
        }

        fn failing_after(succeed_for: usize) -> Arc<Self> {
            Arc::new(Self {
                current_calls: AtomicUsize::new(0),
                forecast_calls: AtomicUsize::new(0),
                succeed_for,
            })
        }

        fn current_calls(&self) -> usize {
            self.current_calls.load(Ordering::SeqCst)
        }

        fn forecast_calls(&self) -> usize {
            self.forecast_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherFetcher for CountingFetcher {
        async fn fetch_current(
            &self,
            _ctx: &RequestContext,
            location: &Location,
        ) -> Result<CurrentWeather> {
            let n = self.current_calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.succeed_for {
                return Err(Error::UpstreamUnavailable("simulated failure".into()));
            }
            Ok(CurrentWeather::basic(location.clone(), 20.5))
        }

        async fn fetch_forecast(
            &self,
            _ctx: &RequestContext,
            location: &Location,
            days: u32,
        ) -> Result<WeatherForecast> {
            let n = self.forecast_calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.succeed_for {
                return Err(Error::UpstreamUnavailable("simulated failure".into()));
            }
            Ok(forecast_for(location, days))
        }
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let fetcher = CountingFetcher::failing_after(1);
        let cache = WeatherCache::new(fetcher.clone(), TTL);
        let london = Location::city("London");

        let first = cache.get_current_weather(&ctx(), &london).await.unwrap();
        let second = cache.get_current_weather(&ctx(), &london).await.unwrap();

        assert_eq!(first.temperature, 20.5);
        assert_eq!(second.temperature, 20.5);
        assert_eq!(second.location.city, "London");
        assert_eq!(fetcher.current_calls(), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let fetcher = CountingFetcher::failing_after(0);
        let cache = WeatherCache::new(fetcher.clone(), TTL);
        let nowhere = Location::city("Nowhere");

        assert!(cache.get_current_weather(&ctx(), &nowhere).await.is_err());
        assert!(cache.get_current_weather(&ctx(), &nowhere).await.is_err());

        assert_eq!(fetcher.current_calls(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().fetch_failures, 2);
    }

    #[tokio::test]
    async fn test_forecast_day_counts_do_not_share_entries() {
        let fetcher = CountingFetcher::new();
        let cache = WeatherCache::new(fetcher.clone(), TTL);
        let berlin = Location::city("Berlin");

        let five = cache.get_forecast(&ctx(), &berlin, 5).await.unwrap();
        let three = cache.get_forecast(&ctx(), &berlin, 3).await.unwrap();
        assert_eq!(five.forecasts.len(), 5);
        assert_eq!(three.forecasts.len(), 3);
        assert_eq!(fetcher.forecast_calls(), 2);

        cache.get_forecast(&ctx(), &berlin, 5).await.unwrap();
        cache.get_forecast(&ctx(), &berlin, 3).await.unwrap();
        assert_eq!(fetcher.forecast_calls(), 2);
    }

    #[tokio::test]
    async fn test_forecast_does_not_satisfy_current() {
        let fetcher = CountingFetcher::new();
        let cache = WeatherCache::new(fetcher.clone(), TTL);
        let paris = Location::city("Paris");

        cache.get_forecast(&ctx(), &paris, 5).await.unwrap();
        cache.get_current_weather(&ctx(), &paris).await.unwrap();

        assert_eq!(fetcher.forecast_calls(), 1);
        assert_eq!(fetcher.current_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let fetcher = CountingFetcher::new();
        let cache = WeatherCache::new(fetcher.clone(), TTL);
        let tokyo = Location::city("Tokyo");

        cache.get_current_weather(&ctx(), &tokyo).await.unwrap();

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        cache.get_current_weather(&ctx(), &tokyo).await.unwrap();
        assert_eq!(fetcher.current_calls(), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        cache.get_current_weather(&ctx(), &tokyo).await.unwrap();
        assert_eq!(fetcher.current_calls(), 2);
        assert_eq!(cache.stats().expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_purged_by_probe() {
        let fetcher = CountingFetcher::new();
        let cache = WeatherCache::new(fetcher.clone(), TTL);
        let oslo = Location::city("Oslo");

        cache.get_current_weather(&ctx(), &oslo).await.unwrap();
        assert!(cache.get_cached_weather(&ctx(), &oslo).await.is_ok());

        tokio::time::advance(TTL).await;
        assert_eq!(cache.len(), 1);

        let err = cache.get_cached_weather(&ctx(), &oslo).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(cache.len(), 0);
        assert_eq!(fetcher.current_calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_probe_never_fetches() {
        let fetcher = CountingFetcher::new();
        let cache = WeatherCache::new(fetcher.clone(), TTL);

        let err = cache
            .get_cached_weather(&ctx(), &Location::city("Lima"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fetcher.current_calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_weather_overwrites_current_slot() {
        let fetcher = CountingFetcher::new();
        let cache = WeatherCache::new(fetcher.clone(), TTL);
        let rome = Location::city("Rome");

        cache.get_current_weather(&ctx(), &rome).await.unwrap();

        let report = WeatherReport::from_current(
            Location::city("ROME"),
            CurrentWeather::basic(Location::city("Rome"), 31.0),
        );
        cache.cache_weather(&ctx(), report).await.unwrap();

        let current = cache.get_current_weather(&ctx(), &rome).await.unwrap();
        assert_eq!(current.temperature, 31.0);
        assert_eq!(fetcher.current_calls(), 1);

        let probed = cache.get_cached_weather(&ctx(), &rome).await.unwrap();
        assert!(probed.cached_at.is_some());
    }

    #[tokio::test]
    async fn test_report_without_current_is_a_miss_for_current() {
        let fetcher = CountingFetcher::new();
        let cache = WeatherCache::new(fetcher.clone(), TTL);
        let quito = Location::city("Quito");

        let forecast_only = WeatherReport::from_forecast(quito.clone(), forecast_for(&quito, 1));
        cache.cache_weather(&ctx(), forecast_only).await.unwrap();

        cache.get_current_weather(&ctx(), &quito).await.unwrap();
        assert_eq!(fetcher.current_calls(), 1);
    }

    #[tokio::test]
    async fn test_report_without_current_counts_as_miss() {
        let fetcher = CountingFetcher::new();
        let cache = WeatherCache::new(fetcher.clone(), TTL);
        let quito = Location::city("Quito");

        let forecast_only = WeatherReport::from_forecast(quito.clone(), forecast_for(&quito, 1));
        cache.cache_weather(&ctx(), forecast_only).await.unwrap();
        cache.get_current_weather(&ctx(), &quito).await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.fetches, 1);

        cache.get_current_weather(&ctx(), &quito).await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.fetches, 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_uses_default() {
        let cache = WeatherCache::new(CountingFetcher::new(), Duration::ZERO);
        assert_eq!(cache.ttl(), DEFAULT_CACHE_TTL);
    }

    /// Blocks inside the fetch until both concurrent callers have arrived.
    struct RendezvousFetcher {
        barrier: Barrier,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WeatherFetcher for RendezvousFetcher {
        async fn fetch_current(
            &self,
            _ctx: &RequestContext,
            location: &Location,
        ) -> Result<CurrentWeather> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.barrier.wait().await;
            Ok(CurrentWeather::basic(location.clone(), n as f64))
        }

        async fn fetch_forecast(
            &self,
            _ctx: &RequestContext,
            location: &Location,
            days: u32,
        ) -> Result<WeatherForecast> {
            Ok(forecast_for(location, days))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_misses_both_fetch() {
        let fetcher = Arc::new(RendezvousFetcher {
            barrier: Barrier::new(2),
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(WeatherCache::new(fetcher.clone(), TTL));
        let madrid = Location::city("Madrid");

        let spawn = |cache: Arc<WeatherCache>, loc: Location| {
            tokio::spawn(async move {
                cache
                    .get_current_weather(&RequestContext::background(), &loc)
                    .await
            })
        };
        let a = spawn(cache.clone(), madrid.clone());
        let b = spawn(cache.clone(), madrid.clone());

        let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
            (a.await.unwrap(), b.await.unwrap())
        })
        .await
        .expect("both fetches should proceed without coalescing");
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    /// Never answers.
    struct HangingFetcher;

    #[async_trait]
    impl WeatherFetcher for HangingFetcher {
        async fn fetch_current(
            &self,
            _ctx: &RequestContext,
            _location: &Location,
        ) -> Result<CurrentWeather> {
            std::future::pending().await
        }

        async fn fetch_forecast(
            &self,
            _ctx: &RequestContext,
            _location: &Location,
            _days: u32,
        ) -> Result<WeatherForecast> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_honours_caller_deadline() {
        let cache = WeatherCache::new(Arc::new(HangingFetcher), TTL);
        let ctx = RequestContext::with_timeout(Duration::from_millis(250));

        let err = cache
            .get_current_weather(&ctx, &Location::city("Cairo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable(_)));
        assert!(cache.is_empty());
    }
}

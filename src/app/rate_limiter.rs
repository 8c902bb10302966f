use anyhow::Result;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::config::rate_limits::{current_window, RateLimits, RateWindow};
use crate::domain::account::Role;
use crate::infra::cache::RedisCache;

pub struct RateLimitInfo {
    pub limited: bool,
    pub limit: u32,
    pub remaining: u32,
}

impl RateLimitInfo {
    fn unmetered() -> Self {
        Self {
            limited: false,
            limit: 0,
            remaining: 0,
        }
    }
}

/// Fixed-window counters in Redis, keyed per actor and action.
#[derive(Clone)]
pub struct RateLimiter {
    cache: RedisCache,
}

impl RateLimiter {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }

    /// Reports the tightest applicable window so callers can set quota
    /// headers.
    pub async fn check_rate_limit(
        &self,
        user_id: Uuid,
        role: Role,
        action: &str,
    ) -> Result<RateLimitInfo> {
        let checks = RateLimits::for_role(role).windows_for_action(action);
        if checks.is_empty() {
            return Ok(RateLimitInfo::unmetered());
        }

        let mut conn = self.cache.connection().await?;

        let mut min_remaining = u32::MAX;
        let mut effective_limit: u32 = 0;

        for (limit, window) in checks {
            let key = actor_key(user_id, role, action, window);

            let count: u32 = conn.get(&key).await.unwrap_or(0);
            let remaining = limit.saturating_sub(count);

            if remaining < min_remaining {
                min_remaining = remaining;
                effective_limit = limit;
            }

            if count >= limit {
                tracing::debug!(
                    user_id = %user_id,
                    role = role.as_db(),
                    action = action,
                    window = ?window,
                    count = count,
                    limit = limit,
                    "Rate limit exceeded"
                );
                return Ok(RateLimitInfo {
                    limited: true,
                    limit,
                    remaining: 0,
                });
            }
        }

        Ok(RateLimitInfo {
            limited: false,
            limit: effective_limit,
            remaining: min_remaining,
        })
    }

    pub async fn increment(&self, user_id: Uuid, role: Role, action: &str) -> Result<()> {
        let windows = RateLimits::for_role(role).windows_for_action(action);
        if windows.is_empty() {
            return Ok(());
        }

        let mut conn = self.cache.connection().await?;

        for (_, window) in windows {
            let key = actor_key(user_id, role, action, window);
            let count: u32 = conn.incr(&key, 1).await?;
            if count == 1 {
                let _: () = conn.expire(&key, window.seconds() as i64).await?;
            }
        }

        Ok(())
    }

    /// Check rate limit by IP address (for unauthenticated requests)
    pub async fn check_ip_rate_limit(
        &self,
        ip: &str,
        action: &str,
        limit: u32,
        window: RateWindow,
    ) -> Result<bool> {
        let key = ip_key(ip, action, window);
        let mut conn = self.cache.connection().await?;

        let count: u32 = conn.get(&key).await.unwrap_or(0);

        if count >= limit {
            tracing::debug!(
                ip = ip,
                action = action,
                count = count,
                limit = limit,
                "IP rate limit exceeded"
            );
            return Ok(true);
        }

        Ok(false)
    }

    pub async fn increment_ip(&self, ip: &str, action: &str, window: RateWindow) -> Result<()> {
        let key = ip_key(ip, action, window);
        let mut conn = self.cache.connection().await?;

        let count: u32 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(&key, window.seconds() as i64).await?;
        }

        Ok(())
    }
}

fn actor_key(user_id: Uuid, role: Role, action: &str, window: RateWindow) -> String {
    format!(
        "ratelimit:{}:{}:{}:{}",
        role.as_db(),
        user_id,
        action,
        current_window(window.seconds())
    )
}

fn ip_key(ip: &str, action: &str, window: RateWindow) -> String {
    format!(
        "ratelimit:ip:{}:{}:{}",
        ip,
        action,
        current_window(window.seconds())
    )
}

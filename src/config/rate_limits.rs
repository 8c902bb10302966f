use crate::domain::account::Role;

/// Login attempts a single address may make per hour, across all roles.
pub const LOGIN_ATTEMPTS_PER_IP_PER_HOUR: u32 = 30;

/// Per-role request budgets for the write paths that donors and NGOs hit.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    // Donor actions
    pub contributions_per_hour: u32,
    pub contributions_per_day: u32,
    pub payments_per_hour: u32,

    // Counterpart decisions
    pub status_updates_per_hour: u32,
    pub verifications_per_hour: u32,

    pub notifications_per_hour: u32,
}

impl RateLimits {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Donor => RateLimits {
                contributions_per_hour: 20,
                contributions_per_day: 60,
                payments_per_hour: 10,
                status_updates_per_hour: 0,
                verifications_per_hour: 0,
                notifications_per_hour: 600,
            },
            Role::Ngo => RateLimits {
                contributions_per_hour: 0,
                contributions_per_day: 0,
                payments_per_hour: 0,
                status_updates_per_hour: 500,
                verifications_per_hour: 300,
                notifications_per_hour: 600,
            },
            Role::Admin => RateLimits {
                contributions_per_hour: 0,
                contributions_per_day: 0,
                payments_per_hour: 0,
                status_updates_per_hour: 2000,
                verifications_per_hour: 2000,
                notifications_per_hour: 2000,
            },
        }
    }

    /// Windows that apply to an action, with their limits. Empty when the
    /// action is not metered. A zero limit marks an action the role never
    /// performs; authorization rejects those, not the limiter.
    pub fn windows_for_action(&self, action: &str) -> Vec<(u32, RateWindow)> {
        let windows = match action {
            "contribute" => vec![
                (self.contributions_per_hour, RateWindow::Hour),
                (self.contributions_per_day, RateWindow::Day),
            ],
            "payment" => vec![(self.payments_per_hour, RateWindow::Hour)],
            "status" => vec![(self.status_updates_per_hour, RateWindow::Hour)],
            "verify" => vec![(self.verifications_per_hour, RateWindow::Hour)],
            "notifications" => vec![(self.notifications_per_hour, RateWindow::Hour)],
            _ => Vec::new(),
        };
        windows.into_iter().filter(|(limit, _)| *limit > 0).collect()
    }
}

/// Time window for rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    Hour,
    Day,
}

impl RateWindow {
    pub fn seconds(&self) -> u64 {
        match self {
            RateWindow::Hour => 3600,
            RateWindow::Day => 86400,
        }
    }
}

/// Calculate current window timestamp for rate limiting
pub fn current_window(window_seconds: u64) -> u64 {
    let now = time::OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
    now / window_seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contribute_is_metered_hourly_and_daily() {
        let windows = RateLimits::for_role(Role::Donor).windows_for_action("contribute");
        assert_eq!(windows, vec![(20, RateWindow::Hour), (60, RateWindow::Day)]);
    }

    #[test]
    fn actions_outside_the_role_are_unmetered() {
        assert!(RateLimits::for_role(Role::Donor)
            .windows_for_action("verify")
            .is_empty());
    }

    #[test]
    fn unknown_actions_are_unmetered() {
        assert!(RateLimits::for_role(Role::Ngo)
            .windows_for_action("browse")
            .is_empty());
    }
}

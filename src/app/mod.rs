pub mod auth;
pub mod conflicts;
pub mod contributions;
pub mod donations;
pub mod errors;
pub mod events;
pub mod notifications;
pub mod payments;
pub mod rate_limiter;
pub mod status;

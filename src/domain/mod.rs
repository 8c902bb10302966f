pub mod account;
pub mod contribution;
pub mod donation;
pub mod notification;
pub mod payment;
pub mod status;

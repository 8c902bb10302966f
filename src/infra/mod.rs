pub mod cache;
pub mod db;
pub mod mail;
pub mod queue;
pub mod realtime;

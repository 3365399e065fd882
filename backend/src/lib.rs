pub mod buyer;
pub mod cart;
pub mod config;
pub mod db;
pub mod inventory;
pub mod metrics;
pub mod reclaimer;
pub mod reservation;

pub mod error;
pub mod time;

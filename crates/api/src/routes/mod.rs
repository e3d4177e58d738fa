pub mod billing;
pub mod health;
pub mod metrics;
pub mod payment;

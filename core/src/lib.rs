//! custhealth-core: customer health scoring, churn prediction and risk
//! alerting over a SQLite signal store.

pub mod aggregator;
pub mod alert;
pub mod churn;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod health_score;
pub mod notify;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod types;

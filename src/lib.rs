//! depthwatch: order-book imbalance monitoring with threshold alerts.
//!
//! A poll scheduler walks the subscription registry on a fixed cadence,
//! fetches top-of-book depth per subscriber, computes a normalized
//! imbalance in [-1, 1], and runs it through a hysteresis-banded alert
//! state machine that decides when a notification is due.

pub mod alert;
pub mod command;
pub mod exchange;
pub mod imbalance;
pub mod logging;
pub mod notify;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod telegram;

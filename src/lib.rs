//! Subscription Billing - Lifecycle core for recurring subscriptions
//!
//! State transitions, mid-cycle proration, scheduled plan changes, pause
//! allowances and payment-failure dunning, behind ports so storage,
//! entitlements, notifications and the payment gateway stay swappable.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;

//! TickerVault Core — incremental price-bar cache, trading calendar, analytics and alerts.
//!
//! This crate contains:
//! - Domain types (bars, interval catalog)
//! - NYSE trading calendar and the shared session-state classification
//! - Provider interface, Yahoo adapter and an in-memory provider
//! - Flat per-interval CSV dataset store
//! - Gap detector and the cache reconciler (`Tracker` session object)
//! - Freshness checker for daily analytics windows
//! - Pure analytics and chart preparation
//! - Alert configuration and the alert evaluator

pub mod alerts;
pub mod analytics;
pub mod calendar;
pub mod config;
pub mod data;
pub mod domain;
pub mod freshness;

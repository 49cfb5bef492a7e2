//! The tally collector service.
//!
//! Agents post metric batches over HTTP; [`service::MetricsService`] applies
//! them to the configured [`tally_storage::MetricStore`] and, for the file
//! backend, drives the [`persistence::PersistenceScheduler`].

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod persistence;
pub mod service;
pub mod state;

//! The tally agent pipeline.
//!
//! A [`scraper::Scraper`] samples the host on the poll interval and pushes one
//! batch per cycle into a bounded queue. A [`reporter::Reporter`] drains that
//! queue on the report interval and ships the combined batch through a
//! [`transport::Transport`], retrying transient failures.

pub mod config;
pub mod reporter;
pub mod scraper;
pub mod transport;

pub use config::AgentConfig;
pub use reporter::{ReportOutcome, Reporter};
pub use scraper::Scraper;
pub use transport::{
    DeliveryClassifier, HttpTransport, NetworkClassifier, Transport, TransportError,
};

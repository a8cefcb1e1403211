//! Data Ingestion - Layer 0
//!
//! Collaborator interfaces for third-party market, sentiment and social data,
//! a recorded-data connector, and the ingest stage that opens every pipeline
//! run.

pub mod connectors;
pub mod ingest;

pub use connectors::{
    FixtureConnector, FixtureFile, MarketDataProvider, SentimentSource, SocialSource, SymbolFixture,
};
pub use ingest::{normalize_symbol, resolve_date_range, IngestStage};

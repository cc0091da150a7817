pub mod accounts;
pub mod config;
pub mod digest;
pub mod entitlement;
pub mod error;
pub mod extractor;
pub mod meter;
pub mod models;
pub mod notifier;
pub mod provider;
pub mod routes;
pub mod store;
pub mod webhook;

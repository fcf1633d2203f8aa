//! # Order Metrics Library
//!
//! Ingests orders from the commerce platform, derives per-product financial
//! metrics, aggregates them per day, summarizes lifetime and trailing-window
//! performance, and serves the results through a read API.

pub mod aggregation;
pub mod analytics;
pub mod config;
pub mod connectors;
pub mod db;
pub mod error;
pub mod finance;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod normalization;
pub mod pipeline;
pub mod reconciliation;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub use migration;

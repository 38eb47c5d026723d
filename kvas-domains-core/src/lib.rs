#![doc = "kvas-domains-core: core pipeline for the KVAS domain list build."]

//! This crate contains the whole build pipeline: list parsing, source
//! aggregation, cross-source merge, line budget, diff and trend. I/O is kept
//! behind the [`contract::Fetcher`] and [`contract::SnapshotStore`] traits.
//!
//! # Usage
//! Construct a [`config::BuildConfig`], a fetcher (e.g. [`fetch::HttpFetcher`])
//! and a snapshot store, then call [`pipeline::build`].

pub mod aggregate;
pub mod budget;
pub mod config;
pub mod contract;
pub mod diff;
pub mod directive;
pub mod fetch;
pub mod merge;
pub mod pipeline;
pub mod state;
pub mod trend;

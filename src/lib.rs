//! NewsFlow - A news API proxy with a personalised feed page
//!
//! This crate proxies requests to a third-party news listing API, filters out
//! removed articles and renders the results as a browsable card grid.
//! Topic preferences live on the client and are injected through a settings store.

pub mod config;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod preferences;
pub mod routes;

//! Schedule import pipeline.
//!
//! A run moves through three phases: a file import that creates a schedule
//! version, an external scrape that fetches the published roster month by
//! month through a rate-limited worker pool, and a coverage calculation. An
//! [`ErrorClassifier`](classifier::ErrorClassifier) decides after each phase
//! whether the run stops, skips the offending units or continues.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod demo;
pub mod entity;
pub mod error;
pub mod logging;
pub mod merger;
pub mod orchestrator;
pub mod repository;
pub mod scrape;
pub mod services;
pub mod state_machine;
pub mod ui;
pub mod upstream;
pub mod validation;

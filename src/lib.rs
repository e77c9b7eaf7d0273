//! Query/passage relevance classification.
//!
//! Loads tab-separated query/passage records, featurizes them through a
//! configurable chain of text transforms, trains a boosted decision-tree
//! binary classifier, evaluates it on a held-out split, and persists the
//! composed pipeline and ensemble as a single binary model file.

/// Run configuration loaded from TOML.
pub mod config;
/// Record schema, TSV loading and train/test splitting.
pub mod dataset;
/// Text feature pipeline.
pub mod features;
/// Logging setup.
pub mod logging;
/// Boosted trees and evaluation metrics.
pub mod ml;
/// Trained model composition and single-file persistence.
pub mod model;
/// Data folder resolution.
pub mod paths;
/// Training and consumption workflows used by the binaries.
pub mod workflow;

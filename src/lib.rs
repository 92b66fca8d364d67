//! Rule-based severity labeling of structured system logs, plus supervised
//! model training on the derived labels.
//!
//! The core is a pure pipeline: raw journal records are normalized into five
//! fields, labeled 0–3 by a keyword/priority tier cascade and projected into
//! a single text feature. The `ml` module trains and compares classifiers on
//! the resulting `(feature, label)` pairs.

pub mod config;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod labeling;
pub mod metrics;
pub mod ml;
pub mod models;

pub use error::{AppError, Result};

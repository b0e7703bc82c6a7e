//! The Muster inference engines: entity resolution, predictive monitoring,
//! alerting, and the timeline collaborator built on top of prediction.
//!
//! Engines are stateless handles over an injected store: construct once with
//! an `Arc<S: CampusStore>` and share freely. Cloning is cheap. Nothing here
//! schedules itself; periodic work (the alert scans) is invoked by callers.

pub mod alerting;
pub mod predict;
pub mod resolve;
pub mod timeline;

pub use muster_core::{Error, Result};

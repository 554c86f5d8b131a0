// File: testing-framework/src/utilities/mod.rs
//
// Testing Utilities
//
// Helpers shared by the scenario executor and hand-written tests.

/// Failure artifact collection for post-mortem inspection
pub mod artifacts;

pub use artifacts::{load_artifact, ArtifactCollector, TestArtifact};

// File: testing-framework/src/utilities/artifacts.rs
//
// Failure Artifact Collection
//
// Snapshots of the harness state taken when a scenario fails, written as
// JSON so the failure can be inspected after the run.

use anyhow::{Context, Result};
use chainwatch_common::EventSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::context::TestContext;
use crate::listeners::ListenerRecord;
use crate::network::SimulatedNetwork;

/// State of the simulated network at capture time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    /// Network name
    pub name: String,
    /// Number of the last committed block
    pub block_height: u64,
    /// Transactions submitted but not yet committed
    pub pending_transactions: usize,
    /// Live subscriptions on the network side
    pub subscriptions: usize,
}

/// Complete failure artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestArtifact {
    /// Run metadata
    pub metadata: TestMetadata,
    /// Connected gateway names
    pub gateways: Vec<String>,
    /// Every listener record, sorted by name
    pub listeners: Vec<ListenerRecord>,
    /// Network state (if a network was captured)
    pub network: Option<NetworkSnapshot>,
    /// Captured log lines
    pub logs: Vec<LogEntry>,
}

/// Metadata of the failed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestMetadata {
    /// Scenario or test name
    pub test_name: String,
    /// RFC 3339 timestamp of collector creation
    pub timestamp: String,
    /// Run duration (milliseconds)
    pub duration_ms: u64,
    /// Failure reason (if available)
    pub failure_reason: Option<String>,
}

/// Log line captured during the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub level: String,
    /// Log message
    pub message: String,
    /// Timestamp
    pub timestamp: String,
}

/// Collects harness state for a failure artifact
///
/// # Examples
///
/// ```rust,ignore
/// let mut collector = ArtifactCollector::new("marble_events");
///
/// if let Err(e) = run_steps(&ctx).await {
///     collector.capture_context(&ctx);
///     collector.capture_network(&network);
///     collector.set_failure_reason(format!("{:#}", e));
///     collector.save("./artifacts/").await?;
/// }
/// ```
pub struct ArtifactCollector {
    metadata: TestMetadata,
    gateways: Vec<String>,
    listeners: Vec<ListenerRecord>,
    network: Option<NetworkSnapshot>,
    logs: Vec<LogEntry>,
    started_at: Instant,
    captured_at: Option<Instant>,
}

impl ArtifactCollector {
    /// Create a collector for the named test
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            metadata: TestMetadata {
                test_name: test_name.into(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                duration_ms: 0,
                failure_reason: None,
            },
            gateways: Vec::new(),
            listeners: Vec::new(),
            network: None,
            logs: Vec::new(),
            started_at: Instant::now(),
            captured_at: None,
        }
    }

    /// Measure the run from `start`, read from the harness clock
    pub fn started_at(mut self, start: Instant) -> Self {
        self.started_at = start;
        self
    }

    pub fn set_failure_reason(&mut self, reason: impl Into<String>) {
        self.metadata.failure_reason = Some(reason.into());
    }

    /// Snapshot gateways and listener records of `ctx`
    ///
    /// Also stops the run duration at the current time of the context's clock.
    pub fn capture_context(&mut self, ctx: &TestContext) {
        self.captured_at = Some(ctx.clock().now());
        self.gateways = ctx.gateway_names();
        self.listeners = ctx.listeners().snapshot();
    }

    /// Snapshot the block height and queue of `network`
    pub fn capture_network(&mut self, network: &SimulatedNetwork) {
        self.network = Some(NetworkSnapshot {
            name: network.name().to_string(),
            block_height: network.block_height(),
            pending_transactions: network.pending_count(),
            subscriptions: network.listener_count(),
        });
    }

    pub fn capture_log(&mut self, level: impl Into<String>, message: impl Into<String>) {
        self.logs.push(LogEntry {
            level: level.into(),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    /// Build the artifact from what has been captured so far
    pub fn artifact(&self) -> TestArtifact {
        let mut metadata = self.metadata.clone();
        let end = self.captured_at.unwrap_or_else(Instant::now);
        metadata.duration_ms = end.saturating_duration_since(self.started_at).as_millis() as u64;

        TestArtifact {
            metadata,
            gateways: self.gateways.clone(),
            listeners: self.listeners.clone(),
            network: self.network.clone(),
            logs: self.logs.clone(),
        }
    }

    /// Save the artifact under `output_dir`
    ///
    /// The file name combines the test name and a timestamp. Returns the path
    /// of the written file.
    pub async fn save(&self, output_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let artifact = self.artifact();

        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)
            .await
            .context("Failed to create artifact directory")?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let filename = format!("{}_{}.json", file_stem(&self.metadata.test_name), timestamp);
        let filepath = output_dir.join(filename);

        let json =
            serde_json::to_string_pretty(&artifact).context("Failed to serialize artifact")?;

        let mut file = fs::File::create(&filepath)
            .await
            .context("Failed to create artifact file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write artifact data")?;
        file.flush()
            .await
            .context("Failed to flush artifact file")?;

        Ok(filepath)
    }
}

/// Load an artifact written by [`ArtifactCollector::save`]
pub async fn load_artifact(filepath: impl AsRef<Path>) -> Result<TestArtifact> {
    let filepath = filepath.as_ref();
    let content = fs::read_to_string(filepath)
        .await
        .with_context(|| format!("Failed to read artifact file {}", filepath.display()))?;

    serde_json::from_str(&content).context("Failed to parse artifact JSON")
}

// Scenario names are free text
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "artifact".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::network::SimulatedNetworkBuilder;
    use std::sync::Arc;

    #[test]
    fn test_collector_creation() {
        let collector = ArtifactCollector::new("listener_test");
        let artifact = collector.artifact();
        assert_eq!(artifact.metadata.test_name, "listener_test");
        assert!(artifact.metadata.failure_reason.is_none());
        assert!(artifact.listeners.is_empty());
        assert!(artifact.network.is_none());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Contract events: org1"), "Contract_events__org1");
        assert_eq!(file_stem("block-range"), "block-range");
        assert_eq!(file_stem(""), "artifact");
    }

    #[tokio::test]
    async fn test_capture_context_and_network() {
        let network = SimulatedNetworkBuilder::new().with_empty_blocks(2).build().unwrap();
        let mut ctx = TestContext::new(HarnessConfig::new());
        ctx.connect_gateway("org1", network.clone()).unwrap();
        ctx.register_event_listener("org1", "created", "marbles", "create")
            .await
            .unwrap();

        let mut collector = ArtifactCollector::new("capture");
        collector.capture_context(&ctx);
        collector.capture_network(&network);

        let artifact = collector.artifact();
        assert_eq!(artifact.gateways, vec!["org1".to_string()]);
        assert_eq!(artifact.listeners.len(), 1);
        assert_eq!(artifact.listeners[0].name(), "created");

        let snapshot = artifact.network.unwrap();
        assert_eq!(snapshot.name, "devnet");
        assert_eq!(snapshot.block_height, 2);
        assert_eq!(snapshot.pending_transactions, 0);
        assert_eq!(snapshot.subscriptions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_follows_context_clock() {
        let ctx = TestContext::new(HarnessConfig::new())
            .with_clock(Arc::new(crate::orchestrator::PausedClock::new()));
        let mut collector = ArtifactCollector::new("timed").started_at(ctx.clock().now());

        ctx.clock().sleep(std::time::Duration::from_millis(250)).await;
        collector.capture_context(&ctx);

        assert_eq!(collector.artifact().metadata.duration_ms, 250);
    }

    #[tokio::test]
    async fn test_save_and_load_artifact() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let network = Arc::new(SimulatedNetwork::new("artifacts"));
        let mut ctx = TestContext::new(HarnessConfig::new());
        ctx.connect_gateway("org1", network.clone())?;
        ctx.register_block_listener("org1", "blocks", Default::default())
            .await?;

        let mut collector = ArtifactCollector::new("save load");
        collector.capture_context(&ctx);
        collector.set_failure_reason("Expected listener 'blocks' call count to be equal to 1, got 0");
        collector.capture_log("ERROR", "step 3 failed");

        let filepath = collector.save(temp_dir.path()).await?;
        assert!(filepath.exists());
        assert!(filepath
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("save_load_")));

        let loaded = load_artifact(&filepath).await?;
        assert_eq!(loaded.metadata.test_name, "save load");
        assert!(loaded
            .metadata
            .failure_reason
            .as_deref()
            .is_some_and(|r| r.contains("call count")));
        assert_eq!(loaded.listeners.len(), 1);
        assert!(loaded.listeners[0].is_active());
        assert_eq!(loaded.logs.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_artifact() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = load_artifact(temp_dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read artifact file"));
    }
}

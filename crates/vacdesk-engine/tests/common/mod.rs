//! Shared integration test harness.

#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use wiremock::MockServer;

use vacdesk_engine::{Engine, EngineConfig};
use vacdesk_pay::ProviderClient;
use vacdesk_store::SqliteStore;

/// An engine wired to an in-memory store, a mock payment provider, and a
/// temp directory for reports and fake pipeline scripts.
pub struct TestHarness {
    pub engine: Engine,
    pub store: SqliteStore,
    pub provider: MockServer,
    pub config: EngineConfig,
    // Keeps the report/script directory alive for the test's duration.
    pub dir: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build a harness, letting the test tweak the config first. The
    /// pipeline path defaults to a script that must be installed with
    /// [`TestHarness::install_pipeline`].
    pub async fn with_config(tweak: impl FnOnce(&mut EngineConfig)) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir().expect("create temp dir");
        let provider = MockServer::start().await;
        let store = SqliteStore::open_in_memory().await.expect("open store");

        let mut config = EngineConfig {
            report_dir: dir.path().join("reports"),
            pipeline_path: dir.path().join("pipeline.sh"),
            ..EngineConfig::default()
        };
        tweak(&mut config);

        let client = ProviderClient::with_base_url("shop", "secret", provider.uri())
            .expect("build provider client");
        let engine = Engine::new(store.clone(), client, &config);

        Self {
            engine,
            store,
            provider,
            config,
            dir,
        }
    }

    /// Write the fake pipeline script and mark it executable.
    pub fn install_pipeline(&self, body: &str) {
        let path = &self.config.pipeline_path;
        std::fs::write(path, body).expect("write pipeline script");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                .expect("chmod pipeline script");
        }
    }

    /// A pipeline that emits the full happy-path event stream and writes
    /// a real report file.
    pub fn install_succeeding_pipeline(&self) {
        self.install_pipeline(
            r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then out="$2"; fi
  shift
done
mkdir -p "$out"
printf 'raw' > "$out/raw.csv"
printf 'report' > "$out/report.xlsx"
echo "{\"status\":\"csv\",\"path\":\"$out/raw.csv\"}"
echo "some progress chatter"
echo "{\"status\":\"report\",\"format\":\"xlsx\",\"path\":\"$out/report.xlsx\"}"
echo "{\"status\":\"done\",\"files\":[\"$out/report.xlsx\"]}"
"#,
        );
    }

    /// A pipeline that writes an artifact but never announces it, forcing
    /// the directory-scan fallback.
    pub fn install_silent_pipeline(&self) {
        self.install_pipeline(
            r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then out="$2"; fi
  shift
done
mkdir -p "$out"
printf 'report' > "$out/quiet.xlsx"
"#,
        );
    }

    /// A pipeline that sleeps far past any test deadline.
    pub fn install_hanging_pipeline(&self) {
        self.install_pipeline("#!/bin/sh\nsleep 60\n");
    }

    /// A pipeline that prints diagnostics and exits non-zero.
    pub fn install_failing_pipeline(&self) {
        self.install_pipeline(
            "#!/bin/sh\necho 'connection refused' >&2\necho 'retrying'\nexit 3\n",
        );
    }

    /// Expected per-user output directory.
    pub fn user_report_dir(&self, user_id: i64) -> PathBuf {
        self.config.report_dir.join(user_id.to_string())
    }
}

/// Provider payment JSON body for wiremock responders.
pub fn provider_payment_json(id: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "status": status,
        "paid": status == "succeeded",
        "confirmation": { "confirmation_url": "https://pay.example/confirm" }
    })
}

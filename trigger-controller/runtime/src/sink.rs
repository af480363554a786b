use crate::generator::Configuration;
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Writes each new configuration to disk.
pub(crate) struct Sink {
    path: PathBuf,
    version: Option<String>,
}

impl Sink {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            version: None,
        }
    }

    /// Writes artifacts until the scheduler stops publishing them. Holding
    /// `drain` keeps shutdown waiting for the final write.
    pub(crate) async fn run(
        mut self,
        mut artifacts: watch::Receiver<Option<Arc<Configuration>>>,
        drain: drain::Watch,
    ) {
        while artifacts.changed().await.is_ok() {
            let artifact = artifacts.borrow_and_update().clone();
            if let Some(config) = artifact {
                if let Err(error) = self.write(&config).await {
                    warn!(path = %self.path.display(), %error, "failed to write configuration");
                }
            }
        }
        debug!("artifacts closed");
        drop(drain);
    }

    /// Replaces the file atomically. Writes are skipped when the version is
    /// unchanged.
    async fn write(&mut self, config: &Configuration) -> Result<bool> {
        if self.version.as_deref() == Some(config.version.as_str()) {
            debug!(version = %config.version, "configuration unchanged");
            return Ok(false);
        }

        let json = serde_json::to_vec_pretty(config)?;
        let tmp = self.path.with_extension("tmp");
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming {}", tmp.display()))?;

        info!(
            version = %config.version,
            gateways = config.gateways.len(),
            path = %self.path.display(),
            "wrote configuration"
        );
        self.version = Some(config.version.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(version: &str) -> Configuration {
        Configuration {
            version: version.to_string(),
            gateways: vec![],
        }
    }

    #[tokio::test]
    async fn writes_new_versions_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out").join("config.json");
        let mut sink = Sink::new(path.clone());

        assert!(sink.write(&config("a")).await.expect("write"));
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(written["version"], "a");

        assert!(!sink.write(&config("a")).await.expect("write"));
        assert!(sink.write(&config("b")).await.expect("write"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn runs_until_artifacts_close() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let (tx, rx) = watch::channel(None);
        let (signal, drain) = drain::channel();

        let task = tokio::spawn(Sink::new(path.clone()).run(rx, drain));
        tx.send_replace(Some(Arc::new(config("a"))));
        drop(tx);
        task.await.expect("sink must not panic");
        signal.drain().await;

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(written["version"], "a");
    }
}

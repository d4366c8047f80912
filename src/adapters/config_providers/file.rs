use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::{
    config::{loader::load_config, models::GatewayConfig},
    ports::config_provider::ConfigProvider,
};

/// Configuration provider that loads from a local file and watches for changes.
pub struct FileConfigProvider {
    path: PathBuf,
    // Kept alive for the lifetime of the provider
    _watcher: Option<notify::RecommendedWatcher>,
    update_tx: mpsc::Sender<()>,
    // Taken once by `watch()`
    update_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (tx, rx) = mpsc::channel(1);

        let mut provider = Self {
            path,
            _watcher: None,
            update_tx: tx,
            update_rx: std::sync::Mutex::new(Some(rx)),
        };

        provider.init_watcher()?;
        Ok(provider)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_watcher(&mut self) -> Result<()> {
        let tx = self.update_tx.clone();
        let config_filename = self
            .path
            .file_name()
            .ok_or_else(|| eyre::eyre!("Invalid config path: {}", self.path.display()))?
            .to_owned();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if (event.kind.is_modify()
                            || event.kind.is_create()
                            || event.kind.is_remove())
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(&config_filename))
                        {
                            tracing::debug!("Config file changed: {:?}", event.kind);
                            // A full channel already holds a pending reload
                            let _ = tx.try_send(());
                        }
                    }
                    Err(e) => tracing::error!("File watch error: {:?}", e),
                }
            })?;

        let watch_dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        watcher
            .watch(watch_dir, RecursiveMode::NonRecursive)
            .wrap_err("Failed to watch config directory")?;

        self._watcher = Some(watcher);
        Ok(())
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn load_config(&self) -> Result<GatewayConfig> {
        load_config(&self.path)
            .wrap_err_with(|| format!("Failed to load config from {}", self.path.display()))
    }

    fn watch(&self) -> mpsc::Receiver<()> {
        let taken = self
            .update_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        taken.unwrap_or_else(|| {
            tracing::warn!("Config watch channel already taken, returning a closed receiver");
            mpsc::channel(1).1
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Write};

    use tempfile::tempdir;
    use tokio::time::{Duration, sleep};

    use super::*;

    const INITIAL: &str = r#"{"routes": [{"path": "/a", "method": "GET", "backend_service": "svc", "backend_port": 80}]}"#;
    const UPDATED: &str = r#"{"routes": [{"path": "/a", "method": "GET", "backend_service": "svc", "backend_port": 80}, {"path": "/b", "method": "POST", "backend_service": "svc", "backend_port": 80}]}"#;

    #[tokio::test]
    async fn test_file_config_provider() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("tollgate.json");
        {
            let mut file = File::create(&file_path)?;
            file.write_all(INITIAL.as_bytes())?;
        }

        let provider = FileConfigProvider::new(&file_path)?;
        let config = provider.load_config().await?;
        assert_eq!(config.routes.len(), 1);

        let mut rx = provider.watch();

        // Sleep briefly to ensure file system timestamp difference if needed
        sleep(Duration::from_millis(100)).await;
        {
            let mut file = File::create(&file_path)?;
            file.write_all(UPDATED.as_bytes())?;
        }

        let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(notification.is_ok(), "Timed out waiting for config update");
        assert!(
            notification.unwrap().is_some(),
            "Channel closed unexpectedly"
        );

        let config = provider.load_config().await?;
        assert_eq!(config.routes.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_watches_file_created_after_start() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("tollgate.json");

        let provider = FileConfigProvider::new(&file_path)?;
        assert!(provider.load_config().await.is_err());
        let mut rx = provider.watch();

        sleep(Duration::from_millis(100)).await;
        File::create(&file_path)?.write_all(INITIAL.as_bytes())?;

        let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(notification, Ok(Some(()))));
        assert_eq!(provider.load_config().await?.routes.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_watch_can_only_be_taken_once() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("tollgate.json");
        File::create(&file_path)?.write_all(INITIAL.as_bytes())?;

        let provider = FileConfigProvider::new(&file_path)?;
        let _first = provider.watch();
        let mut second = provider.watch();
        assert!(second.recv().await.is_none());
        Ok(())
    }
}

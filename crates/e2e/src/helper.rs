//! Background helper processes (backend server, coverage collector)
//!
//! Each helper is tracked by a pid file named after it, `<dir>/<name>.pid`,
//! so a later teardown step can find and stop it.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// Pid file for a named helper
#[derive(Debug, Clone)]
pub struct PidFile {
    name: String,
    path: PathBuf,
}

impl PidFile {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: dir.join(format!("{}.pid", name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, pid: u32) -> E2eResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, format!("{}\n", pid))?;
        Ok(())
    }

    pub fn read(&self) -> E2eResult<i32> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(E2eError::HelperNotRunning(self.name.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        raw.trim().parse().map_err(|_| {
            E2eError::InvalidConfig(format!("bad pid file {}: {:?}", self.path.display(), raw.trim()))
        })
    }

    /// Remove the pid file; a missing file is not an error.
    pub fn remove(&self) -> E2eResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Stop the helper recorded under `dir/<name>.pid` with SIGTERM.
///
/// Returns the signalled pid. A pid that no longer exists only removes the
/// stale pid file.
pub fn stop_helper(dir: &Path, name: &str) -> E2eResult<i32> {
    let pidfile = PidFile::new(dir, name);
    let pid = pidfile.read()?;

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => info!("Sent SIGTERM to {} (pid: {})", name, pid),
        Err(Errno::ESRCH) => warn!("{} (pid: {}) was not running", name, pid),
        Err(e) => return Err(e.into()),
    }

    pidfile.remove()?;
    Ok(pid)
}

/// Handle to a running helper process
pub struct HelperHandle {
    name: String,
    child: Child,
    pidfile: PidFile,
    stopped: bool,
}

impl HelperHandle {
    /// Spawn a helper, record its pid file, and wait for it to be healthy
    pub async fn spawn(config: &HelperConfig, pid_dir: &Path) -> E2eResult<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| E2eError::HelperStartup(config.name.clone(), "empty command".to_string()))?;

        std::fs::create_dir_all(pid_dir)?;
        let log_path = pid_dir.join(format!("{}.log", config.name));
        let log = File::create(&log_path)?;

        info!("Spawning helper {}: {}", config.name, config.command.join(" "));

        let child = Command::new(program)
            .args(args)
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log)
            .spawn()
            .map_err(|e| E2eError::HelperStartup(config.name.clone(), e.to_string()))?;

        let pidfile = PidFile::new(pid_dir, &config.name);
        pidfile.write(child.id())?;

        let mut handle = HelperHandle {
            name: config.name.clone(),
            child,
            pidfile,
            stopped: false,
        };

        if let Some(url) = &config.health_url {
            if let Err(e) = handle.wait_for_healthy(url, config.startup_timeout()).await {
                let _ = handle.stop();
                return Err(e);
            }
            info!("Helper {} is healthy at {}", handle.name, url);
        }

        Ok(handle)
    }

    /// Wait for the helper to respond to health checks
    async fn wait_for_healthy(&self, health_url: &str, timeout_duration: Duration) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for {} to start...", self.name);
                    }
                    // Connection refused is expected while the helper is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::HelperHealthCheck(attempts))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn pidfile(&self) -> &PidFile {
        &self.pidfile
    }

    /// Stop the helper and remove its pid file
    pub fn stop(&mut self) -> E2eResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        info!("Stopping {} (pid: {})", self.name, self.child.id());

        // Try graceful shutdown first
        let pid = Pid::from_raw(self.child.id() as i32);
        if kill(pid, Signal::SIGTERM).is_ok() {
            for _ in 0..10 {
                if matches!(self.child.try_wait(), Ok(Some(_))) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        let _ = self.child.wait();

        self.pidfile.remove()
    }
}

impl Drop for HelperHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning a helper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperConfig {
    /// Logical name, also the pid file name
    pub name: String,

    /// Program and arguments
    pub command: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Polled until it answers 2xx
    #[serde(default)]
    pub health_url: Option<String>,

    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

fn default_startup_timeout_ms() -> u64 {
    30_000
}

impl HelperConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper(name: &str) -> HelperConfig {
        HelperConfig {
            name: name.to_string(),
            command: vec!["sleep".to_string(), "30".to_string()],
            env: BTreeMap::new(),
            health_url: None,
            startup_timeout_ms: 1000,
        }
    }

    #[test]
    fn test_pidfile_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path(), "backend");

        pidfile.write(4242).unwrap();
        assert_eq!(pidfile.path(), dir.path().join("backend.pid"));
        assert_eq!(pidfile.read().unwrap(), 4242);

        pidfile.remove().unwrap();
        pidfile.remove().unwrap();
        assert!(matches!(pidfile.read(), Err(E2eError::HelperNotRunning(n)) if n == "backend"));
    }

    #[test]
    fn test_garbage_pidfile_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("collector.pid"), "not-a-pid").unwrap();

        let err = PidFile::new(dir.path(), "collector").read().unwrap_err();
        assert!(matches!(err, E2eError::InvalidConfig(_)));
    }

    #[test]
    fn test_stop_missing_helper() {
        let dir = tempfile::tempdir().unwrap();
        let err = stop_helper(dir.path(), "backend").unwrap_err();
        assert!(matches!(err, E2eError::HelperNotRunning(_)));
    }

    #[test]
    fn test_stop_helper_signals_recorded_pid() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        PidFile::new(dir.path(), "collector").write(child.id()).unwrap();

        let pid = stop_helper(dir.path(), "collector").unwrap();
        assert_eq!(pid, child.id() as i32);

        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(!dir.path().join("collector.pid").exists());
    }

    #[tokio::test]
    async fn test_spawn_writes_and_stop_removes_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = HelperHandle::spawn(&sleeper("backend"), dir.path()).await.unwrap();

        let pidfile = PidFile::new(dir.path(), "backend");
        assert_eq!(pidfile.read().unwrap(), handle.pid() as i32);
        assert!(dir.path().join("backend.log").exists());

        handle.stop().unwrap();
        assert!(!pidfile.path().exists());
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sleeper("backend");
        config.command.clear();

        let err = HelperHandle::spawn(&config, dir.path()).await.err().unwrap();
        assert!(matches!(err, E2eError::HelperStartup(..)));
    }
}

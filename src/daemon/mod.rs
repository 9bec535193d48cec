pub mod dispatcher;
pub mod scheduler;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::Notify;

use crate::clock::SystemClock;
use crate::daemon::dispatcher::{Dispatcher, LoggingDeliveryChannel, WebhookDeliveryChannel};
use crate::daemon::scheduler::Scheduler;
use crate::models::AppConfig;
use crate::server::{self, AppState};
use crate::storage::devices::JsonDeviceStore;
use crate::storage::jobs::JsonJobStore;
use crate::storage::plans::JsonPlanStore;
use crate::storage::settings::JsonSettingsStore;
use crate::storage::{DeviceStore, JobStore, PlanStore, SettingsStore};

// ---------------------------------------------------------------------------
// PidFile -- exclusive PID file acquisition
// ---------------------------------------------------------------------------

/// Guards against two daemon instances running against the same data
/// directory. Uses exclusive file creation (CREATE_NEW / O_EXCL) so the
/// race between "check" and "create" can't be won by two processes at once.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Acquire the PID file, removing a stale one first if its recorded
    /// process is no longer alive.
    pub fn acquire(&self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)
                .context("Failed to read existing PID file")?;
            let existing_pid: u32 = content
                .trim()
                .parse()
                .context("Failed to parse PID from PID file")?;

            if is_process_alive(existing_pid) {
                return Err(anyhow::anyhow!(
                    "planner daemon is already running (PID {existing_pid}). PID file: {}",
                    self.path.display()
                ));
            }

            tracing::warn!(
                "removing stale PID file (PID {} is no longer running)",
                existing_pid
            );
            std::fs::remove_file(&self.path).context("Failed to remove stale PID file")?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .context("Failed to create PID file (exclusive create)")?;

        let pid = std::process::id();
        use std::io::Write;
        write!(file, "{pid}").context("Failed to write PID to PID file")?;
        file.flush().context("Failed to flush PID file")?;

        tracing::info!("PID file acquired: {} (PID {})", self.path.display(), pid);
        Ok(())
    }

    pub fn release(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove PID file")?;
            tracing::info!("PID file released: {}", self.path.display());
        }
        Ok(())
    }

    pub fn is_alive(&self) -> bool {
        if !self.path.exists() {
            return false;
        }
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match content.trim().parse::<u32>() {
                Ok(pid) => is_process_alive(pid),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Check whether a process with the given PID is alive.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }

    #[cfg(windows)]
    {
        const PROCESS_QUERY_LIMITED_INFORMATION: u32 = 0x1000;
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                false
            } else {
                CloseHandle(handle);
                true
            }
        }
    }
}

#[cfg(windows)]
extern "system" {
    fn OpenProcess(dwDesiredAccess: u32, bInheritHandle: i32, dwProcessId: u32) -> *mut std::ffi::c_void;
    fn CloseHandle(hObject: *mut std::ffi::c_void) -> i32;
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Resolution order: explicit `--config` path, then `PLANNER_CONFIG_DIR` env
/// var, then the platform config dir, then `{data_dir}/config.json`, then
/// `AppConfig::default()`.
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = config_path {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: AppConfig =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            tracing::info!("loaded config from: {}", path.display());
            return Ok(config);
        }
        return Err(anyhow::anyhow!("config file not found: {}", path.display()));
    }

    if let Ok(config_dir) = std::env::var("PLANNER_CONFIG_DIR") {
        let path = PathBuf::from(&config_dir).join("config.json");
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .context("Failed to read config from PLANNER_CONFIG_DIR")?;
            let config: AppConfig = serde_json::from_str(&content)
                .context("Failed to parse config from PLANNER_CONFIG_DIR")?;
            tracing::info!("loaded config from PLANNER_CONFIG_DIR: {}", path.display());
            return Ok(config);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("planner").join("config.json");
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .context("Failed to read config from platform config dir")?;
            let config: AppConfig = serde_json::from_str(&content)
                .context("Failed to parse config from platform config dir")?;
            tracing::info!("loaded config from: {}", path.display());
            return Ok(config);
        }
    }

    let data_dir = resolve_data_dir(None);
    let path = data_dir.join("config.json");
    if path.exists() {
        let content =
            std::fs::read_to_string(&path).context("Failed to read config from data dir")?;
        let config: AppConfig =
            serde_json::from_str(&content).context("Failed to parse config from data dir")?;
        tracing::info!("loaded config from: {}", path.display());
        return Ok(config);
    }

    tracing::info!("no config file found, using defaults");
    Ok(AppConfig::default())
}

/// Resolve the data directory: override, then `PLANNER_DATA_DIR` env, then
/// the platform default.
pub fn resolve_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    if let Ok(d) = std::env::var("PLANNER_DATA_DIR") {
        return PathBuf::from(d);
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("PROGRAMDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\ProgramData"))
            .join("planner")
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("planner")
    }
}

pub async fn create_data_dirs(data_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    tracing::info!("data directory ensured at: {}", data_dir.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

/// Release the PID file. Scheduler pump abort and server drain are handled
/// by the caller before invoking this, since those hold task handles this
/// function has no access to.
pub fn graceful_shutdown(pid_file: Option<&PidFile>) {
    tracing::info!("beginning graceful shutdown sequence...");
    if let Some(pf) = pid_file {
        if let Err(e) = pf.release() {
            tracing::error!("failed to release PID file: {}", e);
        }
    }
    tracing::info!("graceful shutdown complete.");
}

// ---------------------------------------------------------------------------
// Daemon bootstrap
// ---------------------------------------------------------------------------

/// Start the daemon: load config, acquire the PID file, wire up the stores,
/// scheduler pump, and HTTP server, then block until a shutdown signal
/// arrives.
pub async fn start_daemon(
    config_path: Option<&Path>,
    data_dir_override: Option<&Path>,
    host_override: Option<&str>,
    port_override: Option<u16>,
    foreground: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(h) = host_override {
        config.host = h.to_string();
    }
    if let Some(p) = port_override {
        config.port = p;
    }

    let data_dir = if let Some(d) = data_dir_override {
        d.to_path_buf()
    } else if let Some(ref d) = config.data_dir {
        d.clone()
    } else {
        resolve_data_dir(None)
    };
    config.data_dir = Some(data_dir.clone());
    let config = Arc::new(config);

    create_data_dirs(&data_dir).await?;

    let pid_file_path = data_dir.join("plannerd.pid");
    let pid_file = PidFile::new(pid_file_path);
    pid_file.acquire()?;

    let plan_store = Arc::new(JsonPlanStore::new(data_dir.clone()).await?) as Arc<dyn PlanStore>;
    let job_store = Arc::new(JsonJobStore::new(data_dir.clone()).await?) as Arc<dyn JobStore>;
    let settings_store =
        Arc::new(JsonSettingsStore::new(data_dir.clone()).await?) as Arc<dyn SettingsStore>;
    let device_store =
        Arc::new(JsonDeviceStore::new(data_dir.clone()).await?) as Arc<dyn DeviceStore>;

    let clock = Arc::new(SystemClock);
    let scheduler_notify = Arc::new(Notify::new());

    let delivery_channel: Arc<dyn dispatcher::DeliveryChannel> =
        match std::env::var("PLANNER_WEBHOOK_URL") {
            Ok(url) => Arc::new(WebhookDeliveryChannel::new(url)),
            Err(_) => Arc::new(LoggingDeliveryChannel),
        };

    let disp = Arc::new(Dispatcher::new(
        Arc::clone(&plan_store),
        Arc::clone(&settings_store),
        Arc::clone(&device_store),
        Arc::clone(&job_store),
        delivery_channel,
        Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
        Arc::clone(&config),
    ));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&plan_store),
        Arc::clone(&job_store),
        Arc::clone(&settings_store),
        Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
        Arc::clone(&scheduler_notify),
        disp,
        config.fallback_timezone.clone(),
    ));

    scheduler
        .startup_recovery()
        .await
        .context("startup recovery failed")?;

    let pump_scheduler = Arc::clone(&scheduler);
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = pump_scheduler.run().await {
            tracing::error!("scheduler pump error: {}", e);
        }
    });

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(());

    let state = Arc::new(AppState {
        plan_store,
        job_store,
        settings_store,
        device_store,
        scheduler,
        config: Arc::clone(&config),
        clock: clock as Arc<dyn crate::clock::Clock>,
        start_time: Instant::now(),
        shutdown_tx: shutdown_tx.clone(),
    });

    let router = server::create_router(Arc::clone(&state));
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context(format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("daemon started. listening on http://{}", bind_addr);
    if foreground {
        tracing::info!("running in foreground mode. Press Ctrl+C to stop.");
    }

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
                tracing::info!("HTTP server received shutdown signal");
            })
            .await
            .ok();
    });

    let mut api_shutdown_rx = shutdown_tx.subscribe();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C signal");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM signal");
            }
            _ = api_shutdown_rx.changed() => {
                tracing::info!("received API shutdown signal");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C signal");
            }
            _ = api_shutdown_rx.changed() => {
                tracing::info!("received API shutdown signal");
            }
        }
    }

    let _ = shutdown_tx.send(());
    scheduler_handle.abort();

    graceful_shutdown(Some(&pid_file));

    let _ = server_handle.await;

    tracing::info!("daemon exited cleanly.");
    Ok(())
}

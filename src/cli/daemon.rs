use anyhow::Context;
use reqwest::Client;
use serde_json::Value;

use super::{base_url, connection_error_message};

/// Helper to handle reqwest errors and produce a user-friendly connection error.
fn handle_request_error(err: reqwest::Error, host: &str, port: u16) -> anyhow::Error {
    if err.is_connect() || err.is_timeout() {
        anyhow::anyhow!("{}", connection_error_message(host, port))
    } else {
        anyhow::anyhow!("Request failed: {}", err)
    }
}

/// plannerd start
pub async fn cmd_start(
    host: &str,
    foreground: bool,
    config: Option<&str>,
    port_override: Option<u16>,
    data_dir: Option<&str>,
) -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .try_init();

    if !foreground {
        eprintln!("plannerd only runs in the foreground; retry with --foreground.");
        anyhow::bail!("background/service mode is not supported");
    }

    let config_path = config.map(std::path::Path::new);
    let data_dir_path = data_dir.map(std::path::Path::new);
    let host_override = if host != "127.0.0.1" { Some(host) } else { None };

    crate::daemon::start_daemon(config_path, data_dir_path, host_override, port_override, true).await
}

/// plannerd stop
pub async fn cmd_stop(host: &str, port: u16, force: bool) -> anyhow::Result<()> {
    if force {
        println!("Force stopping daemon...");
        return force_kill_daemon();
    }

    let client = Client::new();
    let url = format!("{}/api/shutdown", base_url(host, port));

    match client.post(&url).send().await {
        Ok(response) => {
            let status = response.status();
            let body: Value = response
                .json()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;

            if status.is_success() {
                println!("Daemon is shutting down...");
                Ok(())
            } else {
                let message = body["message"].as_str().unwrap_or("Unknown error");
                eprintln!("Error: {}", message);
                std::process::exit(1);
            }
        }
        Err(e) => Err(handle_request_error(e, host, port)),
    }
}

/// Force kill the daemon by reading the PID file and terminating the process.
fn force_kill_daemon() -> anyhow::Result<()> {
    let data_dir = crate::daemon::resolve_data_dir(None);
    let pid_file_path = data_dir.join("plannerd.pid");

    if !pid_file_path.exists() {
        println!("No PID file found. Daemon may not be running.");
        return Ok(());
    }

    let content = std::fs::read_to_string(&pid_file_path).context("Failed to read PID file")?;
    let pid: u32 = content
        .trim()
        .parse()
        .context("Failed to parse PID from PID file")?;

    println!("Found daemon PID: {}", pid);

    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGKILL) };
        if result == 0 {
            println!("Sent SIGKILL to process {}", pid);
        } else {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                println!("Process {} not found (already dead)", pid);
            } else {
                return Err(anyhow::anyhow!("Failed to kill process {}: {}", pid, err));
            }
        }
    }

    #[cfg(windows)]
    {
        let status = std::process::Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .status()
            .context("Failed to execute taskkill")?;

        if status.success() {
            println!("Terminated process {}", pid);
        } else {
            println!(
                "taskkill exited with code {:?} (process may already be dead)",
                status.code()
            );
        }
    }

    if let Err(e) = std::fs::remove_file(&pid_file_path) {
        println!("Warning: Could not remove PID file: {}", e);
    } else {
        println!("Removed PID file.");
    }

    println!("Force stop complete.");
    Ok(())
}

/// plannerd status
pub async fn cmd_status(host: &str, port: u16, verbose: bool) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/health", base_url(host, port));

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;

    if !status.is_success() {
        let message = body["message"].as_str().unwrap_or("Daemon returned an error");
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }

    let daemon_status = body["status"].as_str().unwrap_or("unknown");
    let version = body["version"].as_str().unwrap_or("unknown");
    let uptime = body["uptime_seconds"].as_u64().unwrap_or(0);
    let pending_plans = body["pending_plan_count"].as_u64().unwrap_or(0);
    let data_dir = body["data_dir"].as_str().unwrap_or("unknown");

    println!("Daemon Status: {}", daemon_status);
    println!("  Data Dir:      {}", data_dir);
    println!("  API:           http://{}:{}", host, port);
    println!("  Pending plans: {}", pending_plans);
    println!("  Uptime:        {}", format_uptime(uptime));
    println!("  Version:       {}", version);

    if verbose {
        println!("\nRaw response:");
        println!("{}", serde_json::to_string_pretty(&body)?);
    }

    Ok(())
}

/// Format uptime seconds into a human-readable string.
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, mins, secs)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

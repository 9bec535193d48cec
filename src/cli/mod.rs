pub mod daemon;

use clap::{Parser, Subcommand};

/// Personal planning backend with durable, timezone-aware notification scheduling.
#[derive(Parser, Debug)]
#[command(
    name = "plannerd",
    version,
    about = "Personal planning backend with durable, timezone-aware notification scheduling"
)]
pub struct Cli {
    /// Daemon host
    #[arg(long, default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// Daemon port
    #[arg(long, default_value_t = 8417, global = true)]
    pub port: u16,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon
    Start {
        /// Run in foreground (this is currently the only supported mode)
        #[arg(short = 'f', long)]
        foreground: bool,

        /// Path to configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Data directory path
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },

    /// Stop the daemon
    Stop {
        /// Force kill the daemon process via its PID file
        #[arg(long)]
        force: bool,
    },

    /// Show daemon status
    Status,
}

/// Build the base URL for the daemon HTTP API.
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

/// Format a connection error message for when the daemon is not reachable.
pub fn connection_error_message(host: &str, port: u16) -> String {
    format!(
        "Could not connect to daemon at {}:{}. Is it running? (try: plannerd start --foreground)",
        host, port
    )
}

/// Dispatch the CLI command to the appropriate handler.
pub async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Start {
            foreground,
            config,
            port,
            data_dir,
        }) => {
            daemon::cmd_start(
                &cli.host,
                *foreground,
                config.as_deref(),
                *port,
                data_dir.as_deref(),
            )
            .await
        }
        Some(Commands::Stop { force }) => daemon::cmd_stop(&cli.host, cli.port, *force).await,
        Some(Commands::Status) => daemon::cmd_status(&cli.host, cli.port, cli.verbose).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_version_flag() {
        let result = Cli::try_parse_from(["plannerd", "--version"]);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_default_host_port() {
        let cli = Cli::try_parse_from(["plannerd", "status"]).expect("should parse with defaults");
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 8417);
    }

    #[test]
    fn test_cli_start_all_flags() {
        let cli = Cli::try_parse_from([
            "plannerd",
            "start",
            "--foreground",
            "--config",
            "/etc/plannerd/config.json",
            "--port",
            "9000",
            "--data-dir",
            "/var/plannerd",
        ])
        .expect("should parse start with all flags");

        match &cli.command {
            Some(Commands::Start {
                foreground,
                config,
                port,
                data_dir,
            }) => {
                assert!(foreground);
                assert_eq!(config.as_deref(), Some("/etc/plannerd/config.json"));
                assert_eq!(*port, Some(9000));
                assert_eq!(data_dir.as_deref(), Some("/var/plannerd"));
            }
            other => panic!("expected Start command, got: {:?}", other),
        }
    }

    #[test]
    fn test_cli_stop_force() {
        let cli = Cli::try_parse_from(["plannerd", "stop", "--force"]).expect("should parse stop --force");
        match &cli.command {
            Some(Commands::Stop { force }) => assert!(force),
            other => panic!("expected Stop command, got: {:?}", other),
        }
    }

    #[test]
    fn test_cli_global_host_port() {
        let cli = Cli::try_parse_from(["plannerd", "--host", "192.168.1.100", "--port", "9999", "status"])
            .expect("should parse global host/port");
        assert_eq!(cli.host, "192.168.1.100");
        assert_eq!(cli.port, 9999);
        assert!(matches!(cli.command, Some(Commands::Status)));
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["plannerd", "-v", "status"]).expect("should parse -v flag");
        assert!(cli.verbose);
    }

    #[test]
    fn test_connection_error_message() {
        let msg = connection_error_message("127.0.0.1", 8417);
        assert_eq!(
            msg,
            "Could not connect to daemon at 127.0.0.1:8417. Is it running? (try: plannerd start --foreground)"
        );
    }

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("127.0.0.1", 8417), "http://127.0.0.1:8417");
        assert_eq!(base_url("0.0.0.0", 9000), "http://0.0.0.0:9000");
    }
}

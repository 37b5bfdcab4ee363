//! respool - send one command to a Redis-compatible server
//!
//! This is a thin command-line runner around the respool client. It sends the
//! command given on the command line and prints the reply the way redis-cli
//! does.

use anyhow::{bail, Context};
use respool::{ClientConfig, ClientHandle, RespValue};
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Runner configuration
struct Config {
    /// Host to connect to
    host: String,
    /// Port to connect to
    port: u16,
    /// Connect timeout
    connect_timeout: Duration,
    /// Command name followed by its arguments
    command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: respool::DEFAULT_HOST.to_string(),
            port: respool::DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            command: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = args.next().context("--host requires a value")?;
                }
                "--port" | "-p" => {
                    let port = args.next().context("--port requires a value")?;
                    config.port = port
                        .parse()
                        .with_context(|| format!("invalid port number: {}", port))?;
                }
                "--timeout" | "-t" => {
                    let secs = args.next().context("--timeout requires a value")?;
                    let secs: u64 = secs
                        .parse()
                        .with_context(|| format!("invalid timeout: {}", secs))?;
                    config.connect_timeout = Duration::from_secs(secs);
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("respool version {}", respool::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    config.command.push(arg);
                    config.command.extend(args.by_ref());
                }
            }
        }

        if config.command.is_empty() {
            print_help();
            bail!("no command given");
        }

        Ok(config)
    }

    fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new(self.host.clone(), self.port);
        client.max_idle = 1;
        client.connect_timeout = Some(self.connect_timeout);
        client
    }
}

fn print_help() {
    println!(
        r#"
respool - send one command to a Redis-compatible server

USAGE:
    respool [OPTIONS] <COMMAND> [ARGS...]

OPTIONS:
    -h, --host <HOST>       Server host (default: 127.0.0.1)
    -p, --port <PORT>       Server port (default: 6379)
    -t, --timeout <SECS>    Connect timeout in seconds (default: 5)
    -v, --version           Print version information
        --help              Print this help message

EXAMPLES:
    respool PING
    respool SET name Ariz
    respool --port 6380 GET name

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=respool=trace) to see connection activity.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = Config::from_args()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let client = ClientHandle::spawn(config.client_config());
    let (name, args) = config.command.split_first().context("no command given")?;

    debug!(command = %name, args = args.len(), "Sending command");
    let reply = client
        .invoke(name, args)
        .await
        .with_context(|| format!("{} failed against {}:{}", name, config.host, config.port))?;

    println!("{}", reply);
    debug!(stats = %client.stats(), "Done");

    Ok(if matches!(reply, RespValue::Error(_)) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use ssh_tunnel_proxy::config::{seed_defaults, JsonFileStore, ProxyConfig};
use ssh_tunnel_proxy::{
    logging, should_route, ConfigStore, LocalOperator, RequestDescriptor, RoutingClient,
    StatusService,
};

#[derive(Parser, Debug)]
#[command(name = "ssh-tunnel-proxy", version, about = "Route selected HTTP requests through an SSH SOCKS5 tunnel")]
struct Cli {
    /// JSON settings file
    #[arg(
        long,
        global = true,
        env = "SSH_TUNNEL_PROXY_CONFIG",
        default_value = "ssh-tunnel-proxy.json"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the tunnel and list sockets bound to its port
    Status,
    /// Show whether a URL would be routed and the resulting request
    Route { url: String },
    /// Send a request, through the tunnel when the settings say so
    Fetch {
        url: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Extra header as `Name: value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// Inspect or change settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the sanitized settings
    Show,
    /// Write defaults for unset keys
    Init,
    /// Set a key; several values are joined with newlines (for whitelist_domains)
    Set {
        key: String,
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Remove a key so its default applies
    Unset { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let store = Arc::new(
        JsonFileStore::open(&cli.config)
            .with_context(|| format!("opening settings {}", cli.config.display()))?,
    );
    let config = ProxyConfig::load(store.as_ref()).context("loading settings")?;
    logging::init(config.debug_mode);

    match cli.command {
        Command::Status => {
            let service = StatusService::new(store);
            let report = service.test_tunnel_now(&LocalOperator).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Route { url } => {
            let client = RoutingClient::new(store)?;
            let (req, config) = client.prepare(RequestDescriptor::get(url))?;
            let out = serde_json::json!({
                "route": should_route(&req.url, &config),
                "request": req,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Fetch {
            url,
            method,
            headers,
        } => {
            let mut req = RequestDescriptor::get(url);
            req.method = method;
            for header in headers {
                let (name, value) = header
                    .split_once(':')
                    .with_context(|| format!("header `{header}` is not `Name: value`"))?;
                req = req.with_header(name.trim(), value.trim());
            }
            let client = RoutingClient::new(store)?;
            let response = client.execute(req).await?;
            println!("{}", response.status());
            println!("{}", response.text().await.context("reading response body")?);
        }
        Command::Config(command) => run_config(store.as_ref(), command)?,
    }
    Ok(())
}

fn run_config(store: &JsonFileStore, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {}
        ConfigCommand::Init => seed_defaults(store)?,
        ConfigCommand::Set { key, values } => store.set(&key, parse_value(values))?,
        ConfigCommand::Unset { key } => store.remove(&key)?,
    }
    let config = ProxyConfig::load(store)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn parse_value(values: Vec<String>) -> Value {
    if values.len() == 1 {
        let raw = &values[0];
        return match serde_json::from_str::<Value>(raw) {
            Ok(v @ (Value::Bool(_) | Value::Number(_))) => v,
            _ => Value::from(raw.clone()),
        };
    }
    Value::from(values.join("\n"))
}

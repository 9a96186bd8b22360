use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Upper bound on a diagnostic command so a hung tool never stalls a status check.
pub const INSPECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Lists local sockets or processes bound to the tunnel port.
///
/// Best-effort diagnostic: lines are returned verbatim and any failure
/// yields an empty list.
#[async_trait]
pub trait ActiveTunnelInspector: Send + Sync {
    async fn list_active_tunnels(&self, port: u16) -> Vec<String>;
}

/// Filter applied to command output before it is returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFilter {
    All,
    /// Keep lines mentioning `:<port>`
    PortSuffix,
}

/// Runs an external command; `{port}` in any argument is replaced with the port
#[derive(Debug, Clone)]
pub struct CommandInspector {
    program: String,
    args: Vec<String>,
    filter: LineFilter,
    timeout: Duration,
}

impl CommandInspector {
    pub fn new(program: impl Into<String>, args: &[&str], filter: LineFilter) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            filter,
            timeout: INSPECT_TIMEOUT,
        }
    }

    /// `lsof -i :<port>`
    pub fn lsof() -> Self {
        Self::new("lsof", &["-i", ":{port}"], LineFilter::All)
    }

    /// `netstat -n`, keeping lines that mention `:<port>`
    pub fn netstat() -> Self {
        Self::new("netstat", &["-n"], LineFilter::PortSuffix)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn render_args(&self, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.args.iter().map(|a| a.replace("{port}", &port)).collect()
    }
}

#[async_trait]
impl ActiveTunnelInspector for CommandInspector {
    async fn list_active_tunnels(&self, port: u16) -> Vec<String> {
        let mut command = Command::new(&self.program);
        command.args(self.render_args(port)).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(program = %self.program, error = %e, "tunnel inspection unavailable");
                return Vec::new();
            }
            Err(_) => {
                debug!(program = %self.program, "tunnel inspection timed out");
                return Vec::new();
            }
        };

        // lsof exits non-zero when nothing matches; stdout is still meaningful.
        let needle = format!(":{port}");
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .filter(|line| match self.filter {
                LineFilter::All => true,
                LineFilter::PortSuffix => line.contains(&needle),
            })
            .map(str::to_string)
            .collect()
    }
}

/// Inspector for the running OS family, chosen once at startup.
pub fn platform_inspector() -> Box<dyn ActiveTunnelInspector> {
    if cfg!(windows) {
        Box::new(CommandInspector::netstat())
    } else {
        Box::new(CommandInspector::lsof())
    }
}

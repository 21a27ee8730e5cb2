// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Positional strategy and resource names, flags for gateway, timing and output.

use clap::Parser;
use rolling_replacer::config::Overrides;
use rolling_replacer::output::OutputMode;
use rolling_replacer::pipeline::{Strategy, WaitLimit};
use rolling_replacer::types::ResourceName;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rolling-replacer")]
#[command(about = "Swap traffic from an inactive compute group to a new one behind a load balancer")]
#[command(version)]
pub struct Cli {
    /// Pipeline to run: blue-green, or verify (waits only, never terminates)
    pub strategy: Strategy,

    /// Compute group currently serving, to be drained
    pub inactive_group: ResourceName,

    /// Target group of the inactive compute group
    pub inactive_target_group: ResourceName,

    /// Compute group being promoted
    pub new_group: ResourceName,

    /// Target group the new instances register with
    pub new_target_group: ResourceName,

    /// Load balancer fronting both target groups
    pub load_balancer: ResourceName,

    /// Config file (default: discover rolling-replacer.yml in the working directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Control-plane bridge URL
    #[arg(long, value_name = "URL", conflicts_with_all = ["socket", "fixture"])]
    pub endpoint: Option<String>,

    /// Control-plane bridge Unix socket
    #[arg(long, value_name = "PATH", conflicts_with = "fixture")]
    pub socket: Option<PathBuf>,

    /// Rehearse against provider state described in a YAML file
    #[arg(long, value_name = "PATH")]
    pub fixture: Option<PathBuf>,

    /// How long each wait may poll, e.g. 15m, or "none" to wait forever
    #[arg(long, value_name = "DURATION|none")]
    pub wait_timeout: Option<WaitLimit>,

    /// Delay between polls (default 10s)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Break an existing run lock
    #[arg(long)]
    pub force: bool,

    /// Only print the final result
    #[arg(short, long, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            endpoint: self.endpoint.clone(),
            socket: self.socket.clone(),
            fixture: self.fixture.clone(),
            wait_timeout: self.wait_timeout,
            poll_interval: self.poll_interval,
        }
    }
}

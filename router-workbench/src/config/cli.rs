use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct CliOpt {
    /// Path to the JSON file containing the network topology and address
    /// plan (defaults to the built-in dual-router deployment)
    #[arg(long)]
    pub network_graph: Option<PathBuf>,

    /// The deadline for each reachability probe, after which the probe or
    /// its reply are considered lost
    #[arg(long, default_value_t = 1_000)]
    pub probe_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build and start the network, print the routers' routing tables,
    /// verify reachability and drop into an interactive session
    Run(RunOpt),
    /// Build, verify and tear down again, without a session; exits non-zero
    /// when any host pair is unreachable
    Check,
}

#[derive(Parser, Debug, Clone)]
pub struct RunOpt {
    /// Skip the all-pairs reachability check
    #[arg(long)]
    pub skip_ping: bool,

    /// Print the reports but do not prompt for commands
    #[arg(long)]
    pub non_interactive: bool,
}

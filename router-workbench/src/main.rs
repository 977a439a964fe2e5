mod config;
mod session;
mod topo;

use crate::config::cli::{CliOpt, Command};
use crate::session::OperatorSession;
use clap::Parser;
use emu_topology::backend::InMemoryBackend;
use emu_topology::runner::Runner;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opt = CliOpt::parse();
    match run(opt) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(opt: CliOpt) -> anyhow::Result<ExitCode> {
    let (graph, plan) = match &opt.network_graph {
        Some(path) => config::network::load(path)?,
        None => topo::dual_router()?,
    };

    let mut runner = Runner::new(graph, plan, InMemoryBackend::new())
        .probe_timeout(Duration::from_millis(opt.probe_timeout_ms));

    match opt.command {
        Command::Run(run_opt) => {
            let mut session = OperatorSession::new(!run_opt.non_interactive);
            runner.run(!run_opt.skip_ping, Some(&mut session))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            let report = runner
                .run(true, None)?
                .expect("reachability sweep was requested");
            println!("{report}");

            if report.all_reachable() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

// src/main.rs

//! The main entry point for the Aegis availability-management daemon.

use std::path::PathBuf;
use std::process::ExitCode;

use aegis::config::Config;
use aegis::core::admin::{AdminAction, ObjectStore};
use aegis::server::Reactor;
use anyhow::{Result, anyhow};
use std::env;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("Aegis version {VERSION}");
        return ExitCode::SUCCESS;
    }

    // `aegis ctl <store> <action> ...` is the administrative mode; anything
    // else runs the daemon.
    if args.len() > 1 && args[1] == "ctl" {
        return run_ctl(&args[2..]);
    }

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    match run_daemon(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("aegis: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_daemon(args: &[String]) -> Result<()> {
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(idx) => args
            .get(idx + 1)
            .ok_or_else(|| anyhow!("--config requires a path"))?
            .clone(),
        None => "aegis.toml".to_string(),
    };

    let config = Config::from_file(&config_path)?;
    info!(
        "Starting Aegis {} as node '{}' (model '{}')",
        VERSION, config.node_name, config.model_file
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let (mut reactor, _handle) = Reactor::build(&config)?;
        reactor.bootstrap()?;
        reactor.run().await
    })
}

/// The flat DN-path administrative tool. Exit status is zero on success,
/// non-zero with a message on any failure.
fn run_ctl(args: &[String]) -> ExitCode {
    match ctl_inner(args) {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("aegis ctl: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn ctl_inner(args: &[String]) -> Result<Vec<String>> {
    let usage = "usage: aegis ctl <store.json> \
                 (read <path> | write <path> <value> | create <path> | \
                 create-key <path> <key> <value> | delete <path> | print-all | load <file>)";
    let store_path = args.first().ok_or_else(|| anyhow!(usage))?;
    let action = args.get(1).ok_or_else(|| anyhow!(usage))?;

    let arg = |idx: usize| -> Result<String> {
        args.get(idx)
            .cloned()
            .ok_or_else(|| anyhow!("missing argument: {usage}"))
    };

    let action = match action.as_str() {
        "read" => AdminAction::Read { path: arg(2)? },
        "write" => AdminAction::WriteKey {
            path: arg(2)?,
            value: arg(3)?,
        },
        "create" => AdminAction::CreateObject { path: arg(2)? },
        "create-key" => AdminAction::CreateObjectAndKey {
            path: arg(2)?,
            key: arg(3)?,
            value: arg(4)?,
        },
        "delete" => AdminAction::Delete { path: arg(2)? },
        "print-all" => AdminAction::PrintAll,
        "load" => AdminAction::BulkLoad {
            file: PathBuf::from(arg(2)?),
        },
        other => return Err(anyhow!("unknown action '{other}': {usage}")),
    };

    let mut store = ObjectStore::open(&PathBuf::from(store_path))?;
    Ok(store.execute(action)?)
}

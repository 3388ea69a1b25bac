// Copyright 2024-2026 model-ota Contributors
// SPDX-License-Identifier: Apache-2.0

//! model-ota entry point.
//!
//! ## CLI Subcommands
//!
//! - `model-ota` or `model-ota run` - Run the provisioning loop (default)
//! - `model-ota inspect <file>` - Parse a model file
//! - `model-ota selection` - Show the persisted selection
//! - `model-ota config show|defaults|validate` - Configuration tools

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use model_ota::cli::{self, config_cmd, has_flag};
use model_ota::config::{self as ota_config, EnvConfig};
use model_ota::ota::{LocalOtaClient, ManifestWatcher};
use model_ota::telemetry::init_logging;
use model_ota::{Runtime, StepOutcome, RESTART_EXIT_CODE};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match command {
        "run" | "" => {
            let code = run(ota_config::load()).await;
            ExitCode::from(code as u8)
        }
        "inspect" => match args.get(2).filter(|a| !a.starts_with("--")) {
            Some(path) => {
                let code = cli::run_inspect(Path::new(path), has_flag(&args, "--json"));
                ExitCode::from(code as u8)
            }
            None => {
                eprintln!("inspect requires a model file path");
                print_command_help("inspect");
                ExitCode::FAILURE
            }
        },
        "selection" => {
            let code = cli::run_selection(has_flag(&args, "--json"));
            ExitCode::from(code as u8)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    let code = config_cmd::run_show(has_flag(&args, "--json"));
                    ExitCode::from(code as u8)
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => {
                    let code = config_cmd::run_validate();
                    ExitCode::from(code as u8)
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("model-ota {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Run the provisioning loop until Ctrl+C or a restart request.
async fn run(env: EnvConfig) -> i32 {
    if let Err(e) = init_logging(&env.log) {
        eprintln!("Logging setup failed: {}", e);
        return 2;
    }

    let Some(source_dir) = env.source_dir.clone() else {
        error!("MODEL_OTA_SOURCE_DIR is not set, nothing to observe");
        return 2;
    };
    if let Err(e) = std::fs::create_dir_all(&env.worker.mount_point) {
        error!(path = %env.worker.mount_point.display(), error = %e, "Unable to create mount point");
        return 2;
    }

    let mut runtime = Runtime::new(env.runtime_config());
    runtime.bootstrap();

    let client = LocalOtaClient::new(source_dir, env.block_size);
    let cancel = CancellationToken::new();

    let watcher = ManifestWatcher::new(client.manifest_path(), env.poll_interval, runtime.listener().clone());
    let watcher_task = tokio::spawn(watcher.run(cancel.clone()));

    let loop_cancel = cancel.clone();
    let interval = env.poll_interval;
    let mut loop_task =
        tokio::task::spawn_blocking(move || main_loop(runtime, client, interval, loop_cancel));

    let joined = tokio::select! {
        res = &mut loop_task => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            cancel.cancel();
            loop_task.await
        }
    };

    cancel.cancel();
    let _ = watcher_task.await;

    match joined {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Main loop panicked");
            1
        }
    }
}

/// Blocking main loop: one [`Runtime::step`] per period.
fn main_loop(
    mut runtime: Runtime,
    client: LocalOtaClient,
    interval: Duration,
    cancel: CancellationToken,
) -> i32 {
    let handle = tokio::runtime::Handle::current();
    info!(period_ms = interval.as_millis() as u64, "Main loop started");

    while !cancel.is_cancelled() {
        let report = runtime.step(&client);
        if let StepOutcome::RestartRequired(selected) = report.outcome {
            info!(selected = %selected, exit_code = RESTART_EXIT_CODE, "Exiting for model swap");
            cancel.cancel();
            return RESTART_EXIT_CODE;
        }

        handle.block_on(async {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(interval) => {}
            }
        });
    }

    info!("Main loop stopped");
    0
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "model-ota - OTA model provisioning v{}

USAGE:
    model-ota [COMMAND] [OPTIONS]

COMMANDS:
    run          Run the provisioning loop (default when no command given)
    inspect      Parse a model file and show its labels
    selection    Show the persisted model selection
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    MODEL_OTA_SOURCE_DIR=/srv/release model-ota run
    model-ota inspect /sdcard/model_1.2 --json
    model-ota selection
    model-ota config validate

ENVIRONMENT:
    See `model-ota config defaults` for every MODEL_OTA_* variable.

EXIT CODES:
    0   Success
    1   Failure
    2   Configuration error
    75  Restart requested to activate a new model
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => eprintln!(
            "model-ota run - Run the provisioning loop

USAGE:
    model-ota run

DESCRIPTION:
    Loads the persisted model selection, observes the manifest in
    MODEL_OTA_SOURCE_DIR and downloads accepted packages into
    MODEL_OTA_MOUNT_POINT once per MODEL_OTA_POLL_INTERVAL_MS.

    When a new model is selected while another is loaded the process
    exits with code 75 so its supervisor restarts it on the new model.
    Set MODEL_OTA_RESTART_ON_SWAP=false to swap in place instead.
"
        ),
        "inspect" => eprintln!(
            "model-ota inspect - Parse a model file

USAGE:
    model-ota inspect <FILE> [--json]

EXIT CODES:
    0  Valid model file
    1  Invalid model file
    2  File not found
"
        ),
        "selection" => eprintln!(
            "model-ota selection - Show the persisted model selection

USAGE:
    model-ota selection [--json]
"
        ),
        "config" => eprintln!(
            "model-ota config - Inspect configuration

USAGE:
    model-ota config show [--json]
    model-ota config defaults
    model-ota config validate
"
        ),
        _ => {
            eprintln!("No help available for '{}'", command);
            print_usage();
        }
    }
}

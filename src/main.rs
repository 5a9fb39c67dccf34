// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::time::Instant;

use anyhow::Context;
use the_pipewood::config::{load_and_validate_description, TransformRegistry};
use the_pipewood::engine::{Pipeline, PipelineStatus};
use tracing_subscriber::EnvFilter;

const JSON_FLAG: &str = "--json";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let json = args.iter().any(|a| a == JSON_FLAG);
    let description_files: Vec<&String> = args.iter().skip(1).filter(|a| *a != JSON_FLAG).collect();

    if description_files.is_empty() {
        eprintln!("Usage: {} [--json] <pipeline.yaml> [pipeline2.yaml ...]", args[0]);
        eprintln!("Example: {} configs/demo-pipeline.yaml", args[0]);
        eprintln!("Example: {} --json configs/reject-demo.yaml", args[0]);
        std::process::exit(2);
    }

    let registry = TransformRegistry::with_builtins();
    let mut failed = false;

    for file in description_files {
        match run_description(file, &registry).await {
            Ok(status) => {
                if json {
                    match serde_json::to_string_pretty(&status) {
                        Ok(text) => println!("{}", text),
                        Err(e) => eprintln!("Failed to render status of {}: {}", file, e),
                    }
                } else {
                    print_status(&status);
                }
                failed |= status.aborted;
            }
            Err(e) => {
                eprintln!("Failed to execute {}: {:#}", file, e);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}

/// Load, build and run one description. Ctrl-C stops the run.
async fn run_description(file: &str, registry: &TransformRegistry) -> anyhow::Result<PipelineStatus> {
    let description = load_and_validate_description(file)
        .with_context(|| format!("loading pipeline description {}", file))?;
    let mut pipeline = Pipeline::build(&description, registry)
        .with_context(|| format!("building pipeline '{}'", description.name))?;

    let stop = pipeline.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    let started = Instant::now();
    let result = pipeline.execute().await;
    ctrl_c.abort();

    let status = match result {
        Ok(status) => status,
        // Stage initialisation failures still produce an aborted status.
        Err(e) if e.is_configuration() => {
            tracing::error!(pipeline = %description.name, error = %e, "pipeline did not start");
            pipeline.status()
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(
        pipeline = %description.name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "run complete"
    );
    Ok(status)
}

fn print_status(status: &PipelineStatus) {
    println!("Pipeline: {}", status.pipeline);
    println!(
        "Result:   {}",
        if status.aborted { "aborted" } else { "finished" }
    );
    println!(
        "Rows:     in={} out={} errors={}",
        status.rows_in, status.rows_out, status.errors
    );
    println!();
    println!(
        "{:<24} {:>4} {:>10} {:>10} {:>10} {:>10}  {}",
        "stage", "copy", "read", "written", "rejected", "errors", "state"
    );
    println!("{}", "─".repeat(84));
    for stage in &status.stages {
        println!(
            "{:<24} {:>4} {:>10} {:>10} {:>10} {:>10}  {:?}",
            stage.stage, stage.copy, stage.read, stage.written, stage.rejected, stage.errors, stage.state
        );
    }
}

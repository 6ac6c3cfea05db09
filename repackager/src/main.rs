//! Perseus repackager CLI entrypoint.
//!
//! Runs the full pipeline from the current directory and exits non-zero on
//! the first fatal stage, after echoing any captured tool output.

use clap::Parser;
use env_logger::Env;
use log::info;
use perseus_repackager::cli::Cli;
use perseus_repackager::config::{PipelineConfig, Settings};
use perseus_repackager::error::Result;
use perseus_repackager::exec::SystemCommandExecutor;
use perseus_repackager::layout::{Layout, current_dir};
use perseus_repackager::pipeline::{Pipeline, PipelineOutcome};
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut stderr = std::io::stderr();
    let exit_code = exit_code_for_run_result(run(&cli), &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli) -> Result<PipelineOutcome> {
    let root = current_dir()?;
    let settings = Settings::load(&root)?;
    let layout = Layout::new(&root, &settings);
    let config = PipelineConfig::new(cli.policy(), settings);

    let outcome = Pipeline::new(&SystemCommandExecutor, &layout, &config).run()?;
    info!("built apk in {}", outcome.artifact.path);
    if let Some(bundle) = &outcome.bundle {
        info!("libraries bundled in {bundle}");
    }
    info!("done in {:.2} seconds", outcome.elapsed.as_secs_f64());
    Ok(outcome)
}

fn exit_code_for_run_result<T>(result: Result<T>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => {
            write_stderr_line(stderr, &err);
            if let Some(diagnostics) = err.diagnostics() {
                write_stderr_line(stderr, diagnostics);
            }
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

//! Command execution coordinating the two step phases.
//!
//! The `run` phase drives the whole pipeline in order: credential import,
//! project resolution, archive, export, validation and optional upload.
//! The `post` phase runs in a separate process invocation and tears down
//! whatever the `run` phase recorded in the session state file.

use std::path::Path;
use std::time::Duration;

use crate::appstore::{AppStoreConnectClient, PollPolicy};
use crate::cli::{Args, Command, OutputManager, PostArgs, RunArgs};
use crate::credentials::{self, AppleCredential};
use crate::error::{BuilderError, CliError, Result, StateError};
use crate::project::ResolvedProject;
use crate::state::{SessionState, StateManager};
use crate::upload;
use crate::xcode::{self, ExportedProject};

/// Execute the parsed command.
pub async fn execute_command(args: Args) -> Result<i32> {
    args.validate()
        .map_err(|reason| BuilderError::Cli(CliError::InvalidArguments { reason }))?;

    let output = OutputManager::new(args.quiet);
    match args.command {
        Command::Run(run_args) => run_phase(*run_args, args.verbose, &output).await,
        Command::Post(post_args) => post_phase(post_args, &output).await,
    }
}

async fn run_phase(args: RunArgs, verbose: bool, output: &OutputManager) -> Result<i32> {
    if let Some(version) = &args.xcode_version {
        let _ = output.progress(&format!("Selecting Xcode {version}"));
        xcode::select_xcode(version).await?;
    }
    let xcode_version = xcode::probe_xcode_version().await?;
    let _ = output.info(&format!("Using Xcode {xcode_version}"));

    let _ = output.section("Importing credentials");
    let state_manager = StateManager::for_runner_temp();
    let mut state = SessionState::new();
    let credential = AppleCredential::import(&args, &mut state).await?;
    // Persist immediately so the post phase can still clean up after a
    // failure in any later stage.
    state_manager.save_state(&state)?;

    let _ = output.section("Resolving project");
    let project = ResolvedProject::resolve(&args).await?;
    let _ = output.info(&format!(
        "{} [{}] scheme '{}'",
        project.bundle_id,
        project.platform.display_name(),
        project.scheme
    ));
    xcode::ensure_sdk(project.platform).await?;

    let _ = output.section("Archiving");
    let archived = xcode::archive(&project, &credential, &args, &xcode_version, verbose).await?;
    let _ = output.success(&format!("Archived {}", archived.archive_path.display()));

    let _ = output.section("Exporting");
    let mut exported = xcode::export(archived, &credential, verbose).await?;
    if args.notarize {
        xcode::package_installer(&mut exported).await?;
    }
    let _ = output.success(&format!("Exported {}", exported.artifact_path.display()));

    let _ = output.section("Validating");
    upload::validate_app(&exported, &credential).await?;
    let _ = output.success("Validation passed");

    if args.upload {
        let _ = output.section("Uploading");
        let client = AppStoreConnectClient::new(credential.token_provider()?);
        match client.latest_build_number(&exported.project.bundle_id).await {
            Ok(latest) => {
                let _ = output.info(&format!("Latest uploaded build number: {latest}"));
            }
            Err(e) => log::debug!("latest build number unavailable: {e}"),
        }
        upload::upload_app(&exported, &credential, &client).await?;
        let _ = output.success("Upload accepted");

        if let Some(whats_new) = &args.whats_new {
            match &exported.project.build_number {
                Some(build_number) => {
                    let policy = PollPolicy {
                        attempts: args.poll_attempts,
                        interval: Duration::from_secs(args.poll_interval),
                    };
                    crate::appstore::update_test_details(
                        &client,
                        &exported.project,
                        build_number,
                        whats_new,
                        &policy,
                    )
                    .await?;
                    let _ = output.success("Release notes updated");
                }
                None => {
                    let _ = output.warn("Build number unknown, skipping release notes");
                }
            }
        }
    }

    write_step_outputs(&exported)?;
    Ok(0)
}

async fn post_phase(args: PostArgs, output: &OutputManager) -> Result<i32> {
    let state_manager = StateManager::for_runner_temp();
    if !state_manager.state_exists() {
        let _ = output.info("No session state found, nothing to clean up");
        return Ok(0);
    }

    // Persisted state is untrusted input; a corrupt file must not fail
    // the post phase, only forfeit the cleanup it would have driven.
    let state = match state_manager.load_state() {
        Ok(state) => state,
        Err(BuilderError::State(StateError::Corrupted { reason })) => {
            let _ = output.warn(&format!("Session state unreadable, skipping cleanup: {reason}"));
            state_manager.cleanup_state()?;
            return Ok(0);
        }
        Err(e) => return Err(e),
    };
    credentials::cleanup(&state, args.cleanup_log_level).await?;
    state_manager.cleanup_state()?;
    let _ = output.success("Credentials cleaned up");
    Ok(0)
}

/// Publish the artifact paths as step outputs for downstream steps.
fn write_step_outputs(exported: &ExportedProject) -> Result<()> {
    use std::io::Write;

    let Some(output_file) = std::env::var_os("GITHUB_OUTPUT") else {
        log::info!("executable={}", exported.artifact_path.display());
        log::info!("output-directory={}", exported.export_dir.display());
        return Ok(());
    };
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(Path::new(&output_file))?;
    writeln!(file, "executable={}", exported.artifact_path.display())?;
    writeln!(file, "output-directory={}", exported.export_dir.display())?;
    Ok(())
}

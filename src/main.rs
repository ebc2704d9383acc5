//! Xcode Builder - CI step for archiving, signing and uploading Xcode apps.
//!
//! The binary wires the CLI to the pipeline and maps fatal errors to a
//! non-zero exit code with recovery suggestions.

use std::process;
use xcode_builder::cli;
use xcode_builder::cli::OutputManager;

#[tokio::main]
async fn main() {
    env_logger::init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            // Never quiet for fatal errors
            let output = OutputManager::new(false);
            output.error(&format!("Fatal error: {e}"));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                let _ = output.println("\nRecovery suggestions:");
                for suggestion in suggestions {
                    let _ = output.indent(&suggestion);
                }
            }

            process::exit(1);
        }
    }
}

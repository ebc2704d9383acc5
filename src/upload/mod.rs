//! Pre-flight validation and upload through the platform uploader.
//!
//! Both operations run `xcrun altool` with JSON output and API-key auth.
//! altool reports failures as a `product-errors` array in its JSON body,
//! which is surfaced verbatim in the error.

use serde::Deserialize;
use tokio::process::Command;

use crate::appstore::AppStoreConnectClient;
use crate::credentials::AppleCredential;
use crate::error::{BuilderError, Result, UploadError};
use crate::xcode::ExportedProject;

const XCRUN: &str = "/usr/bin/xcrun";

/// altool's JSON response body
#[derive(Debug, Deserialize)]
struct AltoolResponse {
    #[serde(rename = "product-errors", default)]
    product_errors: Vec<AltoolProductError>,
    #[serde(rename = "success-message", default)]
    success_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AltoolProductError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

/// Validate the exported artifact against App Store Connect.
pub async fn validate_app(
    exported: &ExportedProject,
    credential: &AppleCredential,
) -> Result<()> {
    let altool_type = altool_type(exported)?;
    log::info!("validating {}", exported.artifact_path.display());

    let output = Command::new(XCRUN)
        .arg("altool")
        .arg("--validate-app")
        .arg("--file")
        .arg(&exported.artifact_path)
        .args(["--type", altool_type])
        .args(["--apiKey", &credential.key_id])
        .args(["--apiIssuer", &credential.issuer_id])
        .arg("--verbose")
        .args(["--output-format", "json"])
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        return Err(BuilderError::Upload(UploadError::ValidationFailed {
            diagnostics: diagnostics_from(&stdout, &String::from_utf8_lossy(&output.stderr)),
        }));
    }
    log_success(&stdout);
    Ok(())
}

/// Upload the artifact, identified by its full app-record metadata.
pub async fn upload_app(
    exported: &ExportedProject,
    credential: &AppleCredential,
    client: &AppStoreConnectClient,
) -> Result<()> {
    let altool_type = altool_type(exported)?;
    let app_id = client
        .app_id_for_bundle(&exported.project.bundle_id)
        .await?;
    log::info!(
        "uploading {} as app {app_id}",
        exported.artifact_path.display()
    );

    let mut command = Command::new(XCRUN);
    command
        .arg("altool")
        .arg("--upload-package")
        .arg(&exported.artifact_path)
        .args(["--type", altool_type])
        .args(["--apple-id", &app_id])
        .args(["--bundle-id", &exported.project.bundle_id]);
    if let Some(version) = &exported.project.marketing_version {
        command.args(["--bundle-short-version-string", version]);
    }
    if let Some(build_number) = &exported.project.build_number {
        command.args(["--bundle-version", build_number]);
    }
    if let Some(team_id) = &credential.team_id {
        command.args(["--team-id", team_id]);
    }
    command
        .args(["--apiKey", &credential.key_id])
        .args(["--apiIssuer", &credential.issuer_id])
        .arg("--verbose")
        .args(["--output-format", "json"]);

    let output = command.output().await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        return Err(BuilderError::Upload(UploadError::UploadFailed {
            diagnostics: diagnostics_from(&stdout, &String::from_utf8_lossy(&output.stderr)),
        }));
    }
    log_success(&stdout);
    Ok(())
}

fn altool_type(exported: &ExportedProject) -> Result<&'static str> {
    exported.project.platform.altool_type().ok_or_else(|| {
        BuilderError::Anyhow(anyhow::anyhow!(
            "{} apps are distributed inside their host app and cannot be uploaded directly",
            exported.project.platform.display_name()
        ))
    })
}

/// Pull the product-errors payload out of altool's JSON, falling back to
/// the raw streams when the body is not parseable.
fn diagnostics_from(stdout: &str, stderr: &str) -> String {
    if let Ok(response) = serde_json::from_str::<AltoolResponse>(stdout)
        && !response.product_errors.is_empty()
    {
        return response
            .product_errors
            .iter()
            .map(|error| match error.code {
                Some(code) => format!(
                    "[{code}] {}",
                    error.message.as_deref().unwrap_or("unknown error")
                ),
                None => error.message.as_deref().unwrap_or("unknown error").to_string(),
            })
            .collect::<Vec<_>>()
            .join("; ");
    }
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    stdout.trim().to_string()
}

fn log_success(stdout: &str) {
    if let Ok(response) = serde_json::from_str::<AltoolResponse>(stdout)
        && let Some(message) = response.success_message
    {
        log::info!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_errors_are_flattened() {
        let stdout = r#"{
          "tool-version": "4.050.1210",
          "product-errors": [
            {
              "message": "Unable to authenticate.",
              "code": -19209
            },
            {
              "message": "Invalid provisioning profile."
            }
          ]
        }"#;
        let diagnostics = diagnostics_from(stdout, "");
        assert_eq!(
            diagnostics,
            "[-19209] Unable to authenticate.; Invalid provisioning profile."
        );
    }

    #[test]
    fn unparseable_output_falls_back_to_stderr() {
        let diagnostics = diagnostics_from("garbage", "  tool crashed\n");
        assert_eq!(diagnostics, "tool crashed");
    }

    #[test]
    fn empty_stderr_falls_back_to_stdout() {
        let diagnostics = diagnostics_from("plain failure text", "");
        assert_eq!(diagnostics, "plain failure text");
    }

    #[test]
    fn success_message_parses() {
        let stdout = r#"{"success-message": "No errors validating archive."}"#;
        let response: AltoolResponse = serde_json::from_str(stdout).expect("parse");
        assert!(response.product_errors.is_empty());
        assert_eq!(
            response.success_message.as_deref(),
            Some("No errors validating archive.")
        );
    }
}

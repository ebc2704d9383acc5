//! Archive and export stages of the build pipeline.
//!
//! Each stage consumes the previous stage's output type, so an export can
//! only ever run against a finished archive and validation only against a
//! finished export.

pub mod export_options;

pub use export_options::{ExportIntent, SigningStyle, export_method};

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::cli::RunArgs;
use crate::credentials::AppleCredential;
use crate::error::{BuildError, BuilderError, ProjectError, Result};
use crate::project::{Platform, ResolvedProject, probe};

const XCODEBUILD: &str = "/usr/bin/xcodebuild";
const XCODE_SELECT: &str = "/usr/bin/xcode-select";
const PRODUCTBUILD: &str = "/usr/bin/productbuild";
const XCBEAUTIFY: &str = "xcbeautify";

/// A project with a completed `.xcarchive`
#[derive(Debug)]
pub struct ArchivedProject {
    /// Resolved descriptor the archive was built from
    pub project: ResolvedProject,
    /// Path to the `.xcarchive` bundle
    pub archive_path: PathBuf,
    /// Export options plist consumed by the export stage
    pub export_options_path: PathBuf,
    /// Export method recorded in the options plist
    pub export_method: String,
}

/// An archive exported to a distributable artifact
#[derive(Debug)]
pub struct ExportedProject {
    /// Resolved descriptor the artifact was built from
    pub project: ResolvedProject,
    /// Path to the `.xcarchive` bundle
    pub archive_path: PathBuf,
    /// Export method recorded in the options plist
    pub export_method: String,
    /// Directory the archive was exported into
    pub export_dir: PathBuf,
    /// The `.ipa`, `.app` or `.pkg` produced by the export
    pub artifact_path: PathBuf,
}

/// Active Xcode release, from `xcodebuild -version`.
pub async fn probe_xcode_version() -> Result<semver::Version> {
    let output = Command::new(XCODEBUILD).arg("-version").output().await?;
    if !output.status.success() {
        return Err(BuilderError::Project(ProjectError::InspectionFailed {
            subcommand: "-version".to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    probe::parse_xcode_version(&text).ok_or_else(|| {
        BuilderError::Anyhow(anyhow::anyhow!(
            "unable to parse Xcode version from: {}",
            text.trim()
        ))
    })
}

/// Switch the active developer directory to the requested Xcode release.
///
/// CI runner images install side-by-side releases as
/// `/Applications/Xcode_<version>.app`.
pub async fn select_xcode(version: &str) -> Result<()> {
    let app_path = PathBuf::from(format!("/Applications/Xcode_{version}.app"));
    if !app_path.exists() {
        return Err(BuilderError::Anyhow(anyhow::anyhow!(
            "Xcode {} not installed at {}",
            version,
            app_path.display()
        )));
    }
    let status = Command::new("sudo")
        .arg(XCODE_SELECT)
        .arg("--switch")
        .arg(app_path.join("Contents/Developer"))
        .status()
        .await?;
    if !status.success() {
        return Err(BuilderError::Anyhow(anyhow::anyhow!(
            "xcode-select --switch exited with {}",
            status
        )));
    }
    Ok(())
}

/// Make sure the target platform SDK is installed, downloading it if the
/// selected Xcode supports on-demand platforms.
pub async fn ensure_sdk(platform: Platform) -> Result<()> {
    let output = Command::new(XCODEBUILD)
        .args(["-showsdks", "-json"])
        .output()
        .await?;
    if output.status.success() {
        let json = String::from_utf8_lossy(&output.stdout);
        if probe::sdk_installed(&json, platform.sdk_name()) {
            return Ok(());
        }
    }

    let Some(download_name) = platform.download_name() else {
        return Err(BuilderError::Build(BuildError::SdkBootstrapFailed {
            platform: platform.display_name().to_string(),
            reason: "SDK not installed and not downloadable on demand".to_string(),
        }));
    };

    log::info!("downloading the {} platform", platform.display_name());
    let status = Command::new(XCODEBUILD)
        .arg("-downloadPlatform")
        .arg(download_name)
        .status()
        .await?;
    if !status.success() {
        return Err(BuilderError::Build(BuildError::SdkBootstrapFailed {
            platform: platform.display_name().to_string(),
            reason: format!("xcodebuild -downloadPlatform exited with {status}"),
        }));
    }

    let status = Command::new(XCODEBUILD)
        .arg("-runFirstLaunch")
        .status()
        .await?;
    if !status.success() {
        return Err(BuilderError::Build(BuildError::SdkBootstrapFailed {
            platform: platform.display_name().to_string(),
            reason: format!("xcodebuild -runFirstLaunch exited with {status}"),
        }));
    }
    Ok(())
}

/// Archive the resolved project into an `.xcarchive`.
pub async fn archive(
    project: &ResolvedProject,
    credential: &AppleCredential,
    args: &RunArgs,
    xcode_version: &semver::Version,
    verbose: bool,
) -> Result<ArchivedProject> {
    let project_dir = project_directory(&project.project_path);
    let project_name = project_name(&project.project_path);
    let archive_path = project_dir.join(format!("{project_name}.xcarchive"));

    let signing_style = if credential.signing_identity.is_some() {
        SigningStyle::Manual
    } else {
        SigningStyle::Automatic
    };

    let export_options_path = match &args.export_option_plist {
        Some(path) => path.clone(),
        None => {
            let path = project.project_path.join("exportOptions.plist");
            export_options::write_export_options(
                &path,
                args.export_option,
                project.platform,
                xcode_version,
                credential.team_id.as_deref(),
                signing_style,
            )?;
            path
        }
    };
    // Read the method back so a pre-authored plist also drives the
    // hardened-runtime and packaging decisions.
    let export_method = read_export_method(&export_options_path)?;

    let entitlements_path = match &args.entitlements_plist {
        Some(path) => Some(path.clone()),
        None if project.platform == Platform::MacOs => {
            let path = project.project_path.join("Entitlements.plist");
            if !path.exists() {
                log::warn!("no entitlements plist found, writing defaults");
            }
            export_options::write_default_entitlements(&path, args.export_option)?;
            Some(path)
        }
        None => None,
    };

    let destination = project
        .destination
        .clone()
        .unwrap_or_else(|| format!("generic/platform={}", project.platform.display_name()));

    let mut build_args: Vec<String> = vec![
        "archive".into(),
        "-project".into(),
        project.project_path.display().to_string(),
        "-scheme".into(),
        project.scheme.clone(),
        "-destination".into(),
        destination,
        "-configuration".into(),
        project.configuration.clone(),
        "-archivePath".into(),
        archive_path.display().to_string(),
    ];
    build_args.extend(authentication_args(credential));

    if let Some(team_id) = &credential.team_id {
        build_args.push(format!("DEVELOPMENT_TEAM={team_id}"));
    }
    match (&credential.signing_identity, &credential.keychain_path) {
        (Some(identity), Some(keychain)) => {
            build_args.push(format!("CODE_SIGN_IDENTITY={identity}"));
            build_args.push(format!(
                "OTHER_CODE_SIGN_FLAGS=--keychain {}",
                keychain.display()
            ));
        }
        _ => build_args.push("CODE_SIGN_IDENTITY=-".into()),
    }
    let manual = credential.provisioning_profile_uuid.is_some()
        || credential.signing_identity.is_some();
    build_args.push(format!(
        "CODE_SIGN_STYLE={}",
        if manual { "Manual" } else { "Automatic" }
    ));
    match &credential.provisioning_profile_uuid {
        Some(uuid) => build_args.push(format!("PROVISIONING_PROFILE={uuid}")),
        None => {
            build_args.push("AD_HOC_CODE_SIGNING_ALLOWED=YES".into());
            build_args.push("-allowProvisioningUpdates".into());
        }
    }
    if let Some(entitlements) = &entitlements_path {
        build_args.push(format!("CODE_SIGN_ENTITLEMENTS={}", entitlements.display()));
    }
    if project.platform == Platform::Ios {
        // Stripping during the copy phase breaks Unity's IL2CPP symbols
        build_args.push("COPY_PHASE_STRIP=NO".into());
    }
    if project.platform == Platform::MacOs && !is_app_store_method(&export_method) {
        build_args.push("ENABLE_HARDENED_RUNTIME=YES".into());
    }
    if !verbose {
        build_args.push("-quiet".into());
    }

    exec_with_log_filter(&build_args).await?;

    Ok(ArchivedProject {
        project: project.clone(),
        archive_path,
        export_options_path,
        export_method,
    })
}

/// Export the archive into a distributable artifact.
pub async fn export(
    archived: ArchivedProject,
    credential: &AppleCredential,
    verbose: bool,
) -> Result<ExportedProject> {
    let project_dir = project_directory(&archived.project.project_path);
    let project_name = project_name(&archived.project.project_path);
    let export_dir = project_dir.join(&project_name);

    let mut export_args: Vec<String> = vec![
        "-exportArchive".into(),
        "-archivePath".into(),
        archived.archive_path.display().to_string(),
        "-exportPath".into(),
        export_dir.display().to_string(),
        "-exportOptionsPlist".into(),
        archived.export_options_path.display().to_string(),
        "-allowProvisioningUpdates".into(),
    ];
    export_args.extend(authentication_args(credential));
    if !verbose {
        export_args.push("-quiet".into());
    }

    exec_with_log_filter(&export_args).await?;

    let artifact_path = find_artifact(&export_dir)?;
    log::info!("exported {}", artifact_path.display());

    Ok(ExportedProject {
        project: archived.project,
        archive_path: archived.archive_path,
        export_method: archived.export_method,
        export_dir,
        artifact_path,
    })
}

/// Wrap a macOS `.app` into an installer pkg so it can be notarized and
/// uploaded. App Store exports already come out as a pkg.
pub async fn package_installer(exported: &mut ExportedProject) -> Result<()> {
    if exported.project.platform != Platform::MacOs
        || is_app_store_method(&exported.export_method)
        || exported
            .artifact_path
            .extension()
            .is_none_or(|ext| ext != "app")
    {
        return Ok(());
    }

    let pkg_path = exported.artifact_path.with_extension("pkg");
    log::info!("packaging installer {}", pkg_path.display());
    let output = Command::new(PRODUCTBUILD)
        .arg("--component")
        .arg(&exported.artifact_path)
        .arg("/Applications")
        .arg(&pkg_path)
        .output()
        .await?;
    if !output.status.success() {
        return Err(BuilderError::Build(BuildError::PackagingFailed {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }));
    }
    exported.artifact_path = pkg_path;
    Ok(())
}

fn authentication_args(credential: &AppleCredential) -> Vec<String> {
    vec![
        "-authenticationKeyID".into(),
        credential.key_id.clone(),
        "-authenticationKeyPath".into(),
        credential.key_path.display().to_string(),
        "-authenticationKeyIssuerID".into(),
        credential.issuer_id.clone(),
    ]
}

fn is_app_store_method(method: &str) -> bool {
    method == "app-store" || method == "app-store-connect"
}

fn project_directory(project_path: &Path) -> PathBuf {
    project_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn project_name(project_path: &Path) -> String {
    project_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_export_method(path: &Path) -> Result<String> {
    let value = plist::Value::from_file(path)?;
    Ok(value
        .as_dictionary()
        .and_then(|dict| dict.get("method"))
        .and_then(plist::Value::as_string)
        .unwrap_or("development")
        .to_string())
}

/// First `.ipa`, `.app` or `.pkg` under the export directory.
fn find_artifact(export_dir: &Path) -> Result<PathBuf> {
    for extension in ["ipa", "app", "pkg"] {
        let pattern = export_dir.join("**").join(format!("*.{extension}"));
        if let Ok(paths) = glob::glob(&pattern.to_string_lossy())
            && let Some(path) = paths.filter_map(std::result::Result::ok).next()
        {
            return Ok(path);
        }
    }
    Err(BuilderError::Build(BuildError::NoArtifact {
        path: export_dir.to_path_buf(),
    }))
}

/// Run xcodebuild with its output streamed through the log filter.
///
/// The filter is fed concurrently while xcodebuild runs so a full pipe
/// buffer can never deadlock the build, and both exit statuses are checked
/// once the stream ends.
async fn exec_with_log_filter(build_args: &[String]) -> Result<()> {
    ensure_log_filter().await?;

    let mut filter = Command::new(XCBEAUTIFY)
        .args(["--quiet", "--is-ci", "--disable-logging"])
        .stdin(Stdio::piped())
        .spawn()?;
    let mut filter_stdin = filter
        .stdin
        .take()
        .ok_or_else(|| anyhow::anyhow!("log filter stdin unavailable"))?;

    log::info!("xcodebuild {}", build_args.join(" "));
    let mut child = Command::new(XCODEBUILD)
        .args(build_args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("xcodebuild stdout unavailable"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("xcodebuild stderr unavailable"))?;

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
    let stdout_pump = tokio::spawn(pump(stdout, tx.clone()));
    let stderr_pump = tokio::spawn(pump(stderr, tx));
    let writer = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if filter_stdin.write_all(&chunk).await.is_err() {
                break;
            }
        }
        let _ = filter_stdin.shutdown().await;
    });

    let status = child.wait().await?;
    let _ = stdout_pump.await;
    let _ = stderr_pump.await;
    let _ = writer.await;

    let filter_status = filter.wait().await?;
    if !filter_status.success() {
        return Err(BuilderError::Build(BuildError::LogFilterFailed {
            code: filter_status.code().unwrap_or(-1),
        }));
    }
    if !status.success() {
        return Err(BuilderError::Build(BuildError::XcodebuildFailed {
            code: status.code().unwrap_or(-1),
        }));
    }
    Ok(())
}

async fn pump(mut reader: impl AsyncRead + Unpin, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn ensure_log_filter() -> Result<()> {
    if which::which(XCBEAUTIFY).is_ok() {
        return Ok(());
    }
    log::debug!("installing {XCBEAUTIFY}");
    let status = Command::new("brew")
        .args(["install", XCBEAUTIFY])
        .status()
        .await?;
    if !status.success() {
        return Err(BuilderError::Anyhow(anyhow::anyhow!(
            "brew install {} exited with {}",
            XCBEAUTIFY,
            status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_store_methods_cover_both_namings() {
        assert!(is_app_store_method("app-store"));
        assert!(is_app_store_method("app-store-connect"));
        assert!(!is_app_store_method("developer-id"));
        assert!(!is_app_store_method("debugging"));
    }

    #[test]
    fn project_naming_from_bundle_path() {
        let path = Path::new("/work/game/Unity-iPhone.xcodeproj");
        assert_eq!(project_name(path), "Unity-iPhone");
        assert_eq!(project_directory(path), PathBuf::from("/work/game"));
    }

    #[test]
    fn artifact_search_prefers_ipa_and_errors_when_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = find_artifact(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            BuilderError::Build(BuildError::NoArtifact { .. })
        ));

        std::fs::create_dir(dir.path().join("Game.app")).expect("mkdir");
        std::fs::write(dir.path().join("Game.ipa"), b"zip").expect("write");
        let found = find_artifact(dir.path()).expect("artifact");
        assert_eq!(found.extension().and_then(|e| e.to_str()), Some("ipa"));
    }

    #[test]
    fn export_method_read_back_from_plist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("exportOptions.plist");
        let mut dict = plist::Dictionary::new();
        dict.insert(
            "method".to_string(),
            plist::Value::String("app-store-connect".to_string()),
        );
        plist::Value::Dictionary(dict)
            .to_file_xml(&path)
            .expect("write");
        assert_eq!(read_export_method(&path).expect("read"), "app-store-connect");
    }
}

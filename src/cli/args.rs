//! Command line argument parsing and validation.
//!
//! Inputs mirror the CI step configuration: every option can also be
//! supplied through an `INPUT_*` environment variable, the convention CI
//! runners use to hand step inputs and secrets to a process.

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::project::Platform;
use crate::xcode::ExportIntent;

/// CI step for building, signing and uploading Xcode app bundles
#[derive(Parser, Debug)]
#[command(
    name = "xcode_builder",
    version,
    about = "Archive, export, validate and upload Xcode app bundles",
    long_about = "Build pipeline for Apple platform apps in CI.

Usage:
  xcode_builder run --export-option app-store --upload true
  xcode_builder post"
)]
pub struct Args {
    /// Phase to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Step lifecycle phase
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Main phase: import credentials, build, export, validate, upload
    Run(Box<RunArgs>),
    /// Post phase: tear down the keychain and key material from a prior run
    Post(PostArgs),
}

/// Inputs for the main phase
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Glob matched against the workspace to locate the .xcodeproj
    #[arg(long, env = "INPUT_PROJECT_PATH")]
    pub project_path: Option<String>,

    /// Scheme to build (discovered from the project when omitted)
    #[arg(long, env = "INPUT_SCHEME")]
    pub scheme: Option<String>,

    /// Target platform (probed from build settings when omitted)
    #[arg(long, env = "INPUT_PLATFORM", value_enum)]
    pub platform: Option<Platform>,

    /// Build configuration
    #[arg(long, env = "INPUT_CONFIGURATION", default_value = "Release")]
    pub configuration: String,

    /// xcodebuild destination (defaults to generic/platform=<platform>)
    #[arg(long, env = "INPUT_DESTINATION")]
    pub destination: Option<String>,

    /// Bundle identifier (read from the project file when omitted)
    #[arg(long, env = "INPUT_BUNDLE_ID")]
    pub bundle_id: Option<String>,

    /// Path to an entitlements plist (macOS gets a generated default)
    #[arg(long, env = "INPUT_ENTITLEMENTS_PLIST")]
    pub entitlements_plist: Option<PathBuf>,

    /// Distribution intent for the export
    #[arg(
        long,
        env = "INPUT_EXPORT_OPTION",
        value_enum,
        default_value_t = ExportIntent::Development
    )]
    pub export_option: ExportIntent,

    /// Pre-authored export options plist overriding the computed one
    #[arg(long, env = "INPUT_EXPORT_OPTION_PLIST")]
    pub export_option_plist: Option<PathBuf>,

    /// Apple Developer team id (derived from the signing identity when omitted)
    #[arg(long, env = "INPUT_TEAM_ID")]
    pub team_id: Option<String>,

    /// Code-signing identity (discovered from the keychain when omitted)
    #[arg(long, env = "INPUT_SIGNING_IDENTITY")]
    pub signing_identity: Option<String>,

    /// Base64-encoded .p12 signing certificate
    #[arg(long, env = "INPUT_CERTIFICATE", hide_env_values = true)]
    pub certificate: Option<String>,

    /// Password for the .p12 certificate
    #[arg(long, env = "INPUT_CERTIFICATE_PASSWORD", hide_env_values = true)]
    pub certificate_password: Option<String>,

    /// Base64-encoded provisioning profile
    #[arg(long, env = "INPUT_PROVISIONING_PROFILE", hide_env_values = true)]
    pub provisioning_profile: Option<String>,

    /// Filename for the provisioning profile (.mobileprovision/.provisionprofile)
    #[arg(long, env = "INPUT_PROVISIONING_PROFILE_NAME")]
    pub provisioning_profile_name: Option<String>,

    /// App Store Connect API key id
    #[arg(long, env = "INPUT_APP_STORE_CONNECT_KEY_ID")]
    pub app_store_connect_key_id: String,

    /// App Store Connect API issuer id
    #[arg(long, env = "INPUT_APP_STORE_CONNECT_ISSUER_ID")]
    pub app_store_connect_issuer_id: String,

    /// Base64-encoded App Store Connect .p8 private key
    #[arg(long, env = "INPUT_APP_STORE_CONNECT_KEY", hide_env_values = true)]
    pub app_store_connect_key: Option<String>,

    /// Path to an existing App Store Connect .p8 private key
    #[arg(long, env = "INPUT_APP_STORE_CONNECT_KEY_PATH")]
    pub app_store_connect_key_path: Option<PathBuf>,

    /// Wrap macOS non-app-store exports into an installer pkg for notarization
    #[arg(
        long,
        env = "INPUT_NOTARIZE",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value = "true"
    )]
    pub notarize: bool,

    /// Upload the validated build to App Store Connect
    #[arg(
        long,
        env = "INPUT_UPLOAD",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value = "false"
    )]
    pub upload: bool,

    /// Release notes attached to the TestFlight build after upload
    #[arg(long, env = "INPUT_WHATS_NEW")]
    pub whats_new: Option<String>,

    /// Xcode version to select before building (e.g. 15.4)
    #[arg(long, env = "INPUT_XCODE_VERSION")]
    pub xcode_version: Option<String>,

    /// Maximum TestFlight processing poll attempts
    #[arg(long, env = "INPUT_POLL_ATTEMPTS", default_value_t = 60)]
    pub poll_attempts: u32,

    /// Seconds between TestFlight processing polls
    #[arg(long, env = "INPUT_POLL_INTERVAL", default_value_t = 30)]
    pub poll_interval: u64,
}

/// Inputs for the post phase
#[derive(Parser, Debug)]
pub struct PostArgs {
    /// Severity for best-effort cleanup failures
    #[arg(long, value_enum, default_value_t = CleanupSeverity::Warn)]
    pub cleanup_log_level: CleanupSeverity,
}

/// How loudly to report best-effort cleanup failures
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupSeverity {
    /// Log at warning level
    Warn,
    /// Log at error level (still never escalates)
    Error,
}

impl std::fmt::Display for CleanupSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if let Command::Run(run) = &self.command {
            if run.certificate.is_some() && run.certificate_password.is_none() {
                return Err("certificate requires certificate-password".to_string());
            }
            if run.provisioning_profile.is_some() && run.provisioning_profile_name.is_none() {
                return Err("provisioning-profile requires provisioning-profile-name".to_string());
            }
            if run.app_store_connect_key.is_none() && run.app_store_connect_key_path.is_none() {
                return Err(
                    "one of app-store-connect-key or app-store-connect-key-path is required"
                        .to_string(),
                );
            }
            if run.poll_attempts == 0 {
                return Err("poll-attempts must be at least 1".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_run_args() -> Vec<&'static str> {
        vec![
            "xcode_builder",
            "run",
            "--app-store-connect-key-id",
            "AB12CD34EF",
            "--app-store-connect-issuer-id",
            "12345678-1234-1234-1234-123456789012",
            "--app-store-connect-key-path",
            "/tmp/AuthKey.p8",
        ]
    }

    #[test]
    fn run_args_defaults() {
        let args = Args::try_parse_from(base_run_args()).expect("parse");
        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };
        assert_eq!(run.configuration, "Release");
        assert_eq!(run.export_option, ExportIntent::Development);
        assert!(run.notarize);
        assert!(!run.upload);
        assert_eq!(run.poll_attempts, 60);
        assert_eq!(run.poll_interval, 30);
    }

    #[test]
    fn validate_rejects_certificate_without_password() {
        let mut argv = base_run_args();
        argv.extend(["--certificate", "aGVsbG8="]);
        let args = Args::try_parse_from(argv).expect("parse");
        assert!(args.validate().is_err());
    }

    #[test]
    fn validate_requires_key_material() {
        let argv = vec![
            "xcode_builder",
            "run",
            "--app-store-connect-key-id",
            "AB12CD34EF",
            "--app-store-connect-issuer-id",
            "12345678-1234-1234-1234-123456789012",
        ];
        let args = Args::try_parse_from(argv).expect("parse");
        assert!(args.validate().is_err());
    }

    #[test]
    fn boolish_upload_accepts_yes() {
        let mut argv = base_run_args();
        argv.extend(["--upload", "yes"]);
        let args = Args::try_parse_from(argv).expect("parse");
        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };
        assert!(run.upload);
    }
}

//! Comprehensive error types for xcode_builder operations.
//!
//! This module defines all error types with actionable error messages and recovery suggestions.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for xcode_builder operations
pub type Result<T> = std::result::Result<T, BuilderError>;

/// Main error type for all xcode_builder operations
#[derive(Error, Debug)]
pub enum BuilderError {
    /// Credential import/cleanup errors
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Project resolution errors
    #[error("Project error: {0}")]
    Project(#[from] ProjectError),

    /// Archive/export pipeline errors
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Validation/upload errors
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// TestFlight metadata errors
    #[error("TestFlight error: {0}")]
    TestFlight(#[from] TestFlightError),

    /// Cross-invocation state errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Property list errors
    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JWT signing errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Credential import and teardown errors
#[derive(Error, Debug)]
pub enum CredentialError {
    /// A required secret input was not supplied
    #[error("Missing required secret: {name}")]
    MissingSecret {
        /// Input name
        name: String,
    },

    /// Base64 decoding of a secret failed
    #[error("Failed to decode {name}: {reason}")]
    InvalidSecret {
        /// Input name
        name: String,
        /// Reason for the error
        reason: String,
    },

    /// A `security` subcommand exited non-zero
    #[error("security {subcommand} failed: {stderr}")]
    KeychainOperation {
        /// The security subcommand that failed
        subcommand: String,
        /// Captured stderr
        stderr: String,
    },

    /// No code-signing identity could be discovered in the keychain
    #[error("Failed to find signing identity in keychain {keychain}")]
    NoSigningIdentity {
        /// Keychain path
        keychain: PathBuf,
    },

    /// No 10-character team id token found in the signing identity
    #[error("Failed to match team id in signing identity '{identity}'")]
    NoTeamId {
        /// Signing identity display name
        identity: String,
    },

    /// Provisioning profile name has an unrecognized extension
    #[error(
        "Provisioning profile name '{name}' must end with .mobileprovision or .provisionprofile"
    )]
    BadProfileName {
        /// Supplied profile name
        name: String,
    },

    /// UUID key missing from the provisioning profile plist
    #[error("Failed to parse provisioning profile UUID from {path}")]
    NoProfileUuid {
        /// Profile path
        path: PathBuf,
    },
}

/// Project descriptor resolution errors
#[derive(Error, Debug)]
pub enum ProjectError {
    /// No .xcodeproj matched the project glob
    #[error("Unable to find .xcodeproj with pattern '{pattern}'")]
    ProjectNotFound {
        /// Glob pattern searched
        pattern: String,
    },

    /// The project listing contained no schemes
    #[error("No schemes found in project {project}")]
    NoSchemes {
        /// Project name
        project: String,
    },

    /// No scheme survived the fallback policy
    #[error("Unable to determine the scheme to build for project {project}")]
    NoUsableScheme {
        /// Project name
        project: String,
    },

    /// PLATFORM_NAME missing or unrecognized in build settings
    #[error("Unable to determine the platform to build for: {reason}")]
    UnknownPlatform {
        /// Reason for the error
        reason: String,
    },

    /// Bundle identifier not configured and not present in the project
    #[error("Unable to determine bundle id from the project file at {path}")]
    NoBundleId {
        /// Project file path
        path: PathBuf,
    },

    /// A project inspection command exited non-zero
    #[error("xcodebuild {subcommand} failed: {stderr}")]
    InspectionFailed {
        /// The xcodebuild subcommand that failed
        subcommand: String,
        /// Captured stderr
        stderr: String,
    },
}

/// Archive and export errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// xcodebuild exited non-zero
    #[error("xcodebuild exited with code {code}")]
    XcodebuildFailed {
        /// Exit code
        code: i32,
    },

    /// The log filter process exited non-zero
    #[error("xcbeautify exited with code {code}")]
    LogFilterFailed {
        /// Exit code
        code: i32,
    },

    /// The export produced no artifact
    #[error("No IPA, APP or PKG file found in the export path {path}")]
    NoArtifact {
        /// Export path searched
        path: PathBuf,
    },

    /// Installer packaging failed
    #[error("productbuild failed: {stderr}")]
    PackagingFailed {
        /// Captured stderr
        stderr: String,
    },

    /// Platform SDK bootstrap failed
    #[error("Failed to install the {platform} SDK: {reason}")]
    SdkBootstrapFailed {
        /// Platform name
        platform: String,
        /// Reason for the error
        reason: String,
    },

    /// The requested export intent is not valid for the platform
    #[error("Export option '{intent}' is not supported on {platform}")]
    UnsupportedIntent {
        /// Export intent
        intent: String,
        /// Platform name
        platform: String,
    },
}

/// altool validation and upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    /// --validate-app exited non-zero
    #[error("App validation failed: {diagnostics}")]
    ValidationFailed {
        /// Diagnostic payload parsed from altool JSON output
        diagnostics: String,
    },

    /// --upload-package exited non-zero
    #[error("App upload failed: {diagnostics}")]
    UploadFailed {
        /// Diagnostic payload parsed from altool JSON output
        diagnostics: String,
    },

    /// The apps collection returned no record for the bundle id
    #[error("No apps found for bundle id {bundle_id}")]
    NoAppsFound {
        /// Bundle identifier queried
        bundle_id: String,
    },
}

/// TestFlight metadata update errors
#[derive(Error, Debug)]
pub enum TestFlightError {
    /// HTTP 401 from the REST API
    #[error("App Store Connect rejected the bearer token (HTTP 401)")]
    Unauthorized,

    /// No pre-release version matched platform + version
    #[error("No pre-release version found for {platform} {version}")]
    NoPreReleaseVersion {
        /// Platform name
        platform: String,
        /// Version string
        version: String,
    },

    /// Polling exhausted without the build reaching a terminal success state
    #[error("Build {build_number} not processed after {attempts} attempts")]
    ProcessingTimeout {
        /// Build number polled for
        build_number: String,
        /// Attempts made
        attempts: u32,
    },

    /// The build reached a terminal failure state
    #[error("Build {build_number} processing ended in state {state}")]
    ProcessingFailed {
        /// Build number
        build_number: String,
        /// Terminal processing state
        state: String,
    },

    /// The REST API returned an error payload
    #[error("App Store Connect API error: {detail}")]
    Api {
        /// Error detail from the response body
        detail: String,
    },
}

/// Cross-invocation state errors
#[derive(Error, Debug)]
pub enum StateError {
    /// State file corrupted
    #[error("State file corrupted: {reason}")]
    Corrupted {
        /// Reason for the error
        reason: String,
    },

    /// State file not found where one was required
    #[error("State file not found. No import recorded for this job.")]
    NotFound,

    /// Failed to save state
    #[error("Failed to save state: {reason}")]
    SaveFailed {
        /// Reason for the error
        reason: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

impl BuilderError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            BuilderError::Credential(CredentialError::MissingSecret { name }) => vec![
                format!("Supply the '{}' input or its environment variable", name),
                "Check that the CI secret is exposed to this step".to_string(),
            ],
            BuilderError::Credential(CredentialError::NoSigningIdentity { .. }) => vec![
                "Verify the certificate input holds a base64-encoded .p12".to_string(),
                "Verify the certificate password matches the .p12".to_string(),
            ],
            BuilderError::Project(ProjectError::ProjectNotFound { .. }) => vec![
                "Set project-path to a glob matching the generated .xcodeproj".to_string(),
                "Make sure the Xcode project was generated before this step runs".to_string(),
            ],
            BuilderError::Upload(UploadError::NoAppsFound { bundle_id }) => vec![
                format!(
                    "Create an app record for {} in App Store Connect first",
                    bundle_id
                ),
                "Check that the API key has access to the right team".to_string(),
            ],
            BuilderError::TestFlight(TestFlightError::Unauthorized) => vec![
                "Regenerate the App Store Connect API key".to_string(),
                "Check that the issuer id matches the key id".to_string(),
            ],
            BuilderError::TestFlight(TestFlightError::ProcessingTimeout { .. }) => vec![
                "Raise --poll-attempts or --poll-interval for slow processing days".to_string(),
                "Check the build status in App Store Connect".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}

//! Signing credential lifecycle.
//!
//! The run phase imports CI-supplied secrets into an ephemeral, randomly
//! named keychain plus per-session key files; the post phase tears all of
//! it down using the recorded session state. Random naming is the only
//! isolation mechanism between concurrent jobs on a shared runner, so every
//! path is derived from the session id.

pub mod keychain;
pub mod token;

pub use token::TokenProvider;

use crate::cli::{CleanupSeverity, RunArgs};
use crate::error::{CredentialError, Result};
use crate::state::{SessionState, runner_temp};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::distr::{Alphanumeric, SampleString};
use regex::Regex;
use std::path::PathBuf;

/// Imported signing and API authentication material
#[derive(Debug)]
pub struct AppleCredential {
    /// Random session identifier namespacing keychain and key files
    pub session_id: String,
    /// Path of the ephemeral keychain when a certificate was imported
    pub keychain_path: Option<PathBuf>,
    /// App Store Connect API key id
    pub key_id: String,
    /// App Store Connect API issuer id
    pub issuer_id: String,
    /// Path the .p8 key was written to (xcodebuild wants a file)
    pub key_path: PathBuf,
    /// PEM contents of the .p8 key (the token provider wants bytes)
    pub key_pem: String,
    /// Apple Developer team id
    pub team_id: Option<String>,
    /// Code-signing identity display name
    pub signing_identity: Option<String>,
    /// UUID of the installed provisioning profile
    pub provisioning_profile_uuid: Option<String>,
}

impl AppleCredential {
    /// Import credentials from the step inputs.
    ///
    /// Writes the .p8 key, optionally creates and populates the ephemeral
    /// keychain, optionally installs the provisioning profile, and records
    /// every created path in `state` so the post phase can remove them.
    pub async fn import(args: &RunArgs, state: &mut SessionState) -> Result<Self> {
        log::info!("Importing credentials...");
        mask(&state.session_id);

        let key_pem = read_connect_key(args).await?;
        let key_path = write_connect_key(&args.app_store_connect_key_id, &key_pem, state).await?;

        let mut team_id = args.team_id.clone();
        let mut signing_identity = args.signing_identity.clone();
        let mut keychain_path = None;

        if let Some(certificate_base64) = &args.certificate {
            let password = args.certificate_password.as_deref().ok_or_else(|| {
                CredentialError::MissingSecret {
                    name: "certificate-password".to_string(),
                }
            })?;

            let certificate = BASE64.decode(certificate_base64.trim()).map_err(|e| {
                CredentialError::InvalidSecret {
                    name: "certificate".to_string(),
                    reason: e.to_string(),
                }
            })?;

            let session_id = state.session_id.clone();
            let keychain = import_certificate(&session_id, &certificate, password, state).await?;

            if signing_identity.is_none() {
                let listing = keychain::find_identities(&keychain).await?;
                let identity = keychain::parse_signing_identity(&listing).ok_or_else(|| {
                    CredentialError::NoSigningIdentity {
                        keychain: keychain.clone(),
                    }
                })?;
                log::debug!("Discovered signing identity: {identity}");

                if team_id.is_none() {
                    let derived = keychain::parse_team_id(&identity).ok_or_else(|| {
                        CredentialError::NoTeamId {
                            identity: identity.clone(),
                        }
                    })?;
                    mask(&derived);
                    team_id = Some(derived);
                }
                signing_identity = Some(identity);
            }

            keychain_path = Some(keychain);
        }

        let provisioning_profile_uuid = match &args.provisioning_profile {
            Some(profile_base64) => {
                Some(install_provisioning_profile(args, profile_base64, state).await?)
            }
            None => None,
        };

        Ok(Self {
            session_id: state.session_id.clone(),
            keychain_path,
            key_id: args.app_store_connect_key_id.clone(),
            issuer_id: args.app_store_connect_issuer_id.clone(),
            key_path,
            key_pem,
            team_id,
            signing_identity,
            provisioning_profile_uuid,
        })
    }

    /// Build a token provider for this credential's API key
    pub fn token_provider(&self) -> Result<TokenProvider> {
        TokenProvider::new(&self.key_id, &self.issuer_id, self.key_pem.as_bytes())
    }
}

/// Tear down everything a prior import recorded in `state`.
///
/// Profile and key removal are best-effort and logged at the configured
/// severity; keychain deletion is the one step that fails the post phase,
/// because a leaked keychain outlives the job on a shared runner. All steps
/// tolerate already-removed resources.
pub async fn cleanup(state: &SessionState, severity: CleanupSeverity) -> Result<()> {
    if let Some(profile_path) = &state.provisioning_profile_path {
        log::info!("Removing provisioning profile...");
        if profile_path.exists()
            && let Err(e) = tokio::fs::remove_file(profile_path).await
        {
            log_cleanup_failure(severity, &format!("Failed to remove provisioning profile: {e}"));
        }
    }

    match &state.keychain_path {
        Some(keychain_path) if keychain_path.exists() => {
            log::info!("Removing keychain...");
            keychain::delete_keychain(keychain_path).await?;
        }
        Some(_) => {
            log::debug!("Keychain already removed");
        }
        None => {
            log::debug!("No keychain recorded for this session");
        }
    }

    if let Some(key_path) = &state.app_store_connect_key_path {
        log::info!("Removing credentials...");
        if key_path.exists()
            && let Err(e) = tokio::fs::remove_file(key_path).await
        {
            log_cleanup_failure(severity, &format!("Failed to remove App Store Connect key: {e}"));
        }
    }

    Ok(())
}

fn log_cleanup_failure(severity: CleanupSeverity, message: &str) {
    match severity {
        CleanupSeverity::Warn => log::warn!("{message}"),
        CleanupSeverity::Error => log::error!("{message}"),
    }
}

async fn read_connect_key(args: &RunArgs) -> Result<String> {
    if let Some(key_base64) = &args.app_store_connect_key {
        let decoded =
            BASE64
                .decode(key_base64.trim())
                .map_err(|e| CredentialError::InvalidSecret {
                    name: "app-store-connect-key".to_string(),
                    reason: e.to_string(),
                })?;
        return String::from_utf8(decoded).map_err(|e| {
            CredentialError::InvalidSecret {
                name: "app-store-connect-key".to_string(),
                reason: e.to_string(),
            }
            .into()
        });
    }

    if let Some(key_path) = &args.app_store_connect_key_path {
        return Ok(tokio::fs::read_to_string(key_path).await?);
    }

    Err(CredentialError::MissingSecret {
        name: "app-store-connect-key".to_string(),
    }
    .into())
}

async fn write_connect_key(
    key_id: &str,
    key_pem: &str,
    state: &mut SessionState,
) -> Result<PathBuf> {
    let key_dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("HOME not set"))?
        .join(".appstoreconnect/private_keys");
    tokio::fs::create_dir_all(&key_dir).await?;

    let key_path = key_dir.join(format!("AuthKey_{key_id}.p8"));
    tokio::fs::write(&key_path, key_pem).await?;

    state.app_store_connect_key_id = Some(key_id.to_string());
    state.app_store_connect_key_path = Some(key_path.clone());
    Ok(key_path)
}

async fn import_certificate(
    session_id: &str,
    certificate: &[u8],
    password: &str,
    state: &mut SessionState,
) -> Result<PathBuf> {
    log::info!("Importing certificate...");
    let temp = runner_temp();
    let certificate_path = temp.join(format!("{session_id}.p12"));
    let keychain_path = temp.join(format!("{session_id}.keychain-db"));

    tokio::fs::write(&certificate_path, certificate).await?;
    state.keychain_path = Some(keychain_path.clone());

    // Passphrase lives only for this import; unlocking later goes through
    // the partition list grant, not the passphrase.
    let passphrase = Alphanumeric.sample_string(&mut rand::rng(), 16);

    keychain::create_keychain(&keychain_path, &passphrase).await?;
    keychain::set_keychain_settings(&keychain_path).await?;
    keychain::unlock_keychain(&keychain_path, &passphrase).await?;
    keychain::import_certificate(&keychain_path, &certificate_path, password).await?;
    keychain::set_key_partition_list(&keychain_path, &passphrase).await?;
    keychain::add_to_search_list(&keychain_path).await?;

    tokio::fs::remove_file(&certificate_path).await?;

    Ok(keychain_path)
}

async fn install_provisioning_profile(
    args: &RunArgs,
    profile_base64: &str,
    state: &mut SessionState,
) -> Result<String> {
    log::info!("Importing provisioning profile...");
    let name = args.provisioning_profile_name.as_deref().ok_or_else(|| {
        CredentialError::MissingSecret {
            name: "provisioning-profile-name".to_string(),
        }
    })?;

    if !name.ends_with(".mobileprovision") && !name.ends_with(".provisionprofile") {
        return Err(CredentialError::BadProfileName {
            name: name.to_string(),
        }
        .into());
    }

    let profile = BASE64
        .decode(profile_base64.trim())
        .map_err(|e| CredentialError::InvalidSecret {
            name: "provisioning-profile".to_string(),
            reason: e.to_string(),
        })?;

    let profile_path = runner_temp().join(name);
    tokio::fs::write(&profile_path, &profile).await?;
    state.provisioning_profile_path = Some(profile_path.clone());

    keychain::verify_profile(&profile_path).await?;

    let contents = String::from_utf8_lossy(&profile);
    parse_profile_uuid(&contents).ok_or_else(|| {
        CredentialError::NoProfileUuid {
            path: profile_path.clone(),
        }
        .into()
    })
}

/// Extract the UUID from the plist XML embedded in a signed profile
pub fn parse_profile_uuid(contents: &str) -> Option<String> {
    let re = Regex::new(r"<key>UUID</key>\s*<string>(?P<uuid>[^<]+)</string>").ok()?;
    let captures = re.captures(contents)?;
    Some(captures.name("uuid")?.as_str().to_string())
}

/// Flag a value as a secret in the runner's command stream
fn mask(value: &str) {
    if std::env::var_os("GITHUB_ACTIONS").is_some() {
        println!("::add-mask::{value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_uuid_from_embedded_plist() {
        let contents = "garbage\x01binary<key>UUID</key>\n\t<string>f0e1d2c3-4b5a-6978-8897-a6b5c4d3e2f1</string>more";
        assert_eq!(
            parse_profile_uuid(contents).as_deref(),
            Some("f0e1d2c3-4b5a-6978-8897-a6b5c4d3e2f1")
        );
    }

    #[test]
    fn profile_without_uuid_key_yields_none() {
        assert!(parse_profile_uuid("<key>Name</key><string>x</string>").is_none());
    }

    #[tokio::test]
    async fn cleanup_tolerates_empty_state() {
        let state = SessionState::new();
        cleanup(&state, CleanupSeverity::Warn).await.expect("cleanup");
    }

    #[tokio::test]
    async fn cleanup_tolerates_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut state = SessionState::new();
        state.provisioning_profile_path = Some(dir.path().join("gone.mobileprovision"));
        state.app_store_connect_key_path = Some(dir.path().join("gone.p8"));
        // Keychain path recorded but never created on disk
        state.keychain_path = Some(dir.path().join("gone.keychain-db"));

        cleanup(&state, CleanupSeverity::Error).await.expect("cleanup");
        // Twice, after partial manual deletion
        cleanup(&state, CleanupSeverity::Warn).await.expect("cleanup again");
    }
}

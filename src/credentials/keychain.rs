//! Wrappers around the macOS `security` tool.
//!
//! Every keychain operation the pipeline needs maps to one `security`
//! subcommand. Identity and team-id discovery parse the tool's freeform
//! output; those regexes are kept here, next to fixture-backed tests, so a
//! format change in a future macOS release is a localized fix.

use crate::error::{CredentialError, Result};
use regex::Regex;
use std::path::Path;
use tokio::process::Command;

const SECURITY: &str = "/usr/bin/security";

/// Auto-lock timeout for ephemeral keychains, in seconds
pub const KEYCHAIN_LOCK_TIMEOUT_SECS: u32 = 21600;

/// Run a `security` subcommand, failing on non-zero exit
async fn run_security(args: &[&str]) -> Result<std::process::Output> {
    let output = Command::new(SECURITY).args(args).output().await?;
    if !output.status.success() {
        return Err(CredentialError::KeychainOperation {
            subcommand: args.first().unwrap_or(&"").to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
        .into());
    }
    Ok(output)
}

fn path_str(path: &Path) -> &str {
    // Keychain paths are derived from UUIDs and the temp dir; they are UTF-8
    path.to_str().unwrap_or_default()
}

/// Create a new keychain protected by the given passphrase
pub async fn create_keychain(path: &Path, password: &str) -> Result<()> {
    run_security(&["create-keychain", "-p", password, path_str(path)]).await?;
    Ok(())
}

/// Set the auto-lock timeout on the keychain
pub async fn set_keychain_settings(path: &Path) -> Result<()> {
    let timeout = KEYCHAIN_LOCK_TIMEOUT_SECS.to_string();
    run_security(&["set-keychain-settings", "-lut", &timeout, path_str(path)]).await?;
    Ok(())
}

/// Unlock the keychain for non-interactive use
pub async fn unlock_keychain(path: &Path, password: &str) -> Result<()> {
    run_security(&["unlock-keychain", "-p", password, path_str(path)]).await?;
    Ok(())
}

/// Import a .p12 certificate into the keychain
pub async fn import_certificate(
    keychain: &Path,
    certificate: &Path,
    password: &str,
) -> Result<()> {
    run_security(&[
        "import",
        path_str(certificate),
        "-P",
        password,
        "-A",
        "-t",
        "cert",
        "-f",
        "pkcs12",
        "-k",
        path_str(keychain),
    ])
    .await?;
    Ok(())
}

/// Grant apple-tool, apple and codesign partition access to the imported key
///
/// Without this, codesign pops a UI prompt for the key the first time it is
/// used, which hangs a headless runner.
pub async fn set_key_partition_list(keychain: &Path, password: &str) -> Result<()> {
    run_security(&[
        "set-key-partition-list",
        "-S",
        "apple-tool:,apple:,codesign:",
        "-s",
        "-k",
        password,
        path_str(keychain),
    ])
    .await?;
    Ok(())
}

/// Put the keychain at the front of the user search list, keeping login
pub async fn add_to_search_list(keychain: &Path) -> Result<()> {
    run_security(&[
        "list-keychains",
        "-d",
        "user",
        "-s",
        path_str(keychain),
        "login.keychain-db",
    ])
    .await?;
    Ok(())
}

/// List valid code-signing identities in the keychain (raw output)
pub async fn find_identities(keychain: &Path) -> Result<String> {
    let output = run_security(&["find-identity", "-v", "-p", "codesigning", path_str(keychain)])
        .await?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Decode and print the provisioning profile's CMS payload as a sanity check
pub async fn verify_profile(profile: &Path) -> Result<()> {
    run_security(&["cms", "-D", "-i", path_str(profile)]).await?;
    Ok(())
}

/// Delete the keychain
pub async fn delete_keychain(path: &Path) -> Result<()> {
    run_security(&["delete-keychain", path_str(path)]).await?;
    Ok(())
}

/// Parse the first code-signing identity from `find-identity -v` output
///
/// Expected line shape:
/// `  1) A1B2C3... "Apple Distribution: Example Corp (A1B2C3D4E5)"`
pub fn parse_signing_identity(output: &str) -> Option<String> {
    let re = Regex::new(r#"\d+\) (?P<hash>\w+) "(?P<identity>[^"]+)""#).ok()?;
    let captures = re.captures(output)?;
    Some(captures.name("identity")?.as_str().to_string())
}

/// Extract the 10-character team id token from a signing identity name
pub fn parse_team_id(identity: &str) -> Option<String> {
    let re = Regex::new(r"\(?(?P<team_id>[A-Z0-9]{10})\)?\s*$").ok()?;
    let captures = re.captures(identity)?;
    Some(captures.name("team_id")?.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Captured from security 2.x on macOS 14
    const FIND_IDENTITY_OUTPUT: &str = r#"Policy: Code Signing
  Matching identities
  1) 8A3FC7B21D9E04C5F6A7B8C9D0E1F2A3B4C5D6E7 "Apple Distribution: Example Corp (A1B2C3D4E5)"
     1 identities found

  Valid identities only
  1) 8A3FC7B21D9E04C5F6A7B8C9D0E1F2A3B4C5D6E7 "Apple Distribution: Example Corp (A1B2C3D4E5)"
     1 valid identities found
"#;

    #[test]
    fn parses_first_identity() {
        let identity = parse_signing_identity(FIND_IDENTITY_OUTPUT).expect("identity");
        assert_eq!(identity, "Apple Distribution: Example Corp (A1B2C3D4E5)");
    }

    #[test]
    fn no_identity_in_empty_output() {
        assert!(parse_signing_identity("0 valid identities found\n").is_none());
    }

    #[test]
    fn team_id_from_identity_suffix() {
        assert_eq!(
            parse_team_id("Apple Distribution: Example Corp (A1B2C3D4E5)").as_deref(),
            Some("A1B2C3D4E5")
        );
    }

    #[test]
    fn team_id_requires_ten_chars() {
        assert!(parse_team_id("Apple Development: dev@example.com (ABC)").is_none());
    }
}

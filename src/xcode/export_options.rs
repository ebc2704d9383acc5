//! Export options plist generation.
//!
//! Maps the distribution intent to the xcodebuild export method for the
//! target platform and Xcode release, and writes the options plist the
//! export step consumes.

use std::fmt;
use std::path::Path;

use clap::ValueEnum;

use crate::error::{BuildError, BuilderError, Result};
use crate::project::Platform;

/// Xcode release that renamed the export methods
const METHOD_RENAME_VERSION: semver::Version = semver::Version::new(15, 4, 0);

/// Distribution intent for the exported product
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportIntent {
    /// Development / debugging distribution
    Development,
    /// Ad-hoc distribution to registered devices
    #[value(name = "ad-hoc")]
    AdHoc,
    /// App Store Connect distribution
    #[value(name = "app-store")]
    AppStore,
    /// Steam distribution (macOS only, Developer ID signed)
    Steam,
}

impl fmt::Display for ExportIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::AdHoc => "ad-hoc",
            Self::AppStore => "app-store",
            Self::Steam => "steam",
        };
        write!(f, "{name}")
    }
}

/// How the archive is signed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningStyle {
    /// Imported certificate and profile drive signing
    Manual,
    /// Xcode manages signing assets itself
    Automatic,
}

impl SigningStyle {
    /// Value expected in the export options plist
    pub fn plist_value(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
        }
    }
}

/// Export method string for the intent, platform and Xcode release.
///
/// macOS has no ad-hoc distribution, so that intent degrades to a
/// development export there. Steam builds are Developer ID signed and
/// only exist on macOS. Xcode 15.4 renamed the methods; older toolchains
/// still want the historical names.
pub fn export_method(
    intent: ExportIntent,
    platform: Platform,
    xcode_version: &semver::Version,
) -> Result<&'static str> {
    let renamed = *xcode_version >= METHOD_RENAME_VERSION;

    let method = match (intent, platform) {
        (ExportIntent::Steam, Platform::MacOs) => "developer-id",
        (ExportIntent::Steam, _) => {
            return Err(BuilderError::Build(BuildError::UnsupportedIntent {
                intent: intent.to_string(),
                platform: platform.display_name().to_string(),
            }));
        }
        (ExportIntent::AdHoc, Platform::MacOs) | (ExportIntent::Development, _) => {
            if renamed { "debugging" } else { "development" }
        }
        (ExportIntent::AdHoc, _) => {
            if renamed {
                "release-testing"
            } else {
                "ad-hoc"
            }
        }
        (ExportIntent::AppStore, _) => {
            if renamed {
                "app-store-connect"
            } else {
                "app-store"
            }
        }
    };
    Ok(method)
}

/// Write the export options plist, unless the caller already supplied one.
///
/// An existing file at `path` is left untouched, so a pre-authored plist
/// checked into the project always wins over the computed one.
pub fn write_export_options(
    path: &Path,
    intent: ExportIntent,
    platform: Platform,
    xcode_version: &semver::Version,
    team_id: Option<&str>,
    signing_style: SigningStyle,
) -> Result<()> {
    if path.exists() {
        log::debug!("export options already present at {}", path.display());
        return Ok(());
    }

    let method = export_method(intent, platform, xcode_version)?;

    let mut dict = plist::Dictionary::new();
    dict.insert(
        "method".to_string(),
        plist::Value::String(method.to_string()),
    );
    dict.insert(
        "signingStyle".to_string(),
        plist::Value::String(signing_style.plist_value().to_string()),
    );
    if let Some(team_id) = team_id {
        dict.insert(
            "teamID".to_string(),
            plist::Value::String(team_id.to_string()),
        );
    }

    plist::Value::Dictionary(dict).to_file_xml(path)?;
    Ok(())
}

/// Write the default macOS entitlements for codesigning.
///
/// An existing file at `path` is left untouched, same as the export
/// options plist. App Store builds get the sandbox entitlements review
/// requires. Every other intent gets the relaxations Unity and Mono
/// runtimes need to JIT and load unsigned native plugins.
pub fn write_default_entitlements(path: &Path, intent: ExportIntent) -> Result<()> {
    if path.exists() {
        log::debug!("entitlements already present at {}", path.display());
        return Ok(());
    }

    let keys: &[&str] = match intent {
        ExportIntent::AppStore => &[
            "com.apple.security.app-sandbox",
            "com.apple.security.files.user-selected.read-only",
        ],
        _ => &[
            "com.apple.security.cs.disable-library-validation",
            "com.apple.security.cs.allow-dyld-environment-variables",
            "com.apple.security.cs.disable-executable-page-protection",
        ],
    };

    let mut dict = plist::Dictionary::new();
    for key in keys {
        dict.insert((*key).to_string(), plist::Value::Boolean(true));
    }
    plist::Value::Dictionary(dict).to_file_xml(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const XCODE_15_2: semver::Version = semver::Version::new(15, 2, 0);
    const XCODE_15_4: semver::Version = semver::Version::new(15, 4, 0);
    const XCODE_16: semver::Version = semver::Version::new(16, 0, 0);

    #[test]
    fn legacy_method_names_before_rename() {
        assert_eq!(
            export_method(ExportIntent::Development, Platform::Ios, &XCODE_15_2).unwrap(),
            "development"
        );
        assert_eq!(
            export_method(ExportIntent::AdHoc, Platform::Ios, &XCODE_15_2).unwrap(),
            "ad-hoc"
        );
        assert_eq!(
            export_method(ExportIntent::AppStore, Platform::Ios, &XCODE_15_2).unwrap(),
            "app-store"
        );
    }

    #[test]
    fn renamed_methods_from_15_4() {
        assert_eq!(
            export_method(ExportIntent::Development, Platform::Ios, &XCODE_15_4).unwrap(),
            "debugging"
        );
        assert_eq!(
            export_method(ExportIntent::AdHoc, Platform::Ios, &XCODE_16).unwrap(),
            "release-testing"
        );
        assert_eq!(
            export_method(ExportIntent::AppStore, Platform::TvOs, &XCODE_16).unwrap(),
            "app-store-connect"
        );
    }

    #[test]
    fn macos_ad_hoc_degrades_to_development() {
        assert_eq!(
            export_method(ExportIntent::AdHoc, Platform::MacOs, &XCODE_15_2).unwrap(),
            "development"
        );
        assert_eq!(
            export_method(ExportIntent::AdHoc, Platform::MacOs, &XCODE_16).unwrap(),
            "debugging"
        );
    }

    #[test]
    fn steam_is_developer_id_and_macos_only() {
        assert_eq!(
            export_method(ExportIntent::Steam, Platform::MacOs, &XCODE_15_2).unwrap(),
            "developer-id"
        );
        assert_eq!(
            export_method(ExportIntent::Steam, Platform::MacOs, &XCODE_16).unwrap(),
            "developer-id"
        );
        let err = export_method(ExportIntent::Steam, Platform::Ios, &XCODE_16).unwrap_err();
        assert!(matches!(
            err,
            BuilderError::Build(BuildError::UnsupportedIntent { .. })
        ));
    }

    #[test]
    fn options_plist_carries_method_style_and_team() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("export_options.plist");
        write_export_options(
            &path,
            ExportIntent::AppStore,
            Platform::Ios,
            &XCODE_16,
            Some("ABCDE12345"),
            SigningStyle::Manual,
        )
        .expect("write");

        let value = plist::Value::from_file(&path).expect("read");
        let dict = value.as_dictionary().expect("dict");
        assert_eq!(
            dict.get("method").and_then(plist::Value::as_string),
            Some("app-store-connect")
        );
        assert_eq!(
            dict.get("signingStyle").and_then(plist::Value::as_string),
            Some("manual")
        );
        assert_eq!(
            dict.get("teamID").and_then(plist::Value::as_string),
            Some("ABCDE12345")
        );
    }

    #[test]
    fn existing_options_plist_is_preserved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("export_options.plist");
        std::fs::write(&path, "pre-authored").expect("write");

        write_export_options(
            &path,
            ExportIntent::Development,
            Platform::Ios,
            &XCODE_16,
            None,
            SigningStyle::Automatic,
        )
        .expect("no overwrite");

        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "pre-authored");
    }

    #[test]
    fn app_store_entitlements_are_sandboxed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("entitlements.plist");
        write_default_entitlements(&path, ExportIntent::AppStore).expect("write");

        let value = plist::Value::from_file(&path).expect("read");
        let dict = value.as_dictionary().expect("dict");
        assert_eq!(
            dict.get("com.apple.security.app-sandbox")
                .and_then(plist::Value::as_boolean),
            Some(true)
        );
        assert!(!dict.contains_key("com.apple.security.cs.disable-library-validation"));
    }

    #[test]
    fn existing_entitlements_are_preserved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("entitlements.plist");
        std::fs::write(&path, "user-edited entitlements").expect("write");

        write_default_entitlements(&path, ExportIntent::Development).expect("no overwrite");

        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "user-edited entitlements");
    }
}

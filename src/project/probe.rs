//! Adapters over xcodebuild's structured and freeform output.
//!
//! xcodebuild's human-readable output has changed shape across releases,
//! so every regex/JSON parse of it lives here with a fixture per observed
//! format. Callers never touch raw tool output directly.

use regex::Regex;
use serde::Deserialize;

/// Wire shape of `xcodebuild -list -json`
#[derive(Debug, Deserialize)]
struct ListOutput {
    #[serde(default)]
    project: Option<ListTarget>,
    #[serde(default)]
    workspace: Option<ListTarget>,
}

#[derive(Debug, Deserialize)]
struct ListTarget {
    #[serde(default)]
    schemes: Vec<String>,
}

/// Schemes advertised by `xcodebuild -list -json`
pub fn parse_scheme_list(json: &str) -> Result<Vec<String>, serde_json::Error> {
    let output: ListOutput = serde_json::from_str(json)?;
    Ok(output
        .project
        .or(output.workspace)
        .map(|target| target.schemes)
        .unwrap_or_default())
}

/// Schemes generated by Unity/CocoaPods that are never the app scheme
const EXCLUDED_SCHEMES: &[&str] = &["GameAssembly", "UnityFramework", "Pods"];

/// Known-good default scheme for Unity-exported projects
const PREFERRED_SCHEME: &str = "Unity-iPhone";

/// Apply the scheme fallback policy.
///
/// A configured override always wins, even when `-list` does not advertise
/// it; shared schemes can be absent from the listing and xcodebuild itself
/// rejects a truly unknown one. Without an override, prefer `Unity-iPhone`,
/// else the first scheme that is neither generated plumbing nor a test
/// scheme.
pub fn choose_scheme(schemes: &[String], configured: Option<&str>) -> Option<String> {
    if let Some(configured) = configured {
        if !schemes.iter().any(|s| s == configured) {
            log::warn!("Configured scheme {configured} is not listed by the project, using it anyway");
        }
        return Some(configured.to_string());
    }

    if schemes.iter().any(|s| s == PREFERRED_SCHEME) {
        return Some(PREFERRED_SCHEME.to_string());
    }

    schemes
        .iter()
        .find(|s| !EXCLUDED_SCHEMES.contains(&s.as_str()) && !s.contains("Test"))
        .cloned()
}

/// `PLATFORM_NAME` from `-showBuildSettings` key/value text
pub fn parse_platform_name(build_settings: &str) -> Option<String> {
    let re = Regex::new(r"(?m)^\s+PLATFORM_NAME = (?P<name>\w+)$").ok()?;
    let captures = re.captures(build_settings)?;
    Some(captures.name("name")?.as_str().to_string())
}

/// `PRODUCT_BUNDLE_IDENTIFIER` from the pbxproj text
pub fn parse_bundle_identifier(pbxproj: &str) -> Option<String> {
    let re = Regex::new(r#"PRODUCT_BUNDLE_IDENTIFIER = "?(?P<id>[^";]+)"?;"#).ok()?;
    let captures = re.captures(pbxproj)?;
    Some(captures.name("id")?.as_str().trim().to_string())
}

/// `MARKETING_VERSION` (the short version string) from the pbxproj text
pub fn parse_marketing_version(pbxproj: &str) -> Option<String> {
    let re = Regex::new(r#"MARKETING_VERSION = "?(?P<v>[^";]+)"?;"#).ok()?;
    let captures = re.captures(pbxproj)?;
    Some(captures.name("v")?.as_str().trim().to_string())
}

/// `CURRENT_PROJECT_VERSION` (the build number) from the pbxproj text
pub fn parse_current_project_version(pbxproj: &str) -> Option<String> {
    let re = Regex::new(r#"CURRENT_PROJECT_VERSION = "?(?P<v>[^";]+)"?;"#).ok()?;
    let captures = re.captures(pbxproj)?;
    Some(captures.name("v")?.as_str().trim().to_string())
}

/// Xcode release from `xcodebuild -version`, padded to a full semver
pub fn parse_xcode_version(output: &str) -> Option<semver::Version> {
    let re = Regex::new(r"Xcode (?P<v>\d+(?:\.\d+){0,2})").ok()?;
    let captures = re.captures(output)?;
    let raw = captures.name("v")?.as_str();
    let padded = match raw.split('.').count() {
        1 => format!("{raw}.0.0"),
        2 => format!("{raw}.0"),
        _ => raw.to_string(),
    };
    semver::Version::parse(&padded).ok()
}

/// Wire shape of `xcodebuild -showsdks -json` entries
#[derive(Debug, Deserialize)]
struct SdkEntry {
    #[serde(default)]
    platform: Option<String>,
}

/// Whether the given SDK platform appears in `-showsdks -json` output
pub fn sdk_installed(json: &str, sdk_name: &str) -> bool {
    let Ok(entries) = serde_json::from_str::<Vec<SdkEntry>>(json) else {
        return false;
    };
    entries
        .iter()
        .any(|entry| entry.platform.as_deref() == Some(sdk_name))
}

//! Project discovery and descriptor resolution.
//!
//! Locates the Xcode project under the workspace, interrogates it with
//! `xcodebuild -list` / `-showBuildSettings`, and produces an immutable
//! [`ResolvedProject`] for the build stages to consume.

mod platform;
pub mod probe;

pub use platform::Platform;

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::cli::RunArgs;
use crate::error::{BuilderError, ProjectError, Result};

/// xcodebuild binary, resolved through the active developer directory
const XCODEBUILD: &str = "/usr/bin/xcodebuild";

/// Fully resolved inputs for one build. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    /// Path to the `.xcodeproj` bundle
    pub project_path: PathBuf,
    /// Scheme selected for archiving
    pub scheme: String,
    /// Build configuration, e.g. `Release`
    pub configuration: String,
    /// Target platform of the scheme
    pub platform: Platform,
    /// Product bundle identifier
    pub bundle_id: String,
    /// Marketing version (`CFBundleShortVersionString`), when discoverable
    pub marketing_version: Option<String>,
    /// Build number (`CFBundleVersion`), when discoverable
    pub build_number: Option<String>,
    /// Explicit `-destination` override, if any
    pub destination: Option<String>,
}

impl ResolvedProject {
    /// Resolve the project descriptor from CLI arguments and the workspace.
    pub async fn resolve(args: &RunArgs) -> Result<Self> {
        let root = workspace_root();
        let project_path = find_project(&root, args.project_path.as_deref())?;

        let project_name = project_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let schemes = list_schemes(&project_path).await?;
        if schemes.is_empty() && args.scheme.is_none() {
            return Err(BuilderError::Project(ProjectError::NoSchemes {
                project: project_name.clone(),
            }));
        }
        let scheme = probe::choose_scheme(&schemes, args.scheme.as_deref()).ok_or(
            BuilderError::Project(ProjectError::NoUsableScheme {
                project: project_name,
            }),
        )?;

        let settings = show_build_settings(&project_path, &scheme, &args.configuration).await?;

        let platform = match args.platform {
            Some(platform) => platform,
            None => {
                let sdk = probe::parse_platform_name(&settings).ok_or_else(|| {
                    BuilderError::Project(ProjectError::UnknownPlatform {
                        reason: "PLATFORM_NAME missing from build settings".to_string(),
                    })
                })?;
                Platform::from_sdk_name(&sdk).ok_or_else(|| {
                    BuilderError::Project(ProjectError::UnknownPlatform {
                        reason: format!("unrecognized SDK '{sdk}'"),
                    })
                })?
            }
        };

        let pbxproj = read_pbxproj(&project_path).ok();
        let bundle_id = match &args.bundle_id {
            Some(id) => id.clone(),
            None => pbxproj
                .as_deref()
                .and_then(probe::parse_bundle_identifier)
                .ok_or_else(|| {
                    BuilderError::Project(ProjectError::NoBundleId {
                        path: project_path.clone(),
                    })
                })?,
        };

        let (marketing_version, build_number) = version_metadata(pbxproj.as_deref(), &root);

        Ok(Self {
            project_path,
            scheme,
            configuration: args.configuration.clone(),
            platform,
            bundle_id,
            marketing_version,
            build_number,
            destination: args.destination.clone(),
        })
    }
}

/// Workspace root: `GITHUB_WORKSPACE` on runners, cwd elsewhere.
pub fn workspace_root() -> PathBuf {
    std::env::var_os("GITHUB_WORKSPACE")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Locate the `.xcodeproj` under the workspace root.
///
/// Unity exports a sibling `GameAssembly.xcodeproj` that must never be
/// selected as the app project.
fn find_project(root: &Path, configured_glob: Option<&str>) -> Result<PathBuf> {
    let pattern = match configured_glob {
        Some(custom) => root.join(custom),
        None => root.join("**").join("*.xcodeproj"),
    };
    let pattern = pattern.to_string_lossy().into_owned();

    let mut candidates: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|err| {
            BuilderError::Project(ProjectError::ProjectNotFound {
                pattern: format!("{pattern}: {err}"),
            })
        })?
        .filter_map(std::result::Result::ok)
        .filter(|path| {
            path.file_name()
                .is_none_or(|name| name != "GameAssembly.xcodeproj")
        })
        .collect();
    candidates.sort_by_key(|path| path.components().count());

    candidates
        .into_iter()
        .next()
        .ok_or(BuilderError::Project(ProjectError::ProjectNotFound { pattern }))
}

async fn list_schemes(project_path: &Path) -> Result<Vec<String>> {
    let output = Command::new(XCODEBUILD)
        .arg("-list")
        .arg("-json")
        .arg("-project")
        .arg(project_path)
        .output()
        .await?;
    if !output.status.success() {
        return Err(BuilderError::Project(ProjectError::InspectionFailed {
            subcommand: "-list".to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }));
    }
    let json = String::from_utf8_lossy(&output.stdout);
    probe::parse_scheme_list(&json).map_err(BuilderError::from)
}

async fn show_build_settings(
    project_path: &Path,
    scheme: &str,
    configuration: &str,
) -> Result<String> {
    let output = Command::new(XCODEBUILD)
        .arg("-project")
        .arg(project_path)
        .arg("-scheme")
        .arg(scheme)
        .arg("-configuration")
        .arg(configuration)
        .arg("-showBuildSettings")
        .output()
        .await?;
    if !output.status.success() {
        return Err(BuilderError::Project(ProjectError::InspectionFailed {
            subcommand: "-showBuildSettings".to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn read_pbxproj(project_path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(project_path.join("project.pbxproj"))
}

/// Version metadata, preferring the pbxproj with Info.plist as fallback.
fn version_metadata(pbxproj: Option<&str>, root: &Path) -> (Option<String>, Option<String>) {
    let mut marketing = pbxproj.and_then(probe::parse_marketing_version);
    let mut build = pbxproj.and_then(probe::parse_current_project_version);

    if marketing.is_none() || build.is_none() {
        if let Some(info) = find_info_plist(root)
            && let Ok(value) = plist::Value::from_file(&info)
            && let Some(dict) = value.as_dictionary()
        {
            if marketing.is_none() {
                marketing = dict
                    .get("CFBundleShortVersionString")
                    .and_then(plist::Value::as_string)
                    .map(str::to_string);
            }
            if build.is_none() {
                build = dict
                    .get("CFBundleVersion")
                    .and_then(plist::Value::as_string)
                    .map(str::to_string);
            }
        }
    }

    (marketing, build)
}

fn find_info_plist(root: &Path) -> Option<PathBuf> {
    let pattern = root.join("**").join("Info.plist");
    let mut candidates: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .ok()?
        .filter_map(std::result::Result::ok)
        .filter(|path| {
            // Skip derived data and test bundles
            let text = path.to_string_lossy();
            !text.contains("DerivedData") && !text.contains("Tests")
        })
        .collect();
    candidates.sort_by_key(|path| path.components().count());
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn project_discovery_skips_game_assembly() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("GameAssembly.xcodeproj")).expect("mkdir");
        fs::create_dir(dir.path().join("Unity-iPhone.xcodeproj")).expect("mkdir");

        let found = find_project(dir.path(), None).expect("project");
        assert_eq!(
            found.file_name().and_then(|n| n.to_str()),
            Some("Unity-iPhone.xcodeproj")
        );
    }

    #[test]
    fn project_discovery_fails_on_empty_workspace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = find_project(dir.path(), None).unwrap_err();
        assert!(matches!(
            err,
            BuilderError::Project(ProjectError::ProjectNotFound { .. })
        ));
    }

    #[test]
    fn version_metadata_falls_back_to_info_plist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plist_path = dir.path().join("Info.plist");
        let mut dict = plist::Dictionary::new();
        dict.insert(
            "CFBundleShortVersionString".to_string(),
            plist::Value::String("2.0.1".to_string()),
        );
        dict.insert(
            "CFBundleVersion".to_string(),
            plist::Value::String("77".to_string()),
        );
        plist::Value::Dictionary(dict)
            .to_file_xml(&plist_path)
            .expect("write plist");

        let (marketing, build) = version_metadata(None, dir.path());
        assert_eq!(marketing.as_deref(), Some("2.0.1"));
        assert_eq!(build.as_deref(), Some("77"));
    }

    #[test]
    fn version_metadata_prefers_pbxproj() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pbxproj = "MARKETING_VERSION = 3.1.4;\nCURRENT_PROJECT_VERSION = 9;\n";
        let (marketing, build) = version_metadata(Some(pbxproj), dir.path());
        assert_eq!(marketing.as_deref(), Some("3.1.4"));
        assert_eq!(build.as_deref(), Some("9"));
    }
}

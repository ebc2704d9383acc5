//! Canonical platform names and the mapping tables pinned to them.
//!
//! Apple tools use three different vocabularies for the same platform: SDK
//! names in build settings (`iphoneos`), altool type strings (`ios`) and
//! the REST API enumeration (`IOS`). Everything maps through this enum so
//! an unrecognized name fails the pipeline instead of defaulting.

use clap::ValueEnum;
use std::fmt;

/// Target platform of the build
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// iOS and iPadOS devices
    #[value(name = "iOS", alias = "ios")]
    Ios,
    /// macOS
    #[value(name = "macOS", alias = "macos")]
    MacOs,
    /// Apple TV
    #[value(name = "tvOS", alias = "tvos")]
    TvOs,
    /// Apple Watch
    #[value(name = "watchOS", alias = "watchos")]
    WatchOs,
    /// Apple Vision Pro
    #[value(name = "visionOS", alias = "visionos")]
    VisionOs,
}

impl Platform {
    /// Map a `PLATFORM_NAME` SDK identifier from build settings.
    ///
    /// Total over the five supported SDK names; anything else is `None`
    /// and must fail resolution.
    pub fn from_sdk_name(sdk: &str) -> Option<Self> {
        match sdk {
            "iphoneos" => Some(Self::Ios),
            "macosx" => Some(Self::MacOs),
            "appletvos" => Some(Self::TvOs),
            "watchos" => Some(Self::WatchOs),
            "xros" => Some(Self::VisionOs),
            _ => None,
        }
    }

    /// Human-facing platform name, also used in xcodebuild destinations
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ios => "iOS",
            Self::MacOs => "macOS",
            Self::TvOs => "tvOS",
            Self::WatchOs => "watchOS",
            Self::VisionOs => "visionOS",
        }
    }

    /// altool `--type` value; watchOS apps ship inside iOS packages
    pub fn altool_type(&self) -> Option<&'static str> {
        match self {
            Self::Ios => Some("ios"),
            Self::MacOs => Some("macos"),
            Self::TvOs => Some("appletvos"),
            Self::WatchOs => None,
            Self::VisionOs => Some("xros"),
        }
    }

    /// App Store Connect REST API platform enumeration value
    pub fn api_platform(&self) -> Option<&'static str> {
        match self {
            Self::Ios => Some("IOS"),
            Self::MacOs => Some("MAC_OS"),
            Self::TvOs => Some("TV_OS"),
            Self::WatchOs => None,
            Self::VisionOs => Some("VISION_OS"),
        }
    }

    /// Name accepted by `xcodebuild -downloadPlatform`; macOS is built in
    pub fn download_name(&self) -> Option<&'static str> {
        match self {
            Self::MacOs => None,
            Self::Ios => Some("iOS"),
            Self::TvOs => Some("tvOS"),
            Self::WatchOs => Some("watchOS"),
            Self::VisionOs => Some("visionOS"),
        }
    }

    /// SDK identifier as it appears in `-showsdks` output
    pub fn sdk_name(&self) -> &'static str {
        match self {
            Self::Ios => "iphoneos",
            Self::MacOs => "macosx",
            Self::TvOs => "appletvos",
            Self::WatchOs => "watchos",
            Self::VisionOs => "xros",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdk_mapping_is_total_over_supported_names() {
        assert_eq!(Platform::from_sdk_name("iphoneos"), Some(Platform::Ios));
        assert_eq!(Platform::from_sdk_name("macosx"), Some(Platform::MacOs));
        assert_eq!(Platform::from_sdk_name("appletvos"), Some(Platform::TvOs));
        assert_eq!(Platform::from_sdk_name("watchos"), Some(Platform::WatchOs));
        assert_eq!(Platform::from_sdk_name("xros"), Some(Platform::VisionOs));
    }

    #[test]
    fn unrecognized_sdk_maps_to_none() {
        assert_eq!(Platform::from_sdk_name("driverkit"), None);
        assert_eq!(Platform::from_sdk_name("iphonesimulator"), None);
        assert_eq!(Platform::from_sdk_name(""), None);
    }

    #[test]
    fn altool_types_match_upload_vocabulary() {
        assert_eq!(Platform::Ios.altool_type(), Some("ios"));
        assert_eq!(Platform::MacOs.altool_type(), Some("macos"));
        assert_eq!(Platform::TvOs.altool_type(), Some("appletvos"));
        assert_eq!(Platform::VisionOs.altool_type(), Some("xros"));
        assert_eq!(Platform::WatchOs.altool_type(), None);
    }

    #[test]
    fn api_platform_covers_store_platforms() {
        assert_eq!(Platform::Ios.api_platform(), Some("IOS"));
        assert_eq!(Platform::MacOs.api_platform(), Some("MAC_OS"));
        assert_eq!(Platform::WatchOs.api_platform(), None);
    }
}

//! Wire models for the App Store Connect REST API.
//!
//! Only the resources and attributes this pipeline touches are modeled;
//! the API's envelope is the standard JSON:API `data`/`attributes` shape.

use serde::{Deserialize, Serialize};

/// A single JSON:API resource
#[derive(Debug, Clone, Deserialize)]
pub struct Resource<A> {
    /// Resource identifier
    pub id: String,
    /// Resource type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Typed attributes payload
    #[serde(default = "Option::default")]
    pub attributes: Option<A>,
}

/// Response envelope for a single resource
#[derive(Debug, Deserialize)]
pub struct Document<A> {
    /// The resource
    pub data: Resource<A>,
}

/// Response envelope for a resource collection
#[derive(Debug, Deserialize)]
pub struct Collection<A> {
    /// The resources
    #[serde(default = "Vec::new")]
    pub data: Vec<Resource<A>>,
}

/// `apps` resource attributes
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAttributes {
    /// Bundle identifier of the app record
    #[serde(default)]
    pub bundle_id: Option<String>,
}

/// `builds` resource attributes
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildAttributes {
    /// Build number (`CFBundleVersion`)
    #[serde(default)]
    pub version: Option<String>,
    /// Asynchronous processing state
    #[serde(default)]
    pub processing_state: Option<ProcessingState>,
}

/// Processing states a build moves through after upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    /// Still being processed
    Processing,
    /// Processing finished but the build failed checks
    Failed,
    /// Build is invalid
    Invalid,
    /// Build is ready
    Valid,
}

/// `preReleaseVersions` resource attributes
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreReleaseVersionAttributes {
    /// Short version string
    #[serde(default)]
    pub version: Option<String>,
    /// API platform enumeration value
    #[serde(default)]
    pub platform: Option<String>,
}

/// `betaBuildLocalizations` resource attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetaBuildLocalizationAttributes {
    /// Release notes shown to testers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whats_new: Option<String>,
    /// Locale tag, e.g. `en-US`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// Error envelope returned on non-2xx responses
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// Individual error entries
    #[serde(default = "Vec::new")]
    pub errors: Vec<ApiError>,
}

/// One entry from the error envelope
#[derive(Debug, Deserialize)]
pub struct ApiError {
    /// HTTP status as a string
    #[serde(default)]
    pub status: Option<String>,
    /// Short error title
    #[serde(default)]
    pub title: Option<String>,
    /// Human-readable detail
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorResponse {
    /// Flatten the entries into one display string.
    pub fn summary(&self) -> String {
        if self.errors.is_empty() {
            return "unknown error".to_string();
        }
        self.errors
            .iter()
            .map(|error| {
                let title = error.title.as_deref().unwrap_or("error");
                match &error.detail {
                    Some(detail) => format!("{title}: {detail}"),
                    None => title.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_collection_parses_processing_state() {
        let json = r#"{
          "data": [
            {
              "type": "builds",
              "id": "abc-123",
              "attributes": {
                "version": "42",
                "processingState": "PROCESSING"
              }
            }
          ]
        }"#;
        let collection: Collection<BuildAttributes> =
            serde_json::from_str(json).expect("parse");
        let build = &collection.data[0];
        assert_eq!(build.id, "abc-123");
        let attributes = build.attributes.as_ref().expect("attributes");
        assert_eq!(attributes.version.as_deref(), Some("42"));
        assert_eq!(
            attributes.processing_state,
            Some(ProcessingState::Processing)
        );
    }

    #[test]
    fn empty_collection_defaults() {
        let collection: Collection<AppAttributes> =
            serde_json::from_str("{}").expect("parse");
        assert!(collection.data.is_empty());
    }

    #[test]
    fn error_summary_joins_entries() {
        let json = r#"{
          "errors": [
            {"status": "409", "title": "STATE_ERROR", "detail": "Build already expired."},
            {"status": "409", "title": "ENTITY_ERROR"}
          ]
        }"#;
        let response: ErrorResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(
            response.summary(),
            "STATE_ERROR: Build already expired.; ENTITY_ERROR"
        );
    }

    #[test]
    fn localization_serializes_camel_case() {
        let attributes = BetaBuildLocalizationAttributes {
            whats_new: Some("Bug fixes".to_string()),
            locale: Some("en-US".to_string()),
        };
        let json = serde_json::to_value(&attributes).expect("serialize");
        assert_eq!(json["whatsNew"], "Bug fixes");
        assert_eq!(json["locale"], "en-US");
    }
}

//! TestFlight metadata updates after upload.
//!
//! Build processing on the service is asynchronous with uncontrollable
//! latency, so the build record is polled at a fixed interval with a
//! bounded attempt count before attaching release notes.

use serde_json::json;

use super::models::{
    BetaBuildLocalizationAttributes, BuildAttributes, Collection, Document,
    PreReleaseVersionAttributes, ProcessingState,
};
use super::{AppStoreConnectClient, PollPolicy, poll_until};
use crate::error::{BuilderError, Result, TestFlightError};
use crate::project::ResolvedProject;

const LOCALE: &str = "en-US";

/// Attach or update the release notes on the just-uploaded build.
///
/// Waits for the build matching `build_number` to finish processing, then
/// creates or patches the English-locale localization record.
pub async fn update_test_details(
    client: &AppStoreConnectClient,
    project: &ResolvedProject,
    build_number: &str,
    whats_new: &str,
    policy: &PollPolicy,
) -> Result<()> {
    let app_id = client.app_id_for_bundle(&project.bundle_id).await?;

    let version = project.marketing_version.as_deref().unwrap_or_default();
    let pre_release_id = pre_release_version_id(client, project, &app_id, version).await?;

    let build_id = wait_for_processing(client, &app_id, &pre_release_id, build_number, policy)
        .await?;
    log::info!("build {build_number} processed, updating release notes");

    set_whats_new(client, &build_id, whats_new).await
}

async fn pre_release_version_id(
    client: &AppStoreConnectClient,
    project: &ResolvedProject,
    app_id: &str,
    version: &str,
) -> Result<String> {
    let platform = project.platform.api_platform().ok_or_else(|| {
        BuilderError::TestFlight(TestFlightError::NoPreReleaseVersion {
            platform: project.platform.display_name().to_string(),
            version: version.to_string(),
        })
    })?;

    let collection: Collection<PreReleaseVersionAttributes> = client
        .get(
            "/v1/preReleaseVersions",
            &[
                ("filter[app]", app_id.to_string()),
                ("filter[version]", version.to_string()),
                ("filter[platform]", platform.to_string()),
            ],
        )
        .await?;

    collection
        .data
        .first()
        .map(|record| record.id.clone())
        .ok_or_else(|| {
            BuilderError::TestFlight(TestFlightError::NoPreReleaseVersion {
                platform: project.platform.display_name().to_string(),
                version: version.to_string(),
            })
        })
}

/// Poll until the build reaches a terminal processing state.
async fn wait_for_processing(
    client: &AppStoreConnectClient,
    app_id: &str,
    pre_release_id: &str,
    build_number: &str,
    policy: &PollPolicy,
) -> Result<String> {
    let found = poll_until(policy, move || async move {
        let collection: Collection<BuildAttributes> = client
            .get(
                "/v1/builds",
                &[
                    ("filter[app]", app_id.to_string()),
                    ("filter[preReleaseVersion]", pre_release_id.to_string()),
                    ("filter[version]", build_number.to_string()),
                ],
            )
            .await?;

        let Some(build) = collection.data.first() else {
            log::debug!("build {build_number} not visible yet");
            return Ok(None);
        };
        let state = build
            .attributes
            .as_ref()
            .and_then(|attributes| attributes.processing_state);
        match state {
            Some(ProcessingState::Valid) => Ok(Some(Ok(build.id.clone()))),
            Some(state @ (ProcessingState::Failed | ProcessingState::Invalid)) => {
                Ok(Some(Err(format!("{state:?}"))))
            }
            _ => {
                log::debug!("build {build_number} still processing");
                Ok(None)
            }
        }
    })
    .await?;

    match found {
        Some(Ok(build_id)) => Ok(build_id),
        Some(Err(state)) => Err(BuilderError::TestFlight(TestFlightError::ProcessingFailed {
            build_number: build_number.to_string(),
            state,
        })),
        None => Err(BuilderError::TestFlight(TestFlightError::ProcessingTimeout {
            build_number: build_number.to_string(),
            attempts: policy.attempts,
        })),
    }
}

/// Create or update the English localization record for the build.
async fn set_whats_new(
    client: &AppStoreConnectClient,
    build_id: &str,
    whats_new: &str,
) -> Result<()> {
    let existing: Collection<BetaBuildLocalizationAttributes> = client
        .get(
            "/v1/betaBuildLocalizations",
            &[
                ("filter[build]", build_id.to_string()),
                ("filter[locale]", LOCALE.to_string()),
            ],
        )
        .await?;

    if let Some(record) = existing.data.first() {
        let body = json!({
            "data": {
                "type": "betaBuildLocalizations",
                "id": record.id,
                "attributes": { "whatsNew": whats_new }
            }
        });
        let _: Document<BetaBuildLocalizationAttributes> = client
            .patch(&format!("/v1/betaBuildLocalizations/{}", record.id), &body)
            .await?;
    } else {
        let body = json!({
            "data": {
                "type": "betaBuildLocalizations",
                "attributes": { "whatsNew": whats_new, "locale": LOCALE },
                "relationships": {
                    "build": { "data": { "type": "builds", "id": build_id } }
                }
            }
        });
        let _: Document<BetaBuildLocalizationAttributes> =
            client.post("/v1/betaBuildLocalizations", &body).await?;
    }
    Ok(())
}

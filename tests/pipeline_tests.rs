#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use xcode_builder::xcode::export_method;
    use xcode_builder::{ExportIntent, Platform, SessionState, StateManager};

    #[test]
    fn test_platform_sdk_round_trip() {
        for sdk in ["iphoneos", "macosx", "appletvos", "watchos", "xros"] {
            let platform = Platform::from_sdk_name(sdk).expect("known sdk");
            assert_eq!(platform.sdk_name(), sdk);
        }
        assert!(Platform::from_sdk_name("linux").is_none());
    }

    #[test]
    fn test_watchos_has_no_direct_upload_type() {
        assert_eq!(Platform::WatchOs.altool_type(), None);
        assert_eq!(Platform::Ios.altool_type(), Some("ios"));
        assert_eq!(Platform::VisionOs.altool_type(), Some("xros"));
    }

    #[test]
    fn test_export_method_depends_on_xcode_release() {
        let old = semver::Version::new(15, 2, 0);
        let new = semver::Version::new(15, 4, 0);
        assert_eq!(
            export_method(ExportIntent::AppStore, Platform::Ios, &old).unwrap(),
            "app-store"
        );
        assert_eq!(
            export_method(ExportIntent::AppStore, Platform::Ios, &new).unwrap(),
            "app-store-connect"
        );
    }

    #[test]
    fn test_session_state_survives_process_boundary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = StateManager::new(dir.path().join("session.json"));

        let mut state = SessionState::new();
        state.keychain_path = Some(dir.path().join("abc.keychain-db"));
        manager.save_state(&state).expect("save");

        let loaded = manager.load_state().expect("load");
        assert_eq!(loaded.session_id, state.session_id);
        assert_eq!(loaded.keychain_path, state.keychain_path);

        manager.cleanup_state().expect("cleanup");
        assert!(!manager.state_exists());
    }

    #[test]
    fn test_cli_help_lists_phases() {
        Command::cargo_bin("xcode_builder")
            .expect("binary")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run").and(predicate::str::contains("post")));
    }

    #[test]
    fn test_run_requires_api_key_inputs() {
        Command::cargo_bin("xcode_builder")
            .expect("binary")
            .arg("run")
            .env_remove("INPUT_APP_STORE_CONNECT_KEY_ID")
            .env_remove("INPUT_APP_STORE_CONNECT_ISSUER_ID")
            .assert()
            .failure()
            .stderr(predicate::str::contains("app-store-connect-key-id"));
    }

    #[test]
    fn test_post_without_state_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        Command::cargo_bin("xcode_builder")
            .expect("binary")
            .arg("post")
            .env("RUNNER_TEMP", dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to clean up"));
    }

    #[test]
    fn test_post_survives_corrupt_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_file = dir.path().join(".xcode_builder_session.json");
        std::fs::write(&state_file, "{not json").expect("write");

        Command::cargo_bin("xcode_builder")
            .expect("binary")
            .arg("post")
            .env("RUNNER_TEMP", dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("skipping cleanup"));

        // The unusable file must not fail the next job's post phase either
        assert!(!state_file.exists());
    }
}

//! # Xcode Builder
//!
//! CI step that builds, signs, exports, validates and uploads Apple platform
//! app bundles through `xcodebuild`, `security`, `altool` and the App Store
//! Connect REST API.
//!
//! The binary runs in two phases matching the CI step lifecycle:
//!
//! - **run**: import signing credentials into an ephemeral keychain, resolve
//!   the Xcode project, archive, export, validate and optionally upload the
//!   build and update TestFlight release notes.
//! - **post**: tear down the keychain and key material recorded by a prior
//!   `run`, using the session state persisted in the runner temp directory.
//!
//! ## Usage
//!
//! ```bash
//! xcode_builder run --export-option app-store --upload true
//! xcode_builder post
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod appstore;
pub mod cli;
pub mod credentials;
pub mod error;
pub mod project;
pub mod state;
pub mod upload;
pub mod xcode;

// Re-export main types for public API
pub use appstore::{AppStoreConnectClient, PollPolicy};
pub use cli::Args;
pub use credentials::{AppleCredential, TokenProvider};
pub use error::{BuilderError, Result};
pub use project::{Platform, ResolvedProject};
pub use state::{SessionState, StateManager};
pub use xcode::{ArchivedProject, ExportIntent, ExportedProject};

//! FA Pod Clone - `FlashArray` pod cloning library.
//!
//! Clones a Pure Storage `FlashArray` pod of NFS file systems to a new pod name:
//! - **Preconditions**: source pod must exist, target pod must not
//! - **Resolution**: source NFS policies, client rules, directory exports and
//!   file systems, each paired with its target-pod name
//! - **Cloning**: pod clone, one policy clone per policy, optional client rule
//!   override, optional re-export under suffixed export names
//! - **Safety lock**: dry run by default, every mutation is only previewed
//!
//! ## Quick Start
//!
//! Connection settings come from a JSON config file, with environment
//! fallbacks (`FA_HOST`, `API_TOKEN`):
//!
//! ```text
//! {
//!   "flash_array_host": "array01.example.com",
//!   "flash_array_api_token": "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"
//! }
//! ```
//!
//! ```ignore
//! use fa_pod_clone::{CloneRequest, ExecutionMode, FlashArrayClient, PodCloneConfig, PodCloner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = PodCloneConfig::load("export_rules.json".as_ref())?;
//!     let array = FlashArrayClient::connect(cfg.client_config()).await?;
//!
//!     let request = CloneRequest {
//!         source_pod: "gct-pod-ora-swingdb".into(),
//!         target_pod: "gct-pod-tmp".into(),
//!         export_suffix: Some("-tmp".into()),
//!         mode: ExecutionMode::DryRun,
//!         rule_override: cfg.rules.clone(),
//!     };
//!
//!     let report = PodCloner::new(&array, request).run().await?;
//!     for export in &report.exports {
//!         println!("{} -> {}", export.source_export, export.target_export);
//!     }
//!     Ok(())
//! }
//! ```

// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Modules
// ============================================================================

/// `FlashArray` REST session and resource calls.
///
/// Use this module to connect to an array and for the [`ArrayApi`] seam.
pub mod flasharray_client;

/// Config file and environment resolution.
pub mod flasharray_config;

/// Source-to-target name rewriting.
pub mod pod_naming;

/// The pod clone workflow.
///
/// Use this module to run a clone (or its dry run) over an open session.
pub mod pod_cloner;

/// Command line arguments of the `fa_pod_cp` binary.
pub mod cli;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use cli::Cli;
pub use flasharray_client::{ArrayApi, ArrayError, FlashArrayClient, FlashArrayClientConfig};
pub use flasharray_config::{ConfigError, PodCloneConfig};
pub use pod_cloner::{
    CloneError, CloneReport, CloneRequest, ExecutionMode, ExportMapping, PodCloner,
    RuleRewriteOutcome,
};
pub use pod_naming::{NamePair, derive_target_name};

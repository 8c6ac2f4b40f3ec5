//! Command line interface.

use std::path::PathBuf;

use clap::{Parser, builder::NonEmptyStringValueParser};

use crate::pod_cloner::{CloneRequest, ExecutionMode};
use crate::pod_naming::sanitize_export_suffix;

/// Clone a pod of NFS file system(s) on a Pure Flash Array.
#[derive(Debug, Clone, Parser)]
#[command(name = "fa_pod_cp", version, about, long_about = None)]
pub struct Cli {
    /// Name of the source pod.
    #[arg(short = 's', long = "source_pod", alias = "source-pod", value_parser = NonEmptyStringValueParser::new())]
    pub source_pod: String,

    /// Name of the target pod to be created.
    #[arg(short = 't', long = "target_pod", alias = "target-pod", value_parser = NonEmptyStringValueParser::new())]
    pub target_pod: String,

    /// Suffix to append to cloned file system exports.
    #[arg(short = 'e', long = "export_suffix", alias = "export-suffix")]
    pub export_suffix: Option<String>,

    /// JSON document of config options.
    #[arg(short = 'f', long = "config_file", alias = "config-file")]
    pub config_file: PathBuf,

    /// Actually clone the pod (default is safety lock on).
    #[arg(short = 'x', long = "execute_lock", alias = "execute-lock")]
    pub execute_lock: bool,
}

impl Cli {
    /// Safety lock state selected on the command line.
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        if self.execute_lock {
            ExecutionMode::Execute
        } else {
            ExecutionMode::DryRun
        }
    }

    /// Build the clone request, attaching the configured rule override.
    #[must_use]
    pub fn clone_request(&self, rule_override: Option<serde_json::Value>) -> CloneRequest {
        CloneRequest {
            source_pod: self.source_pod.clone(),
            target_pod: self.target_pod.clone(),
            export_suffix: self.export_suffix.as_deref().and_then(sanitize_export_suffix),
            mode: self.mode(),
            rule_override,
        }
    }
}

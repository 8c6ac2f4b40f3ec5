//! Pod clone orchestration.
//!
//! Unique responsibility: drive the ordered sequence of array calls that
//! clones a pod of NFS file systems under a new name.
//!
//! Stages, in order (each feeds the next, any of them may halt the run):
//! 1. Check the source pod exists and the target pod does not
//! 2. Resolve the source pod's NFS policies and their target names
//! 3. Count the client rules attached to those policies
//! 4. (suffix only) Check no target export name is already taken
//! 5. Resolve the source pod's file systems and their target names
//! 6. Clone the pod (execute mode only)
//! 7. Clone each policy, one call per policy
//! 8. (execute mode + rule override only) Replace inherited client rules
//! 9. (suffix only) Export the cloned directories under the new names
//!
//! With the safety lock engaged ([`ExecutionMode::DryRun`]) every read runs
//! and every mapping is reported, but no mutating call is issued.
//!
//! There is no rollback: a failure after the pod clone leaves the target pod
//! partially populated and it has to be destroyed by hand before retrying.

use std::fmt;

use tracing::{error, info, warn};

use crate::flasharray_client::{
    ArrayApi, ArrayError, DirectoryExportPost, NfsClientRule, PodClonePost, Reference,
};
use crate::flasharray_config::ConfigError;
use crate::pod_naming::{
    NamePair, derive_target_name, source_names, target_export_name, target_names,
};

/// Path exported on every cloned directory.
pub const EXPORT_ROOT_PATH: &str = "/";

/// Whether mutating calls are issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Safety lock engaged: only read and preview.
    #[default]
    DryRun,
    /// Safety lock disengaged: clone for real.
    Execute,
}

impl ExecutionMode {
    /// Whether the safety lock is engaged.
    #[must_use]
    pub const fn is_dry_run(self) -> bool {
        matches!(self, Self::DryRun)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => f.write_str("dry-run"),
            Self::Execute => f.write_str("execute"),
        }
    }
}

/// What to clone and how.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    /// Existing pod to clone.
    pub source_pod: String,
    /// Name of the pod to create.
    pub target_pod: String,
    /// Suffix appended to cloned export names; `None` skips exporting.
    pub export_suffix: Option<String>,
    /// Safety lock state.
    pub mode: ExecutionMode,
    /// Client rule set replacing the rules the cloned policies inherit.
    pub rule_override: Option<serde_json::Value>,
}

/// One directory export and the export its clone gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportMapping {
    /// Existing export name.
    pub source_export: String,
    /// Export name of the clone.
    pub target_export: String,
    /// Directory the clone exports.
    pub target_directory: String,
    /// Policy the clone is exported under.
    pub target_policy: String,
}

/// Where an already existing export lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLocation {
    /// Policy governing the existing export.
    pub policy: String,
    /// Directory of the existing export.
    pub directory: String,
}

/// Result of replacing one inherited client rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleRewriteOutcome {
    /// Rule deleted and the override set added in its place.
    Replaced {
        /// Rule that was deleted.
        rule: String,
        /// Policy it belonged to.
        policy: String,
    },
    /// Rule left untouched, or removed without a replacement.
    NotChanged {
        /// Rule that was processed.
        rule: String,
        /// Policy it belongs to.
        policy: String,
        /// Why the rewrite did not complete.
        reason: String,
    },
}

impl RuleRewriteOutcome {
    /// Whether the rule was replaced.
    #[must_use]
    pub const fn is_replaced(&self) -> bool {
        matches!(self, Self::Replaced { .. })
    }
}

/// Everything a clone run resolved and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneReport {
    /// Safety lock state of the run.
    pub mode: ExecutionMode,
    /// Source pod name.
    pub source_pod: String,
    /// Target pod name.
    pub target_pod: String,
    /// Whether the pod clone request was issued and accepted.
    pub pod_cloned: bool,
    /// Source policies and the names of their clones, in array order.
    pub policies: Vec<NamePair>,
    /// Number of client rules attached to the source policies.
    pub inherited_rule_count: usize,
    /// Number of exports checked for name collisions.
    pub exports_checked: usize,
    /// Source file systems and the names of their clones, in array order.
    pub file_systems: Vec<NamePair>,
    /// Policy clones issued (execute mode) or previewed (dry run).
    pub policies_cloned: usize,
    /// Per-rule results of the rule override.
    pub rule_rewrites: Vec<RuleRewriteOutcome>,
    /// Export mappings, identical in dry run and execute mode.
    pub exports: Vec<ExportMapping>,
}

/// Drives one pod clone against an array.
pub struct PodCloner<'a, A: ArrayApi> {
    api: &'a A,
    request: CloneRequest,
}

impl<'a, A: ArrayApi> PodCloner<'a, A> {
    /// Create a cloner for `request` over an open array session.
    #[must_use]
    pub const fn new(api: &'a A, request: CloneRequest) -> Self {
        Self { api, request }
    }

    /// Run every stage in order.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; stages after it do not run.
    pub async fn run(&self) -> Result<CloneReport, CloneError> {
        let req = &self.request;
        info!(
            source_pod = %req.source_pod,
            target_pod = %req.target_pod,
            mode = %req.mode,
            "cloning pod {} to {}",
            req.source_pod,
            req.target_pod
        );

        let mut report = CloneReport {
            mode: req.mode,
            source_pod: req.source_pod.clone(),
            target_pod: req.target_pod.clone(),
            ..CloneReport::default()
        };

        info!("checking for existence of source-pod and non-existence of target-pod");
        self.check_pods().await?;

        info!("determining relevant policies for {}", req.source_pod);
        report.policies = self.resolve_policies().await?;

        info!("determining client rules for NFS policies for {}", req.source_pod);
        report.inherited_rule_count = self.count_client_rules(&report.policies).await;

        if let Some(suffix) = req.export_suffix.as_deref() {
            info!("checking that target export directories can be created");
            report.exports_checked = self.check_export_collisions(suffix, &report.policies).await?;
        }

        info!("determining file systems for {}", req.source_pod);
        report.file_systems = self.resolve_file_systems().await?;

        report.pod_cloned = self.clone_pod().await?;

        info!("cloning policies for {}", req.target_pod);
        report.policies_cloned = self.clone_policies(&report.policies).await?;

        report.rule_rewrites = self.apply_rule_override(&report.policies).await?;

        if let Some(suffix) = req.export_suffix.as_deref() {
            report.exports = self.apply_exports(suffix, &report.policies).await?;
        } else {
            info!("no export suffix specified so cloned file systems will not be exported");
        }

        info!("pod cloning complete");
        Ok(report)
    }

    /// Confirm the source pod exists and the target pod does not.
    ///
    /// # Errors
    ///
    /// Fails as soon as the target pod is seen, or after the full scan when
    /// the source pod was not found.
    pub async fn check_pods(&self) -> Result<(), CloneError> {
        let req = &self.request;
        let pods = self
            .api
            .list_pods()
            .await
            .map_err(CloneError::array("listing pods"))?;

        let mut source_found = false;
        for pod in &pods {
            if pod.name == req.source_pod {
                source_found = true;
            }
            if pod.name == req.target_pod {
                return Err(CloneError::TargetPodExists(req.target_pod.clone()));
            }
        }

        if !source_found {
            return Err(CloneError::SourcePodMissing(req.source_pod.clone()));
        }

        info!(pods = pods.len(), "source pod found, target pod name is free");
        Ok(())
    }

    /// NFS policies of the source pod paired with their target names.
    ///
    /// # Errors
    ///
    /// Fails when the policy listing fails. An empty result is only a warning.
    pub async fn resolve_policies(&self) -> Result<Vec<NamePair>, CloneError> {
        let req = &self.request;
        let policies = self
            .api
            .list_nfs_policies()
            .await
            .map_err(CloneError::array("listing NFS policies"))?;

        let pairs: Vec<NamePair> = policies
            .into_iter()
            .filter(|p| p.pod_name() == req.source_pod)
            .map(|p| NamePair::derive(p.name, &req.source_pod, &req.target_pod))
            .inspect(|pair| info!("policy {}", pair.source))
            .collect();

        if pairs.is_empty() {
            warn!("source pod does not appear to have any policies");
        }
        info!("number of policies found:{}", pairs.len());

        Ok(pairs)
    }

    /// Count the client rules of each source policy.
    ///
    /// Lookup failures are logged per policy and do not stop the count.
    pub async fn count_client_rules(&self, policies: &[NamePair]) -> usize {
        let mut total = 0usize;

        for pair in policies {
            info!("rules for policy:{}", pair.source);
            match self
                .api
                .list_nfs_client_rules(std::slice::from_ref(&pair.source))
                .await
            {
                Ok(rules) => total = total.saturating_add(rules.len()),
                Err(e) => warn!(error = %e, "no rules found for:{}", pair.source),
            }
        }

        info!("{total} rule(s) found");
        total
    }

    /// Check no `<export><suffix>` name is taken anywhere on the array.
    ///
    /// Returns the number of exports checked.
    ///
    /// # Errors
    ///
    /// Fails on the first collision, in export listing order, or when a
    /// lookup cannot reach the array.
    pub async fn check_export_collisions(
        &self,
        suffix: &str,
        policies: &[NamePair],
    ) -> Result<usize, CloneError> {
        // An empty policy filter would match every export on the array.
        if policies.is_empty() {
            return Ok(0);
        }

        let exports = self
            .api
            .list_directory_exports(&source_names(policies))
            .await
            .map_err(CloneError::array("listing directory exports"))?;

        for export in &exports {
            let target = target_export_name(&export.export_name, suffix);

            let existing = match self.api.find_directory_exports(&target).await {
                Ok(found) => found,
                // The array rejects lookups of unknown export names.
                Err(e) if e.is_api() => Vec::new(),
                Err(e) => {
                    return Err(CloneError::Array {
                        context: format!("looking up directory export {target}"),
                        source: e,
                    });
                }
            };

            if !existing.is_empty() {
                error!("cannot create target export directory:{target}");
                let locations: Vec<ExportLocation> = existing
                    .into_iter()
                    .map(|e| ExportLocation {
                        policy: e.policy.name,
                        directory: e.directory.name,
                    })
                    .inspect(|loc| {
                        error!(
                            "directory already exists for policy:{} directory:{}",
                            loc.policy, loc.directory
                        );
                    })
                    .collect();
                return Err(CloneError::ExportCollision {
                    export_name: target,
                    existing: locations,
                });
            }
        }

        info!(exports = exports.len(), "target export names are available");
        Ok(exports.len())
    }

    /// File systems of the source pod paired with their target names.
    ///
    /// File systems outside any pod, and destroyed ones awaiting
    /// eradication, are skipped.
    ///
    /// # Errors
    ///
    /// Fails when the file system listing fails. An empty result is only a warning.
    pub async fn resolve_file_systems(&self) -> Result<Vec<NamePair>, CloneError> {
        let req = &self.request;
        let file_systems = self
            .api
            .list_file_systems()
            .await
            .map_err(CloneError::array("listing file systems"))?;

        let pairs: Vec<NamePair> = file_systems
            .into_iter()
            .filter(|fs| !fs.destroyed && fs.pod_name() == Some(req.source_pod.as_str()))
            .map(|fs| NamePair::derive(fs.name, &req.source_pod, &req.target_pod))
            .inspect(|pair| info!("file system {}", pair.source))
            .collect();

        if pairs.is_empty() {
            warn!("source pod does not appear to have any NFS file systems");
        }
        info!("number of source pod file systems found:{}", pairs.len());

        Ok(pairs)
    }

    /// Create the target pod as a clone of the source pod.
    ///
    /// Returns whether the clone was issued; the dry run only logs.
    ///
    /// # Errors
    ///
    /// Fails when the array rejects the pod creation.
    pub async fn clone_pod(&self) -> Result<bool, CloneError> {
        let req = &self.request;
        info!("cloning pod {} to {}", req.source_pod, req.target_pod);

        if req.mode.is_dry_run() {
            warn!("NOTE: safety lock is engaged, so no actual pod clone will be executed");
            warn!("NOTE: to disable add -x to arguments");
            return Ok(false);
        }

        let body = PodClonePost::promoted_clone_of(&req.source_pod);
        self.api
            .create_pod(&req.target_pod, &body)
            .await
            .map_err(|e| CloneError::Array {
                context: format!("cloning pod {} to {}", req.source_pod, req.target_pod),
                source: e,
            })?;

        info!("pod {} created", req.target_pod);
        Ok(true)
    }

    /// Clone every source policy under its target name, one call each.
    ///
    /// Returns the number of policies cloned or previewed.
    ///
    /// # Errors
    ///
    /// Halts on the first rejected clone; policies cloned before it stay.
    pub async fn clone_policies(&self, policies: &[NamePair]) -> Result<usize, CloneError> {
        for pair in policies {
            if self.request.mode.is_dry_run() {
                warn!("NOTE: would clone policy {} as {}", pair.source, pair.target);
                continue;
            }

            info!("cloning policy {} as {}", pair.source, pair.target);
            self.api
                .clone_nfs_policy(&pair.source, &pair.target)
                .await
                .map_err(|e| CloneError::Array {
                    context: format!("cloning policy {pair}"),
                    source: e,
                })?;
        }

        Ok(policies.len())
    }

    /// Replace the inherited client rules of the cloned policies.
    ///
    /// Skipped in dry run and when no override rule set is configured.
    ///
    /// # Errors
    ///
    /// Fails only when the rules of the target policies cannot be listed;
    /// per-rule failures are reported as [`RuleRewriteOutcome::NotChanged`].
    pub async fn apply_rule_override(
        &self,
        policies: &[NamePair],
    ) -> Result<Vec<RuleRewriteOutcome>, CloneError> {
        let req = &self.request;

        if req.mode.is_dry_run() {
            info!("safety lock engaged, since no clone was made there are no policies to modify");
            return Ok(Vec::new());
        }
        let Some(rules) = req.rule_override.as_ref() else {
            info!("rule override not specified, NFS export rules will be copied as-is");
            return Ok(Vec::new());
        };

        info!("changing NFS export policy rules for {}", req.target_pod);
        self.rewrite_rules(rules, &target_names(policies)).await
    }

    async fn rewrite_rules(
        &self,
        rules: &serde_json::Value,
        target_policies: &[String],
    ) -> Result<Vec<RuleRewriteOutcome>, CloneError> {
        if target_policies.is_empty() {
            return Ok(Vec::new());
        }

        let inherited = self
            .api
            .list_nfs_client_rules(target_policies)
            .await
            .map_err(CloneError::array("listing client rules of the cloned policies"))?;

        let mut outcomes = Vec::with_capacity(inherited.len());
        for rule in inherited {
            outcomes.push(self.replace_rule(rules, rule).await);
        }

        let not_changed: Vec<&RuleRewriteOutcome> =
            outcomes.iter().filter(|o| !o.is_replaced()).collect();
        for outcome in &not_changed {
            if let RuleRewriteOutcome::NotChanged {
                rule,
                policy,
                reason,
            } = outcome
            {
                error!("NOTE: rule {rule} of policy {policy} not changed: {reason}");
            }
        }
        info!(
            replaced = outcomes.len().saturating_sub(not_changed.len()),
            not_changed = not_changed.len(),
            "client rule override applied"
        );

        Ok(outcomes)
    }

    async fn replace_rule(
        &self,
        rules: &serde_json::Value,
        inherited: NfsClientRule,
    ) -> RuleRewriteOutcome {
        let NfsClientRule {
            name: rule,
            policy: Reference { name: policy },
            client,
        } = inherited;

        info!(
            client = client.as_deref().unwrap_or("*"),
            "deleting rule:{rule} for policy:{policy}"
        );
        if let Err(e) = self.api.delete_nfs_client_rule(&rule, &policy).await {
            return RuleRewriteOutcome::NotChanged {
                rule,
                policy,
                reason: format!("delete failed: {e}"),
            };
        }

        info!("adding new rule for policy:{policy}");
        if let Err(e) = self.api.create_nfs_client_rules(&policy, rules).await {
            return RuleRewriteOutcome::NotChanged {
                rule,
                policy,
                reason: format!("rule was deleted but the replacement was rejected: {e}"),
            };
        }

        RuleRewriteOutcome::Replaced { rule, policy }
    }

    /// Export the cloned directories under suffixed export names.
    ///
    /// The dry run computes and logs the same mappings without creating them.
    ///
    /// # Errors
    ///
    /// Fails when the exports cannot be listed or an export creation is rejected.
    pub async fn apply_exports(
        &self,
        suffix: &str,
        policies: &[NamePair],
    ) -> Result<Vec<ExportMapping>, CloneError> {
        let req = &self.request;
        info!("getting directory exports for {}", req.source_pod);
        if policies.is_empty() {
            return Ok(Vec::new());
        }

        let exports = self
            .api
            .list_directory_exports(&source_names(policies))
            .await
            .map_err(CloneError::array("listing directory exports"))?;

        let mut mappings = Vec::with_capacity(exports.len());
        for export in exports {
            let mapping = ExportMapping {
                target_export: target_export_name(&export.export_name, suffix),
                target_directory: derive_target_name(
                    &export.directory.name,
                    &req.source_pod,
                    &req.target_pod,
                ),
                target_policy: derive_target_name(
                    &export.policy.name,
                    &req.source_pod,
                    &req.target_pod,
                ),
                source_export: export.export_name,
            };

            if req.mode.is_dry_run() {
                warn!(
                    "NOTE: clone of {} would be exported as {}",
                    mapping.source_export, mapping.target_export
                );
            } else {
                let body = DirectoryExportPost {
                    export_name: mapping.target_export.clone(),
                    path: EXPORT_ROOT_PATH.to_string(),
                };
                self.api
                    .create_directory_export(
                        &mapping.target_directory,
                        &mapping.target_policy,
                        &body,
                    )
                    .await
                    .map_err(|e| CloneError::Array {
                        context: format!("exporting {}", mapping.target_directory),
                        source: e,
                    })?;
                info!(
                    "clone of {} exported as {}",
                    mapping.source_export, mapping.target_export
                );
            }

            mappings.push(mapping);
        }

        Ok(mappings)
    }
}

// ============================================================================
// Error type
// ============================================================================

/// Fatal conditions that halt a clone run.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    /// Configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The array session could not be opened.
    #[error("connection to Flash Array {host} failed, please check Flash Array connectivity and API token: {source}")]
    Connect {
        /// Array address.
        host: String,
        /// Underlying failure.
        #[source]
        source: ArrayError,
    },

    /// A remote call failed.
    #[error("{context}: {source}")]
    Array {
        /// What was being done.
        context: String,
        /// Underlying failure.
        #[source]
        source: ArrayError,
    },

    /// The target pod name is already in use.
    #[error("target pod {0} exists, please destroy and eradicate the target, or choose a different target pod name")]
    TargetPodExists(String),

    /// The source pod is not on the array.
    #[error("source pod {0} was not found on this Flash Array")]
    SourcePodMissing(String),

    /// A cloned export name is already taken.
    #[error("cannot create target export directory:{export_name}, select an alternative export suffix")]
    ExportCollision {
        /// Export name that already exists.
        export_name: String,
        /// Where the existing exports live.
        existing: Vec<ExportLocation>,
    },
}

impl CloneError {
    /// Adapter wrapping an [`ArrayError`] with a fixed context.
    fn array(context: &'static str) -> impl FnOnce(ArrayError) -> Self {
        move |source| Self::Array {
            context: context.to_string(),
            source,
        }
    }

    /// HTTP status of the failed call, when the array answered.
    #[must_use]
    pub const fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Connect { source, .. } | Self::Array { source, .. } => source.status(),
            _ => None,
        }
    }
}

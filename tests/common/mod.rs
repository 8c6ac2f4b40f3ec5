//! In-memory `FlashArray` used by the scenario tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use fa_pod_clone::flasharray_client::{
    ArrayApi, ArrayError, DirectoryExport, DirectoryExportPost, FileSystem, NfsClientRule,
    NfsPolicy, Pod, PodClonePost, Reference, Volume,
};
use fa_pod_clone::{CloneRequest, ExecutionMode};
use reqwest::StatusCode;

/// Every call the fake received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListVolumes,
    ListPods,
    CreatePod { target: String, body: PodClonePost },
    ListPolicies,
    ClonePolicy { source: String, target: String },
    ListRules(Vec<String>),
    DeleteRule { rule: String, policy: String },
    CreateRules { policy: String },
    ListExports(Vec<String>),
    FindExport(String),
    CreateExport {
        directory: String,
        policy: String,
        export_name: String,
        path: String,
    },
    ListFileSystems,
}

impl Call {
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreatePod { .. }
                | Self::ClonePolicy { .. }
                | Self::DeleteRule { .. }
                | Self::CreateRules { .. }
                | Self::CreateExport { .. }
        )
    }

    pub const fn is_export_related(&self) -> bool {
        matches!(
            self,
            Self::ListExports(_) | Self::FindExport(_) | Self::CreateExport { .. }
        )
    }
}

#[derive(Debug, Default)]
struct State {
    pods: Vec<String>,
    policies: Vec<NfsPolicy>,
    rules: Vec<NfsClientRule>,
    exports: Vec<DirectoryExport>,
    file_systems: Vec<FileSystem>,
    calls: Vec<Call>,
    next_rule_id: usize,
}

/// Failures the fake injects.
#[derive(Debug, Default)]
pub struct Faults {
    /// Policy names whose rule listing answers 404.
    pub rule_lookup: HashSet<String>,
    /// Target policy names whose clone is rejected.
    pub policy_clone: HashSet<String>,
    /// Rule names whose deletion is rejected.
    pub rule_delete: HashSet<String>,
    /// Export lookups fail at the transport level.
    pub export_lookup_transport: bool,
    /// Pod creation is rejected.
    pub pod_create: bool,
    /// Target policy names that reject new client rules.
    pub rule_create: HashSet<String>,
    /// Export names whose creation is rejected.
    pub export_create: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct FakeArray {
    state: Mutex<State>,
    pub faults: Faults,
}

fn reference(name: &str) -> Reference {
    Reference::new(name)
}

fn pod_of(name: &str) -> Option<Reference> {
    name.split_once("::").map(|(pod, _)| reference(pod))
}

fn rejected(message: &str) -> ArrayError {
    ArrayError::Api {
        status: StatusCode::BAD_REQUEST,
        message: message.to_string(),
    }
}

impl FakeArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(self, name: &str) -> Self {
        self.state.lock().unwrap().pods.push(name.to_string());
        self
    }

    /// Add a policy; pod membership comes from a `pod::` prefix.
    pub fn with_policy(self, name: &str) -> Self {
        self.state.lock().unwrap().policies.push(NfsPolicy {
            name: name.to_string(),
            pod: pod_of(name),
        });
        self
    }

    pub fn with_rule(self, policy: &str, client: &str) -> Self {
        {
            let mut st = self.state.lock().unwrap();
            st.next_rule_id += 1;
            let name = format!("rule{}", st.next_rule_id);
            st.rules.push(NfsClientRule {
                name,
                policy: reference(policy),
                client: Some(client.to_string()),
            });
        }
        self
    }

    pub fn with_file_system(self, name: &str) -> Self {
        self.state.lock().unwrap().file_systems.push(FileSystem {
            name: name.to_string(),
            pod: pod_of(name),
            destroyed: false,
        });
        self
    }

    /// Add a file system that is destroyed but not yet eradicated.
    pub fn with_destroyed_file_system(self, name: &str) -> Self {
        self.state.lock().unwrap().file_systems.push(FileSystem {
            name: name.to_string(),
            pod: pod_of(name),
            destroyed: true,
        });
        self
    }

    pub fn with_export(self, export_name: &str, policy: &str, directory: &str) -> Self {
        self.state.lock().unwrap().exports.push(DirectoryExport {
            export_name: export_name.to_string(),
            policy: reference(policy),
            directory: reference(directory),
        });
        self
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn pods(&self) -> Vec<String> {
        self.state.lock().unwrap().pods.clone()
    }

    pub fn policy_names(&self) -> Vec<String> {
        let st = self.state.lock().unwrap();
        st.policies.iter().map(|p| p.name.clone()).collect()
    }

    /// Client match of every rule on `policy`.
    pub fn rule_clients(&self, policy: &str) -> HashSet<String> {
        let st = self.state.lock().unwrap();
        st.rules
            .iter()
            .filter(|r| r.policy.name == policy)
            .filter_map(|r| r.client.clone())
            .collect()
    }

    pub fn exports(&self) -> Vec<DirectoryExport> {
        self.state.lock().unwrap().exports.clone()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ArrayApi for FakeArray {
    async fn list_volumes(&self) -> Result<Vec<Volume>, ArrayError> {
        self.record(Call::ListVolumes);
        Ok(vec![Volume {
            name: "vol1".to_string(),
        }])
    }

    async fn list_pods(&self) -> Result<Vec<Pod>, ArrayError> {
        self.record(Call::ListPods);
        let st = self.state.lock().unwrap();
        Ok(st
            .pods
            .iter()
            .map(|name| Pod { name: name.clone() })
            .collect())
    }

    async fn create_pod(&self, target_pod: &str, pod: &PodClonePost) -> Result<(), ArrayError> {
        self.record(Call::CreatePod {
            target: target_pod.to_string(),
            body: pod.clone(),
        });
        if self.faults.pod_create {
            return Err(rejected("pod creation rejected"));
        }

        let mut st = self.state.lock().unwrap();
        if st.pods.iter().any(|p| p == target_pod) {
            return Err(rejected("Pod already exists."));
        }
        st.pods.push(target_pod.to_string());

        // A pod clone carries copies of the source file systems.
        let prefix = format!("{}::", pod.source.name);
        let clones: Vec<FileSystem> = st
            .file_systems
            .iter()
            .filter(|fs| fs.name.starts_with(&prefix))
            .map(|fs| FileSystem {
                name: fs.name.replacen(&pod.source.name, target_pod, 1),
                pod: Some(reference(target_pod)),
                destroyed: fs.destroyed,
            })
            .collect();
        st.file_systems.extend(clones);
        Ok(())
    }

    async fn list_nfs_policies(&self) -> Result<Vec<NfsPolicy>, ArrayError> {
        self.record(Call::ListPolicies);
        Ok(self.state.lock().unwrap().policies.clone())
    }

    async fn clone_nfs_policy(&self, source: &str, target: &str) -> Result<(), ArrayError> {
        self.record(Call::ClonePolicy {
            source: source.to_string(),
            target: target.to_string(),
        });
        if self.faults.policy_clone.contains(target) {
            return Err(rejected("policy clone rejected"));
        }

        let mut st = self.state.lock().unwrap();
        if !st.policies.iter().any(|p| p.name == source) {
            return Err(rejected("Source policy does not exist."));
        }
        st.policies.push(NfsPolicy {
            name: target.to_string(),
            pod: pod_of(target),
        });

        // Cloned policies inherit the source rules under the same rule names.
        let inherited: Vec<NfsClientRule> = st
            .rules
            .iter()
            .filter(|r| r.policy.name == source)
            .map(|r| NfsClientRule {
                policy: reference(target),
                ..r.clone()
            })
            .collect();
        st.rules.extend(inherited);
        Ok(())
    }

    async fn list_nfs_client_rules(
        &self,
        policy_names: &[String],
    ) -> Result<Vec<NfsClientRule>, ArrayError> {
        self.record(Call::ListRules(policy_names.to_vec()));
        if policy_names.iter().any(|p| self.faults.rule_lookup.contains(p)) {
            return Err(ArrayError::Api {
                status: StatusCode::NOT_FOUND,
                message: "Policy not found.".to_string(),
            });
        }
        let st = self.state.lock().unwrap();
        Ok(st
            .rules
            .iter()
            .filter(|r| policy_names.contains(&r.policy.name))
            .cloned()
            .collect())
    }

    async fn delete_nfs_client_rule(
        &self,
        rule_name: &str,
        policy_name: &str,
    ) -> Result<(), ArrayError> {
        self.record(Call::DeleteRule {
            rule: rule_name.to_string(),
            policy: policy_name.to_string(),
        });
        if self.faults.rule_delete.contains(rule_name) {
            return Err(rejected("rule deletion rejected"));
        }
        let mut st = self.state.lock().unwrap();
        st.rules
            .retain(|r| !(r.name == rule_name && r.policy.name == policy_name));
        Ok(())
    }

    async fn create_nfs_client_rules(
        &self,
        policy_name: &str,
        rules: &serde_json::Value,
    ) -> Result<(), ArrayError> {
        self.record(Call::CreateRules {
            policy: policy_name.to_string(),
        });
        if self.faults.rule_create.contains(policy_name) {
            return Err(rejected("Invalid client rule."));
        }
        let Some(entries) = rules.as_array() else {
            return Err(rejected("rules must be a list"));
        };

        let mut st = self.state.lock().unwrap();
        for entry in entries {
            let client = entry
                .get("client")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("*")
                .to_string();
            // The array rejects a duplicate client on one policy.
            let duplicate = st.rules.iter().any(|r| {
                r.policy.name == policy_name && r.client.as_deref() == Some(client.as_str())
            });
            if duplicate {
                continue;
            }
            st.next_rule_id += 1;
            let name = format!("rule{}", st.next_rule_id);
            st.rules.push(NfsClientRule {
                name,
                policy: reference(policy_name),
                client: Some(client),
            });
        }
        Ok(())
    }

    async fn list_directory_exports(
        &self,
        policy_names: &[String],
    ) -> Result<Vec<DirectoryExport>, ArrayError> {
        self.record(Call::ListExports(policy_names.to_vec()));
        let st = self.state.lock().unwrap();
        Ok(st
            .exports
            .iter()
            .filter(|e| policy_names.contains(&e.policy.name))
            .cloned()
            .collect())
    }

    async fn find_directory_exports(
        &self,
        export_name: &str,
    ) -> Result<Vec<DirectoryExport>, ArrayError> {
        self.record(Call::FindExport(export_name.to_string()));
        if self.faults.export_lookup_transport {
            return Err(ArrayError::Encode("connection reset by peer".to_string()));
        }
        let st = self.state.lock().unwrap();
        let found: Vec<DirectoryExport> = st
            .exports
            .iter()
            .filter(|e| e.export_name == export_name)
            .cloned()
            .collect();
        if found.is_empty() {
            return Err(rejected("Export does not exist."));
        }
        Ok(found)
    }

    async fn create_directory_export(
        &self,
        directory_name: &str,
        policy_name: &str,
        export: &DirectoryExportPost,
    ) -> Result<(), ArrayError> {
        self.record(Call::CreateExport {
            directory: directory_name.to_string(),
            policy: policy_name.to_string(),
            export_name: export.export_name.clone(),
            path: export.path.clone(),
        });
        if self.faults.export_create.contains(&export.export_name) {
            return Err(rejected("Directory export rejected."));
        }
        let mut st = self.state.lock().unwrap();
        if st.exports.iter().any(|e| e.export_name == export.export_name) {
            return Err(rejected("Export name already in use."));
        }
        st.exports.push(DirectoryExport {
            export_name: export.export_name.clone(),
            policy: reference(policy_name),
            directory: reference(directory_name),
        });
        Ok(())
    }

    async fn list_file_systems(&self) -> Result<Vec<FileSystem>, ArrayError> {
        self.record(Call::ListFileSystems);
        Ok(self.state.lock().unwrap().file_systems.clone())
    }
}

/// Request cloning `source` to `target`.
pub fn request(
    source: &str,
    target: &str,
    suffix: Option<&str>,
    mode: ExecutionMode,
) -> CloneRequest {
    CloneRequest {
        source_pod: source.to_string(),
        target_pod: target.to_string(),
        export_suffix: suffix.map(str::to_string),
        mode,
        rule_override: None,
    }
}

/// Source pod `podA` with one policy, one file system and one export.
pub fn pod_a() -> FakeArray {
    FakeArray::new()
        .with_pod("podA")
        .with_pod("other")
        .with_policy("podA::policy1")
        .with_policy("other::policy1")
        .with_rule("podA::policy1", "10.0.0.0/24")
        .with_rule("podA::policy1", "db-hosts")
        .with_file_system("podA::fs1")
        .with_file_system("other::fs9")
        .with_export("exp1", "podA::policy1", "podA::fs1:root")
}

use std::collections::BTreeMap;

use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Label on the Django object holding the pipeline state token.
pub const MIGRATION_STEP_LABEL: &str = "migration-step";

/// Finalizer placed on every owned child object.
pub const PROTECTOR_FINALIZER: &str = "django.thismatters.github/protector";

/// Finalizer placed on the Django object itself so teardown can
/// unprotect the children before garbage collection cascades.
pub const OPERATOR_FINALIZER: &str = "djangos.thismatters.github/operator";

/// Desired deployment of one Django web application: image and version,
/// ingress host, side processes, and init-time management commands.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "thismatters.github",
    version = "v1alpha",
    kind = "Django",
    plural = "djangos",
    namespaced
)]
#[kube(status = "DjangoStatus")]
#[serde(rename_all = "camelCase")]
pub struct DjangoSpec {
    /// FQDN for the ingress; everything past the first dot becomes the
    /// TLS common name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Container image, composed with `version` as `image:version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Version tag; its slug suffixes every workload name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_issuer: Option<String>,
    #[serde(default)]
    pub ports: Ports,
    /// Per-purpose container command and args (`app`, `worker`, `beat`).
    #[serde(default)]
    pub commands: BTreeMap<String, CommandSpec>,
    /// `manage.py` argument lists run once per migration, in order.
    #[serde(default)]
    pub init_manage_commands: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_manage_timeouts: Option<WaitBounds>,
    /// Generic waiting-step bounds; steps may override per purpose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_step: Option<WaitBounds>,
    /// Probe applied to the app container as both liveness and readiness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_object")]
    pub app_probe_spec: Option<Value>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_object_list")]
    pub env: Vec<Value>,
    #[serde(default)]
    pub env_from_config_map_refs: Vec<String>,
    #[serde(default)]
    pub env_from_secret_refs: Vec<String>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_object_list")]
    pub volumes: Vec<Value>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_object_list")]
    pub volume_mounts: Vec<Value>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_object_list")]
    pub image_pull_secrets: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_object")]
    pub strategy: Option<Value>,
    #[serde(default)]
    pub resource_requests: BTreeMap<String, ResourceRequest>,
    #[serde(default)]
    pub autoscalers: BTreeMap<String, AutoscalerSpec>,
    /// Run management commands even when `migrationVersion` already
    /// matches the target version.
    #[serde(default)]
    pub always_run_migrations: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Ports {
    #[serde(default = "default_app_port")]
    pub app: i32,
    #[serde(default = "default_redis_port")]
    pub redis: i32,
}

impl Default for Ports {
    fn default() -> Self {
        Ports {
            app: default_app_port(),
            redis: default_redis_port(),
        }
    }
}

fn default_app_port() -> i32 {
    8000
}

fn default_redis_port() -> i32 {
    6379
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct CommandSpec {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Cap and cadence for a waiting step: at most `iterations` polls,
/// `period` seconds apart.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub struct WaitBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ResourceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_utilization_threshold: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<ReplicaBounds>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ReplicaBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Migrating,
    Running,
    Degraded,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DjangoStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Last fully migrated version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Last version whose management commands succeeded; used to skip
    /// idempotent re-runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_version: Option<String>,
    /// Spec snapshot captured when the in-flight pipeline initiated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_spec: Option<DjangoSpec>,
    /// Accumulated step outputs of the in-flight pipeline.
    #[serde(
        default,
        rename = "migration_pipeline",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(schema_with = "preserve_object")]
    pub migration_pipeline: Option<Value>,
    /// kind -> purpose -> name inventory of owned objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<BTreeMap<String, BTreeMap<String, String>>>,
    /// Fingerprint of the spec the last completed pipeline enacted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_fingerprint: Option<String>,
    /// Temporary-retry count for the current pipeline step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_retries: Option<u32>,
}

/// Fingerprint of the canonical-JSON spec. Label and annotation churn
/// never changes this, so it stands in for "the diff touches something
/// outside metadata".
pub fn spec_fingerprint(spec: &DjangoSpec) -> String {
    let mut hasher = Sha256::new();
    let bytes = serde_json::to_vec(spec).expect("fingerprint serialize");
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn preserve_object(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

fn preserve_object_list(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "array",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}

/// Helper to emit the CRD without schemars `format` annotations that
/// older API servers and OLM dislike.
pub fn print_crd_without_formats() -> anyhow::Result<()> {
    let crd = Django::crd();
    let mut v = serde_json::to_value(&crd)?;
    strip_format_keys(&mut v);
    println!("{}", serde_yaml::to_string(&v)?);
    Ok(())
}

fn strip_format_keys(v: &mut serde_json::Value) {
    use serde_json::Value::*;
    match v {
        Object(map) => {
            map.remove("format");
            for val in map.values_mut() {
                strip_format_keys(val);
            }
        }
        Array(arr) => {
            for val in arr {
                strip_format_keys(val);
            }
        }
        _ => {}
    }
}

use std::collections::BTreeMap;

use kube::{Client, ResourceExt, api::DynamicObject};
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    crd::{Django, DjangoSpec, DjangoStatus},
    error::{Error, Result},
    manifests::ManifestCatalog,
    pathmap::{self, Enrichment, PathSpec, slugify},
    resources::{EnsureRequest, OwnerHandle, ResourceKind, ResourceService},
};

/// Purposes that migrate blue/green. Everything else (redis, service,
/// ingress, autoscaler) is singleton infrastructure.
pub const WORKLOAD_PURPOSES: [&str; 3] = ["app", "worker", "beat"];

/// Given the recorded name for a kind/purpose and the current version
/// slug, decide whether a cutover is needed: a recorded name ending in
/// the slug is already green (`(None, Some(name))`), anything else is
/// the blue to replace (`(Some(name), None)`).
pub fn blue_green_names(
    recorded: Option<&str>,
    version_slug: &str,
) -> (Option<String>, Option<String>) {
    match recorded {
        Some(name) if name.is_empty() => (None, None),
        Some(name) if name.ends_with(version_slug) => (None, Some(name.to_string())),
        Some(name) => (Some(name.to_string()), None),
        None => (None, None),
    }
}

fn template_for(kind: ResourceKind, purpose: &str) -> String {
    format!("{kind}_{purpose}.yaml")
}

fn containers_path() -> PathSpec {
    PathSpec::root()
        .key("spec")
        .key("template")
        .key("spec")
        .key("containers")
        .index(0)
}

/// Per-event façade over `ResourceService`: validates the spec snapshot,
/// computes the render parameters, and exposes the per-purpose
/// operations the pipeline steps drive.
pub struct DjangoReconciler {
    client: Client,
    catalog: ManifestCatalog,
    namespace: String,
    owner: OwnerHandle,
    spec: DjangoSpec,
    status: DjangoStatus,
    host: String,
    image: String,
    version: String,
    version_slug: String,
    cluster_issuer: String,
}

impl DjangoReconciler {
    /// Fails with `MissingField` when a required spec field is absent;
    /// the pipeline engine turns that into a degraded condition and a
    /// `ConfigError` event.
    pub fn new(
        client: Client,
        catalog: ManifestCatalog,
        django: &Django,
        spec: DjangoSpec,
        status: DjangoStatus,
    ) -> Result<Self> {
        let host = spec.host.clone().ok_or(Error::MissingField("host"))?;
        let image = spec.image.clone().ok_or(Error::MissingField("image"))?;
        let version = spec.version.clone().ok_or(Error::MissingField("version"))?;
        let cluster_issuer = spec
            .cluster_issuer
            .clone()
            .ok_or(Error::MissingField("clusterIssuer"))?;

        let namespace = django.namespace().unwrap_or_else(|| "default".to_string());
        Ok(DjangoReconciler {
            client,
            catalog,
            namespace,
            owner: OwnerHandle::from_django(django),
            image: format!("{image}:{version}"),
            version_slug: slugify(&version),
            version,
            host,
            cluster_issuer,
            spec,
            status,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn version_slug(&self) -> &str {
        &self.version_slug
    }

    pub fn spec(&self) -> &DjangoSpec {
        &self.spec
    }

    fn service(&self, kind: ResourceKind) -> ResourceService {
        ResourceService::new(
            self.client.clone(),
            self.namespace.clone(),
            kind,
            self.catalog.clone(),
        )
    }

    fn request_value(&self, purpose: &str, cpu: bool) -> String {
        let request = self.spec.resource_requests.get(purpose);
        if cpu {
            request
                .and_then(|r| r.cpu.clone())
                .unwrap_or_else(|| "100m".to_string())
        } else {
            request
                .and_then(|r| r.memory.clone())
                .unwrap_or_else(|| "200Mi".to_string())
        }
    }

    /// Parameters fed into every template render.
    pub fn base_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("namespace".to_string(), self.namespace.clone());
        params.insert("host".to_string(), self.host.clone());
        params.insert("image".to_string(), self.image.clone());
        params.insert("version".to_string(), self.version.clone());
        params.insert("version_slug".to_string(), self.version_slug.clone());
        params.insert("cluster_issuer".to_string(), self.cluster_issuer.clone());
        params.insert("app_port".to_string(), self.spec.ports.app.to_string());
        params.insert("redis_port".to_string(), self.spec.ports.redis.to_string());
        for purpose in WORKLOAD_PURPOSES {
            params.insert(
                format!("{purpose}_cpu_request"),
                self.request_value(purpose, true),
            );
            params.insert(
                format!("{purpose}_memory_request"),
                self.request_value(purpose, false),
            );
        }
        params
    }

    async fn ensure_raw(
        &self,
        kind: ResourceKind,
        purpose: &str,
        mut request: EnsureRequest,
        owner: Option<&OwnerHandle>,
    ) -> Result<Option<DynamicObject>> {
        let mut params = self.base_params();
        params.insert("purpose".to_string(), purpose.to_string());
        params.extend(std::mem::take(&mut request.params));
        request.params = params;
        self.service(kind)
            .ensure(owner.unwrap_or(&self.owner), request)
            .await
    }

    /// Ensure one object and report it as a `{kind: {purpose: name}}`
    /// fragment for the pipeline's `created` accumulator.
    async fn ensure_entry(
        &self,
        kind: ResourceKind,
        purpose: &str,
        request: EnsureRequest,
    ) -> Result<Value> {
        match self.ensure_raw(kind, purpose, request, None).await? {
            Some(obj) => Ok(json!({kind.as_str(): {purpose: obj.name_any()}})),
            None => Ok(json!({})),
        }
    }

    pub async fn read_resource(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<DynamicObject, kube::Error> {
        self.service(kind).read(name).await
    }

    pub async fn delete_resource(&self, kind: ResourceKind, name: &str) -> Result<()> {
        self.service(kind)
            .ensure(&self.owner, EnsureRequest::delete(name))
            .await?;
        Ok(())
    }

    fn recorded_name(&self, kind: ResourceKind, purpose: &str) -> Option<String> {
        self.status
            .created
            .as_ref()
            .and_then(|created| created.get(kind.as_str()))
            .and_then(|purposes| purposes.get(purpose))
            .cloned()
    }

    /// Blue/green name resolution against the recorded inventory.
    pub fn resource_names(
        &self,
        kind: ResourceKind,
        purpose: &str,
    ) -> (Option<String>, Option<String>) {
        let recorded = self.recorded_name(kind, purpose);
        blue_green_names(recorded.as_deref(), &self.version_slug)
    }

    /// Redis cache deployment and service; singletons, no blue/green.
    pub async fn ensure_redis(&self) -> Result<Value> {
        let mut ret = self
            .ensure_entry(
                ResourceKind::Deployment,
                "redis",
                EnsureRequest::template(template_for(ResourceKind::Deployment, "redis"))
                    .existing(self.recorded_name(ResourceKind::Deployment, "redis")),
            )
            .await?;
        let service = self
            .ensure_entry(
                ResourceKind::Service,
                "redis",
                EnsureRequest::template(template_for(ResourceKind::Service, "redis"))
                    .existing(self.recorded_name(ResourceKind::Service, "redis")),
            )
            .await?;
        pathmap::merge(&mut ret, &service)?;
        Ok(ret)
    }

    fn env_from(&self) -> Vec<Value> {
        let mut env_from = Vec::new();
        for name in &self.spec.env_from_config_map_refs {
            env_from.push(json!({"configMapRef": {"name": name}}));
        }
        for name in &self.spec.env_from_secret_refs {
            env_from.push(json!({"secretRef": {"name": name}}));
        }
        env_from
    }

    /// One init container per management command, sharing the app's
    /// environment and mounts.
    pub fn manage_command_containers(&self) -> Vec<Value> {
        let env_from = self.env_from();
        self.spec
            .init_manage_commands
            .iter()
            .map(|args| {
                let mut command = vec!["python".to_string(), "manage.py".to_string()];
                command.extend(args.iter().cloned());
                json!({
                    "name": slugify(&args.join("-")),
                    "image": self.image,
                    "command": command,
                    "env": self.spec.env,
                    "envFrom": env_from,
                    "volumeMounts": self.spec.volume_mounts,
                })
            })
            .collect()
    }

    /// Start the management-command pod when the spec asks for any
    /// commands; returns its name.
    pub async fn start_manage_commands(&self) -> Result<Option<String>> {
        if self.spec.init_manage_commands.is_empty() {
            return Ok(None);
        }
        let enrichments = vec![Enrichment::root(json!({
            "spec": {
                "imagePullSecrets": self.spec.image_pull_secrets,
                "volumes": self.spec.volumes,
                "initContainers": self.manage_command_containers(),
            }
        }))];
        let created = self
            .ensure_entry(
                ResourceKind::Pod,
                "migrations",
                EnsureRequest::template(template_for(ResourceKind::Pod, "migrations"))
                    .enrichments(enrichments),
            )
            .await?;
        match pathmap::get_str(&created, "pod.migrations") {
            Some(name) => Ok(Some(name.to_string())),
            None => Err(Error::degraded("management pod was not created")),
        }
    }

    pub async fn clean_manage_commands(&self, pod_name: &str) -> Result<()> {
        self.delete_resource(ResourceKind::Pod, pod_name).await
    }

    /// Pod phase lowercased; absent phase reads as `unknown`.
    pub async fn pod_phase(&self, name: &str) -> Result<String, kube::Error> {
        let pod = self.service(ResourceKind::Pod).read(name).await?;
        Ok(pod.data["status"]["phase"]
            .as_str()
            .unwrap_or("unknown")
            .to_lowercase())
    }

    /// True iff the deployment's status conditions contain
    /// `type == condition` with `status == "True"`.
    pub async fn deployment_reached_condition(&self, name: &str, condition: &str) -> Result<bool> {
        let deployment = self
            .service(ResourceKind::Deployment)
            .read(name)
            .await
            .map_err(Error::Api)?;
        let conditions = match deployment.data["status"]["conditions"].as_array() {
            Some(conditions) => conditions.clone(),
            None => return Ok(false),
        };
        Ok(conditions
            .iter()
            .any(|c| c["type"] == condition && c["status"] == "True"))
    }

    /// Container command/args, env and mounts for one purpose, targeted
    /// at the rendered manifest's first container slot.
    pub fn base_enrichments(&self, purpose: &str) -> Result<Vec<Enrichment>> {
        let command = self
            .spec
            .commands
            .get(purpose)
            .filter(|c| !c.command.is_empty())
            .ok_or_else(|| Error::degraded(format!("missing {purpose} command")))?;
        Ok(vec![
            Enrichment::root(json!({
                "spec": {
                    "strategy": self.spec.strategy.clone().unwrap_or_else(|| json!({})),
                    "template": {
                        "spec": {
                            "imagePullSecrets": self.spec.image_pull_secrets,
                            "volumes": self.spec.volumes,
                        }
                    },
                }
            })),
            Enrichment::new(
                containers_path(),
                json!({
                    "command": command.command,
                    "args": command.args,
                    "env": self.spec.env,
                    "envFrom": self.env_from(),
                    "volumeMounts": self.spec.volume_mounts,
                }),
            ),
        ])
    }

    /// Bring up the green deployment for a purpose, ensure its
    /// autoscaler when enabled, and cut the blue down unless the caller
    /// defers that to cleanup.
    pub async fn migrate_resource(
        &self,
        purpose: &str,
        enrichments: Vec<Enrichment>,
        skip_delete: bool,
    ) -> Result<Value> {
        let (blue, green) = self.resource_names(ResourceKind::Deployment, purpose);
        debug!(
            purpose,
            former = blue.as_deref(),
            existing = green.as_deref(),
            skip_delete,
            "migrating deployment"
        );

        let green_obj = self
            .ensure_raw(
                ResourceKind::Deployment,
                purpose,
                EnsureRequest::template(template_for(ResourceKind::Deployment, purpose))
                    .enrichments(enrichments)
                    .existing(green),
                None,
            )
            .await?
            .ok_or_else(|| Error::degraded(format!("green {purpose} deployment not created")))?;
        let mut ret = json!({"deployment": {purpose: green_obj.name_any()}});

        if let Some(autoscaler) = self.spec.autoscalers.get(purpose) {
            if autoscaler.enabled {
                let hpa = self
                    .ensure_autoscaler(purpose, autoscaler, &green_obj, blue.as_deref())
                    .await?;
                pathmap::merge(&mut ret, &hpa)?;
            }
        }

        if let Some(blue_name) = &blue {
            if !skip_delete {
                debug!(purpose, blue = %blue_name, "cutting over blue deployment");
                self.delete_resource(ResourceKind::Deployment, blue_name)
                    .await?;
            }
        }
        Ok(ret)
    }

    async fn ensure_autoscaler(
        &self,
        purpose: &str,
        autoscaler: &crate::crd::AutoscalerSpec,
        green_obj: &DynamicObject,
        blue: Option<&str>,
    ) -> Result<Value> {
        let threshold = autoscaler.cpu_utilization_threshold.ok_or_else(|| {
            Error::Scaling(format!(
                "autoscalers.{purpose}.cpuUtilizationThreshold is not set"
            ))
        })?;
        let bounds = autoscaler.replicas.ok_or_else(|| {
            Error::Scaling(format!("autoscalers.{purpose}.replicas is not set"))
        })?;
        let (minimum, maximum) = match (bounds.minimum, bounds.maximum) {
            (Some(minimum), Some(maximum)) => (minimum, maximum),
            _ => {
                return Err(Error::Scaling(format!(
                    "autoscalers.{purpose}.replicas bounds are incomplete"
                )));
            }
        };

        // Carry the live scale across the cutover so the new autoscaler
        // starts from where the blue deployment was.
        let mut current_replicas = green_obj.data["spec"]["replicas"].as_i64().unwrap_or(1);
        if let Some(blue_name) = blue {
            let blue_obj = self
                .service(ResourceKind::Deployment)
                .read(blue_name)
                .await
                .map_err(Error::Api)?;
            current_replicas = blue_obj.data["spec"]["replicas"]
                .as_i64()
                .unwrap_or(current_replicas);
        }

        let mut extra = BTreeMap::new();
        extra.insert("deployment_name".to_string(), green_obj.name_any());
        extra.insert("cpu_threshold".to_string(), threshold.to_string());
        extra.insert("min_replicas".to_string(), minimum.to_string());
        extra.insert("max_replicas".to_string(), maximum.to_string());
        extra.insert("current_replicas".to_string(), current_replicas.to_string());

        let hpa_owner =
            OwnerHandle::from_dynamic(green_obj, &ResourceKind::Deployment.api_resource());
        match self
            .ensure_raw(
                ResourceKind::HorizontalPodAutoscaler,
                purpose,
                EnsureRequest::template("horizontalpodautoscaler.yaml").params(extra),
                Some(&hpa_owner),
            )
            .await?
        {
            Some(obj) => Ok(json!({"horizontalpodautoscaler": {purpose: obj.name_any()}})),
            None => Ok(json!({})),
        }
    }

    /// Green deployment for a purpose with the blue kept alive; the app
    /// also gets the probe spec on its container.
    pub async fn start_green(&self, purpose: &str) -> Result<Value> {
        let mut enrichments = self.base_enrichments(purpose)?;
        if purpose == "app" {
            if let Some(probe) = &self.spec.app_probe_spec {
                enrichments.push(Enrichment::new(
                    containers_path(),
                    json!({"livenessProbe": probe, "readinessProbe": probe}),
                ));
            }
        }
        self.migrate_resource(purpose, enrichments, true).await
    }

    pub async fn migrate_worker(&self) -> Result<Value> {
        let enrichments = self.base_enrichments("worker")?;
        self.migrate_resource("worker", enrichments, false).await
    }

    pub async fn migrate_beat(&self) -> Result<Value> {
        let enrichments = self.base_enrichments("beat")?;
        self.migrate_resource("beat", enrichments, false).await
    }

    /// Point the app Service and Ingress at the green deployment. The
    /// TLS common name is the domain part of the host.
    pub async fn migrate_service(&self) -> Result<Value> {
        let mut ret = self
            .ensure_entry(
                ResourceKind::Service,
                "app",
                EnsureRequest::template(template_for(ResourceKind::Service, "app")),
            )
            .await?;

        let common_name = self
            .host
            .split_once('.')
            .map(|(_, domain)| domain.to_string())
            .unwrap_or_else(|| self.host.clone());
        let mut extra = BTreeMap::new();
        extra.insert("common_name".to_string(), common_name);
        let ingress = self
            .ensure_entry(
                ResourceKind::Ingress,
                "app",
                EnsureRequest::template(template_for(ResourceKind::Ingress, "app")).params(extra),
            )
            .await?;
        pathmap::merge(&mut ret, &ingress)?;
        Ok(ret)
    }

    /// Delete a superseded deployment by name; the name is all the
    /// delete path needs.
    pub async fn clean_blue(&self, blue: Option<&str>) -> Result<()> {
        if let Some(name) = blue {
            debug!(blue = name, "removing blue deployment");
            self.delete_resource(ResourceKind::Deployment, name).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use http::{Request, Response};
    use kube::client::Body;
    use tower_test::mock;

    use super::*;

    fn sample_spec() -> DjangoSpec {
        serde_json::from_value(json!({
            "host": "testbed.example.com",
            "image": "registry.example.com/testbed",
            "version": "1.0.0",
            "clusterIssuer": "letsencrypt",
            "initManageCommands": [
                ["migrate"],
                ["loaddata", "fixtures/us_states.json"],
            ],
            "commands": {
                "app": {"command": ["gunicorn"], "args": ["testbed.wsgi:application"]},
                "worker": {"command": ["celery"], "args": ["--app=testbed", "worker"]},
                "beat": {"command": ["celery"], "args": ["--app=testbed", "beat"]},
            },
            "envFromConfigMapRefs": ["env"],
            "envFromSecretRefs": ["database", "secret-key"],
            "resourceRequests": {
                "app": {"cpu": "250m", "memory": "512Mi"},
            },
        }))
        .unwrap()
    }

    fn reconciler_with(spec: DjangoSpec, status: DjangoStatus) -> DjangoReconciler {
        let (mock_service, _handle) = mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "ns");
        let mut django = Django::new("demo", spec.clone());
        django.metadata.namespace = Some("ns".to_string());
        django.metadata.uid = Some("uid-1".to_string());
        DjangoReconciler::new(
            client,
            ManifestCatalog::new("manifests"),
            &django,
            spec,
            status,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn missing_required_field_is_a_config_error() {
        let (mock_service, _handle) = mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "ns");
        let mut spec = sample_spec();
        spec.cluster_issuer = None;
        let django = Django::new("demo", spec.clone());
        let err = DjangoReconciler::new(
            client,
            ManifestCatalog::new("manifests"),
            &django,
            spec,
            DjangoStatus::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::MissingField("clusterIssuer")));
    }

    #[tokio::test]
    async fn base_params_compose_image_and_slug() {
        let reconciler = reconciler_with(sample_spec(), DjangoStatus::default());
        let params = reconciler.base_params();
        assert_eq!(
            params.get("image"),
            Some(&"registry.example.com/testbed:1.0.0".to_string())
        );
        assert_eq!(params.get("version_slug"), Some(&"1-0-0".to_string()));
        assert_eq!(params.get("app_port"), Some(&"8000".to_string()));
        assert_eq!(params.get("redis_port"), Some(&"6379".to_string()));
        assert_eq!(params.get("app_cpu_request"), Some(&"250m".to_string()));
        // unset requests fall back to safe defaults
        assert_eq!(params.get("worker_cpu_request"), Some(&"100m".to_string()));
        assert_eq!(
            params.get("worker_memory_request"),
            Some(&"200Mi".to_string())
        );
    }

    #[test]
    fn blue_green_names_detects_version_change() {
        let (former, existing) = blue_green_names(Some("app-6-9-420"), "6-9-421");
        assert_eq!(former.as_deref(), Some("app-6-9-420"));
        assert_eq!(existing, None);
    }

    #[test]
    fn blue_green_names_detects_current_version() {
        let (former, existing) = blue_green_names(Some("app-6-9-420"), "6-9-420");
        assert_eq!(former, None);
        assert_eq!(existing.as_deref(), Some("app-6-9-420"));
    }

    #[test]
    fn blue_green_names_with_no_record() {
        assert_eq!(blue_green_names(None, "1-0-0"), (None, None));
        assert_eq!(blue_green_names(Some(""), "1-0-0"), (None, None));
    }

    #[tokio::test]
    async fn resource_names_read_the_created_inventory() {
        let mut status = DjangoStatus::default();
        let mut deployments = BTreeMap::new();
        deployments.insert("app".to_string(), "app-0-9-0".to_string());
        let mut created = BTreeMap::new();
        created.insert("deployment".to_string(), deployments);
        status.created = Some(created);

        let reconciler = reconciler_with(sample_spec(), status);
        let (former, existing) = reconciler.resource_names(ResourceKind::Deployment, "app");
        assert_eq!(former.as_deref(), Some("app-0-9-0"));
        assert_eq!(existing, None);
    }

    #[tokio::test]
    async fn manage_command_containers_build_manage_py_invocations() {
        let reconciler = reconciler_with(sample_spec(), DjangoStatus::default());
        let containers = reconciler.manage_command_containers();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0]["name"], json!("migrate"));
        assert_eq!(
            containers[0]["command"],
            json!(["python", "manage.py", "migrate"])
        );
        assert_eq!(
            containers[1]["name"],
            json!("loaddata-fixtures-us-states-json")
        );
        assert_eq!(
            containers[1]["command"],
            json!(["python", "manage.py", "loaddata", "fixtures/us_states.json"])
        );
        assert_eq!(
            containers[0]["envFrom"],
            json!([
                {"configMapRef": {"name": "env"}},
                {"secretRef": {"name": "database"}},
                {"secretRef": {"name": "secret-key"}},
            ])
        );
    }

    #[tokio::test]
    async fn base_enrichments_target_the_first_container() {
        let reconciler = reconciler_with(sample_spec(), DjangoStatus::default());
        let enrichments = reconciler.base_enrichments("worker").unwrap();
        assert_eq!(enrichments.len(), 2);
        assert!(enrichments[0].at.is_root());
        assert_eq!(
            enrichments[1].at.to_string(),
            "spec.template.spec.containers[0]"
        );
        assert_eq!(enrichments[1].value["command"], json!(["celery"]));
        assert_eq!(
            enrichments[1].value["args"],
            json!(["--app=testbed", "worker"])
        );
    }

    #[tokio::test]
    async fn base_enrichments_fail_without_a_command() {
        let mut spec = sample_spec();
        spec.commands.remove("beat");
        let reconciler = reconciler_with(spec, DjangoStatus::default());
        let err = reconciler.base_enrichments("beat").err().unwrap();
        assert!(matches!(err, Error::Degraded(_)));
    }

    #[tokio::test]
    async fn enrichments_apply_to_the_shipped_app_template() {
        let reconciler = reconciler_with(sample_spec(), DjangoStatus::default());
        let catalog = ManifestCatalog::new(concat!(env!("CARGO_MANIFEST_DIR"), "/manifests"));
        let mut params = reconciler.base_params();
        params.insert("purpose".to_string(), "app".to_string());
        let mut body = catalog.render("deployment_app.yaml", &params).unwrap();

        let enrichments = reconciler.base_enrichments("app").unwrap();
        pathmap::enrich(&mut body, &enrichments).unwrap();

        let container = &body["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["name"], json!("app"));
        assert_eq!(
            container["image"],
            json!("registry.example.com/testbed:1.0.0")
        );
        assert_eq!(container["command"], json!(["gunicorn"]));
        assert_eq!(container["args"], json!(["testbed.wsgi:application"]));
        assert_eq!(
            container["envFrom"][0]["configMapRef"]["name"],
            json!("env")
        );
        assert_eq!(
            body["metadata"]["name"],
            json!(format!("app-{}", reconciler.version_slug()))
        );
    }

    #[test]
    fn template_names_follow_kind_and_purpose() {
        assert_eq!(
            template_for(ResourceKind::Deployment, "redis"),
            "deployment_redis.yaml"
        );
        assert_eq!(
            template_for(ResourceKind::Pod, "migrations"),
            "pod_migrations.yaml"
        );
    }
}

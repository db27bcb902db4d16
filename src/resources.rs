use std::collections::BTreeMap;
use std::fmt;

use kube::{
    Client, Resource, ResourceExt,
    api::{Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams},
};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    crd::{Django, MIGRATION_STEP_LABEL, PROTECTOR_FINALIZER},
    error::{Error, Result},
    manifests::ManifestCatalog,
    pathmap::{self, Enrichment},
};

/// The family of kinds the operator manages. Each variant carries its
/// erased API surface, so verbs dispatch through one `Api<DynamicObject>`
/// instead of a per-kind client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceKind {
    Deployment,
    Service,
    Ingress,
    Pod,
    Job,
    HorizontalPodAutoscaler,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
            ResourceKind::Ingress => "ingress",
            ResourceKind::Pod => "pod",
            ResourceKind::Job => "job",
            ResourceKind::HorizontalPodAutoscaler => "horizontalpodautoscaler",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "deployment" => Some(ResourceKind::Deployment),
            "service" => Some(ResourceKind::Service),
            "ingress" => Some(ResourceKind::Ingress),
            "pod" => Some(ResourceKind::Pod),
            "job" => Some(ResourceKind::Job),
            "horizontalpodautoscaler" => Some(ResourceKind::HorizontalPodAutoscaler),
            _ => None,
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        let (group, version, kind, plural) = match self {
            ResourceKind::Deployment => ("apps", "v1", "Deployment", "deployments"),
            ResourceKind::Service => ("", "v1", "Service", "services"),
            ResourceKind::Ingress => ("networking.k8s.io", "v1", "Ingress", "ingresses"),
            ResourceKind::Pod => ("", "v1", "Pod", "pods"),
            ResourceKind::Job => ("batch", "v1", "Job", "jobs"),
            ResourceKind::HorizontalPodAutoscaler => (
                "autoscaling",
                "v1",
                "HorizontalPodAutoscaler",
                "horizontalpodautoscalers",
            ),
        };
        ApiResource {
            api_version: if group.is_empty() {
                version.to_string()
            } else {
                format!("{group}/{version}")
            },
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity a child is adopted under: enough of the owner to build
/// an ownerReference and propagate labels.
#[derive(Clone, Debug)]
pub struct OwnerHandle {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub uid: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl OwnerHandle {
    pub fn from_django(django: &Django) -> Self {
        OwnerHandle {
            api_version: Django::api_version(&()).into_owned(),
            kind: Django::kind(&()).into_owned(),
            name: django.name_any(),
            namespace: django.namespace(),
            uid: django.meta().uid.clone(),
            labels: django.labels().clone(),
        }
    }

    /// Adoption under an owned object, e.g. an autoscaler under its
    /// green Deployment.
    pub fn from_dynamic(obj: &DynamicObject, fallback: &ApiResource) -> Self {
        let (api_version, kind) = match &obj.types {
            Some(types) => (types.api_version.clone(), types.kind.clone()),
            None => (fallback.api_version.clone(), fallback.kind.clone()),
        };
        OwnerHandle {
            api_version,
            kind,
            name: obj.name_any(),
            namespace: obj.namespace(),
            uid: obj.meta().uid.clone(),
            labels: obj.labels().clone(),
        }
    }
}

/// Where the desired object comes from: a literal body, or a manifest
/// template rendered with the caller's parameters.
#[derive(Clone, Debug)]
pub enum DesiredSource {
    Body(Value),
    Template(String),
}

/// One `ensure` invocation: desired source, enrichments to fold in, an
/// optional known name of the live object, and whether this is a delete.
#[derive(Clone, Debug)]
pub struct EnsureRequest {
    pub source: DesiredSource,
    pub params: BTreeMap<String, String>,
    pub enrichments: Vec<Enrichment>,
    pub existing: Option<String>,
    pub delete: bool,
}

impl EnsureRequest {
    pub fn template(name: impl Into<String>) -> Self {
        EnsureRequest {
            source: DesiredSource::Template(name.into()),
            params: BTreeMap::new(),
            enrichments: Vec::new(),
            existing: None,
            delete: false,
        }
    }

    pub fn delete(name: impl Into<String>) -> Self {
        EnsureRequest {
            source: DesiredSource::Body(json!({})),
            params: BTreeMap::new(),
            enrichments: Vec::new(),
            existing: Some(name.into()),
            delete: true,
        }
    }

    pub fn params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn enrichments(mut self, enrichments: Vec<Enrichment>) -> Self {
        self.enrichments = enrichments;
        self
    }

    pub fn existing(mut self, existing: Option<String>) -> Self {
        self.existing = existing;
        self
    }
}

/// Kind-agnostic idempotent "ensure" over the Kubernetes API: render,
/// enrich, adopt, then read/create/patch/delete as cluster state
/// requires. Delete failures are swallowed; the next reconcile converges.
pub struct ResourceService {
    client: Client,
    namespace: String,
    kind: ResourceKind,
    catalog: ManifestCatalog,
}

impl ResourceService {
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        kind: ResourceKind,
        catalog: ManifestCatalog,
    ) -> Self {
        ResourceService {
            client,
            namespace: namespace.into(),
            kind,
            catalog,
        }
    }

    fn api(&self) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            &self.namespace,
            &self.kind.api_resource(),
        )
    }

    pub async fn read(&self, name: &str) -> Result<DynamicObject, kube::Error> {
        self.api().get(name).await
    }

    /// `Ok(None)` when the object does not exist; other API failures
    /// surface to the caller.
    pub async fn read_opt(&self, name: &str) -> Result<Option<DynamicObject>> {
        match self.api().get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Strip the protector finalizer so a deliberate delete can proceed.
    /// Failures are swallowed; a retrying ensure converges.
    pub async fn unprotect(&self, name: &str, known: Option<&DynamicObject>) {
        let obj = match known {
            Some(obj) => obj.clone(),
            None => match self.api().get(name).await {
                Ok(obj) => obj,
                Err(_) => return,
            },
        };
        let finalizers: Vec<String> = obj
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != PROTECTOR_FINALIZER)
            .cloned()
            .collect();
        if finalizers.len() == obj.finalizers().len() {
            return;
        }
        let patch = json!({"metadata": {"finalizers": finalizers}});
        if let Err(err) = self
            .api()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            warn!(kind = %self.kind, name = %name, error = %err, "removing protector finalizer failed");
        }
    }

    pub async fn ensure(
        &self,
        owner: &OwnerHandle,
        request: EnsureRequest,
    ) -> Result<Option<DynamicObject>> {
        let mut existing = request.existing;
        let mut desired: Option<Value> = None;

        if !request.delete {
            let mut body = match request.source {
                DesiredSource::Body(body) => body,
                DesiredSource::Template(template) => {
                    self.catalog.render(&template, &request.params)?
                }
            };
            pathmap::enrich(&mut body, &request.enrichments)?;
            adopt_sans_labels(&mut body, owner, &[MIGRATION_STEP_LABEL]);
            if existing.is_none() {
                existing = pathmap::get_str(&body, "metadata.name").map(str::to_string);
            }
            desired = Some(body);
        }

        let current = match &existing {
            Some(name) => self.read_opt(name).await?,
            None => None,
        };

        match (current, request.delete) {
            (Some(obj), true) => {
                let name = obj.name_any();
                self.unprotect(&name, Some(&obj)).await;
                debug!(kind = %self.kind, name = %name, "deleting resource");
                if let Err(err) = self.api().delete(&name, &DeleteParams::default()).await {
                    warn!(kind = %self.kind, name = %name, error = %err, "delete failed; will converge on retry");
                }
                Ok(None)
            }
            (Some(obj), false) => {
                let name = obj.name_any();
                let body = desired.take().unwrap_or_default();
                let patched = self
                    .api()
                    .patch(&name, &PatchParams::default(), &Patch::Merge(&body))
                    .await
                    .map_err(Error::Api)?;
                Ok(Some(patched))
            }
            (None, false) => {
                let body = desired.take().unwrap_or_default();
                let obj: DynamicObject = serde_json::from_value(body)?;
                let created = self
                    .api()
                    .create(&PostParams::default(), &obj)
                    .await
                    .map_err(Error::Api)?;
                Ok(Some(created))
            }
            (None, true) => Ok(None),
        }
    }
}

/// Bind a rendered child to its owner: append the ownerReference, align
/// the namespace, default the name to an owner-prefixed generateName,
/// copy the owner's labels minus the excluded set, and apply the
/// protector finalizer.
pub fn adopt_sans_labels(body: &mut Value, owner: &OwnerHandle, excluded_labels: &[&str]) {
    let metadata = body
        .as_object_mut()
        .map(|map| map.entry("metadata").or_insert_with(|| json!({})))
        .and_then(Value::as_object_mut);
    let Some(metadata) = metadata else {
        return;
    };

    let owner_ref = json!({
        "apiVersion": owner.api_version,
        "kind": owner.kind,
        "name": owner.name,
        "uid": owner.uid.clone().unwrap_or_default(),
        "controller": true,
        "blockOwnerDeletion": true,
    });
    if let Some(refs) = metadata
        .entry("ownerReferences")
        .or_insert_with(|| json!([]))
        .as_array_mut()
    {
        refs.push(owner_ref);
    }

    if !metadata.contains_key("name") {
        metadata.insert("generateName".into(), json!(format!("{}-", owner.name)));
    }
    if let Some(namespace) = &owner.namespace {
        metadata.insert("namespace".into(), json!(namespace));
    }

    if let Some(labels) = metadata
        .entry("labels")
        .or_insert_with(|| json!({}))
        .as_object_mut()
    {
        for (key, value) in &owner.labels {
            if excluded_labels.contains(&key.as_str()) {
                continue;
            }
            labels.insert(key.clone(), json!(value));
        }
    }

    if let Some(finalizers) = metadata
        .entry("finalizers")
        .or_insert_with(|| json!([]))
        .as_array_mut()
    {
        if !finalizers.iter().any(|f| f == PROTECTOR_FINALIZER) {
            finalizers.push(json!(PROTECTOR_FINALIZER));
        }
    }
}

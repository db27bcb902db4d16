use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use kube::{
    Api, Client, Resource, ResourceExt,
    api::{Patch, PatchParams},
    runtime::{
        controller::{Action, Controller},
        events::{Recorder, Reporter},
        watcher::Config,
    },
};
use tracing::{error, info, warn};

use k8s_openapi::api::{
    apps::v1::Deployment,
    autoscaling::v1::HorizontalPodAutoscaler,
    core::v1::{Pod, Service},
    networking::v1::Ingress,
};

use crate::{
    crd::{Django, OPERATOR_FINALIZER},
    error::Error,
    events::EventPublisher,
    manifests::ManifestCatalog,
    monitor,
    pipeline::{MigrationPipeline, Outcome, PatchSet},
    resources::{ResourceKind, ResourceService},
};

const DEFAULT_MONITOR_INTERVAL: u64 = 120;

#[derive(Clone)]
struct Ctx {
    client: Client,
    catalog: ManifestCatalog,
    recorder: Recorder,
    monitor_interval: Duration,
}

pub async fn run_operator() -> anyhow::Result<()> {
    let client = Client::try_default().await?;
    let djangos: Api<Django> = Api::all(client.clone());

    let deploys: Api<Deployment> = Api::all(client.clone());
    let svcs: Api<Service> = Api::all(client.clone());
    let ings: Api<Ingress> = Api::all(client.clone());
    let pods: Api<Pod> = Api::all(client.clone());
    let hpas: Api<HorizontalPodAutoscaler> = Api::all(client.clone());

    let reporter = Reporter {
        controller: "django-operator".into(),
        instance: std::env::var("HOSTNAME").ok(),
    };
    let monitor_interval = std::env::var("MONITOR_INTERVAL_SECS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_MONITOR_INTERVAL);
    let ctx = Ctx {
        recorder: Recorder::new(client.clone(), reporter),
        catalog: ManifestCatalog::from_env(),
        monitor_interval: Duration::from_secs(monitor_interval),
        client,
    };

    Controller::new(djangos, Config::default())
        .owns(deploys, Config::default())
        .owns(svcs, Config::default())
        .owns(ings, Config::default())
        .owns(pods, Config::default())
        .owns(hpas, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(ctx))
        .for_each(|res| async move {
            match res {
                Ok((objref, _action)) => info!("✅ reconciled {}", objref.name),
                Err(e) => error!("❌ reconcile failed: {e:?}"),
            }
        })
        .await;

    Ok(())
}

async fn reconcile(obj: Arc<Django>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    let ns = obj.namespace().unwrap_or_else(|| "default".into());
    let name = obj.name_any();
    let api: Api<Django> = Api::namespaced(ctx.client.clone(), &ns);

    if obj.meta().deletion_timestamp.is_some() {
        teardown(&obj, &ns, &ctx).await?;
        return Ok(Action::await_change());
    }

    ensure_finalizer(&api, &obj).await?;

    let events = EventPublisher::new(ctx.recorder.clone(), obj.object_ref(&()));
    let pipeline = MigrationPipeline::new(
        ctx.client.clone(),
        ctx.catalog.clone(),
        obj.clone(),
        events.clone(),
    );

    let (outcome, patch) = pipeline.run().await?;
    apply_patch(&api, &name, &patch).await?;

    match outcome {
        // Our own label patch triggers the event that runs the next step.
        Outcome::Progressed => Ok(Action::await_change()),
        Outcome::Waiting(delay) => Ok(Action::requeue(delay)),
        Outcome::Halted => Ok(Action::await_change()),
        Outcome::Steady => {
            if let Some(created) = pipeline.status().created.as_ref().filter(|c| !c.is_empty()) {
                let drifts = monitor::scan(&ctx.client, &ns, &ctx.catalog, created).await;
                if !drifts.is_empty() {
                    for drift in &drifts {
                        warn!(
                            name = %name,
                            kind = %drift.kind,
                            purpose = %drift.purpose,
                            object = %drift.name,
                            reason = ?drift.reason,
                            "owned object drifted; re-initiating pipeline"
                        );
                    }
                    events.warning("Migrating", "Something is missing...").await;
                    let (_, patch) = pipeline.initiate().await?;
                    apply_patch(&api, &name, &patch).await?;
                    return Ok(Action::await_change());
                }
            }
            Ok(Action::requeue(ctx.monitor_interval))
        }
    }
}

fn error_policy(_obj: Arc<Django>, err: &Error, _ctx: Arc<Ctx>) -> Action {
    error!("reconcile error: {err:?}");
    Action::requeue(Duration::from_secs(10))
}

/// Commit staged writes: status first, then the label advance, so an
/// observer never sees a step label ahead of its context.
async fn apply_patch(api: &Api<Django>, name: &str, patch: &PatchSet) -> Result<(), Error> {
    if let Some(status) = patch.status_patch() {
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&status))
            .await?;
    }
    if let Some(metadata) = patch.metadata_patch() {
        api.patch(name, &PatchParams::default(), &Patch::Merge(&metadata))
            .await?;
    }
    Ok(())
}

async fn ensure_finalizer(api: &Api<Django>, obj: &Django) -> Result<(), Error> {
    if obj.finalizers().iter().any(|f| f == OPERATOR_FINALIZER) {
        return Ok(());
    }
    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(OPERATOR_FINALIZER.to_string());
    let patch = serde_json::json!({"metadata": {"finalizers": finalizers}});
    api.patch(
        &obj.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// On deletion, strip the protector finalizer from every owned object
/// so owner-reference garbage collection can cascade, then release the
/// Django itself.
async fn teardown(obj: &Django, ns: &str, ctx: &Ctx) -> Result<(), Error> {
    if !obj.finalizers().iter().any(|f| f == OPERATOR_FINALIZER) {
        return Ok(());
    }

    if let Some(created) = obj
        .status
        .as_ref()
        .and_then(|status| status.created.as_ref())
    {
        for (kind_label, purposes) in created {
            let Some(kind) = ResourceKind::parse(kind_label) else {
                warn!(kind = %kind_label, "unrecognized kind in created inventory");
                continue;
            };
            let service = ResourceService::new(ctx.client.clone(), ns, kind, ctx.catalog.clone());
            for name in purposes.values() {
                service.unprotect(name, None).await;
            }
        }
    }

    let finalizers: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != OPERATOR_FINALIZER)
        .cloned()
        .collect();
    let api: Api<Django> = Api::namespaced(ctx.client.clone(), ns);
    let patch = serde_json::json!({"metadata": {"finalizers": finalizers}});
    api.patch(
        &obj.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;
    info!(name = %obj.name_any(), "released django and its owned objects");
    Ok(())
}

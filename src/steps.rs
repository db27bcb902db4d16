use serde_json::{Value, json};
use tracing::info;

use crate::{
    crd::{DjangoStatus, WaitBounds},
    error::{Error, Result},
    events::EventPublisher,
    pathmap,
    pipeline::{PatchSet, StepName},
    reconciler::DjangoReconciler,
    resources::ResourceKind,
};

const DEFAULT_ITERATIONS: u32 = 20;
const DEFAULT_PERIOD: u64 = 6;
const BEAT_PERIOD: u64 = 3;

/// Everything a step may touch: the façade for cluster work, the
/// accumulated context, and a staging area for status writes that the
/// engine commits. Steps never patch the API themselves.
pub struct StepCx<'a> {
    pub reconciler: &'a DjangoReconciler,
    pub context: &'a Value,
    pub status: &'a DjangoStatus,
    pub retry: u32,
    pub staged: &'a mut PatchSet,
    pub events: &'a EventPublisher,
}

/// Run one step. The returned mapping is merged into the persisted
/// pipeline context by the engine.
pub async fn run(step: StepName, cx: &mut StepCx<'_>) -> Result<Value> {
    match step {
        StepName::StartMgmt => start_mgmt(cx).await,
        StepName::AwaitMgmt => await_mgmt(cx).await,
        StepName::StartApp => start_deployment(cx, "app").await,
        StepName::AwaitApp => await_deployment(cx, "app").await,
        StepName::StartWorker => start_deployment(cx, "worker").await,
        StepName::AwaitWorker => await_deployment(cx, "worker").await,
        StepName::StartBeat => start_deployment(cx, "beat").await,
        StepName::AwaitBeat => await_deployment(cx, "beat").await,
        StepName::MigrateService => migrate_service(cx).await,
        StepName::Cleanup => cleanup(cx).await,
    }
}

/// The waiting-step contract: not ready under the cap reschedules, not
/// ready at the cap degrades, ready returns an empty context patch.
fn wait_gate(ready: bool, retry: u32, bounds: (u32, u64), noun: &str) -> Result<Value> {
    let (iterations, period) = bounds;
    if ready {
        return Ok(json!({}));
    }
    if retry >= iterations {
        return Err(Error::degraded(format!(
            "{noun} took too long. Manual intervention required!"
        )));
    }
    Err(Error::wait(
        period,
        format!("The {noun} is not complete. Waiting."),
    ))
}

fn bounds_from(spec: Option<&WaitBounds>, default_period: u64) -> (u32, u64) {
    (
        spec.and_then(|b| b.iterations).unwrap_or(DEFAULT_ITERATIONS),
        spec.and_then(|b| b.period).unwrap_or(default_period),
    )
}

async fn start_mgmt(cx: &mut StepCx<'_>) -> Result<Value> {
    info!("setting up redis deployment");
    let created = cx.reconciler.ensure_redis().await?;

    let spec = cx.reconciler.spec();
    let migration_version = cx
        .status
        .migration_version
        .clone()
        .unwrap_or_else(|| "zero".to_string());
    let mut mgmt_pod = None;
    if !spec.always_run_migrations && migration_version == cx.reconciler.version() {
        info!(
            version = cx.reconciler.version(),
            "already migrated; skipping management commands"
        );
    } else {
        info!("beginning management commands");
        mgmt_pod = cx.reconciler.start_manage_commands().await?;
    }
    Ok(json!({"mgmt_pod_name": mgmt_pod, "created": created}))
}

async fn await_mgmt(cx: &mut StepCx<'_>) -> Result<Value> {
    let bounds = bounds_from(
        cx.reconciler.spec().init_manage_timeouts.as_ref(),
        DEFAULT_PERIOD,
    );
    let mut ready = true;
    if let Some(pod_name) = pathmap::get_str(cx.context, "mgmt_pod_name") {
        let phase = match cx.reconciler.pod_phase(pod_name).await {
            Ok(phase) => phase,
            Err(_) => "unknown".to_string(),
        };
        if phase == "failed" || phase == "unknown" {
            cx.events
                .warning(
                    "ManageCommandFailure",
                    format!("Management pod `{pod_name}` reached phase `{phase}`"),
                )
                .await;
            return Err(Error::degraded(
                "management commands have failed. Manual intervention required!",
            ));
        }
        if phase == "succeeded" {
            cx.reconciler.clean_manage_commands(pod_name).await?;
            cx.staged
                .status("migrationVersion", json!(cx.reconciler.version()));
        } else {
            ready = false;
        }
    }
    wait_gate(ready, cx.retry, bounds, "management commands")
}

async fn start_deployment(cx: &mut StepCx<'_>, purpose: &str) -> Result<Value> {
    let recorded = cx
        .status
        .created
        .as_ref()
        .and_then(|created| created.get("deployment"))
        .and_then(|purposes| purposes.get(purpose))
        .cloned();
    info!(purpose, "setting up green deployment");
    let created = match purpose {
        // The app's blue keeps serving traffic until the service cuts
        // over; worker and beat are cut over immediately.
        "app" => cx.reconciler.start_green("app").await?,
        "worker" => cx.reconciler.migrate_worker().await?,
        _ => cx.reconciler.migrate_beat().await?,
    };
    let green = pathmap::get_str(&created, &format!("deployment.{purpose}"));
    // Don't record the object just ensured as a blue to tear down when
    // the version did not actually change.
    let blue = match (recorded, green) {
        (Some(recorded), Some(green)) if recorded == green => None,
        (recorded, _) => recorded,
    };
    let mut output = serde_json::Map::new();
    output.insert(format!("blue_{purpose}"), json!(blue));
    output.insert("created".to_string(), created);
    Ok(Value::Object(output))
}

async fn await_deployment(cx: &mut StepCx<'_>, purpose: &str) -> Result<Value> {
    let period = if purpose == "beat" {
        BEAT_PERIOD
    } else {
        DEFAULT_PERIOD
    };
    let bounds = bounds_from(cx.reconciler.spec().pipeline_step.as_ref(), period);
    let ready = match pathmap::get_str(cx.context, &format!("created.deployment.{purpose}")) {
        Some(name) => {
            cx.reconciler
                .deployment_reached_condition(name, "Available")
                .await?
        }
        None => false,
    };
    if !ready && purpose == "app" && cx.retry >= bounds.0 {
        cx.events
            .warning("AppPodNotReady", "Green app deployment never became Available")
            .await;
    }
    wait_gate(
        ready,
        cx.retry,
        bounds,
        &format!("{purpose} deployment"),
    )
}

async fn migrate_service(cx: &mut StepCx<'_>) -> Result<Value> {
    info!("migrating service to green app deployment");
    let created = cx.reconciler.migrate_service().await?;
    cx.staged.status("version", json!(cx.reconciler.version()));
    Ok(json!({"created": created}))
}

/// The seven standing resources plus any enabled autoscalers.
pub(crate) fn create_targets(spec: &crate::crd::DjangoSpec) -> Vec<String> {
    let mut targets = vec![
        "deployment.app".to_string(),
        "deployment.beat".to_string(),
        "deployment.redis".to_string(),
        "deployment.worker".to_string(),
        "ingress.app".to_string(),
        "service.app".to_string(),
        "service.redis".to_string(),
    ];
    for purpose in ["app", "worker"] {
        if spec
            .autoscalers
            .get(purpose)
            .map(|autoscaler| autoscaler.enabled)
            .unwrap_or(false)
        {
            targets.push(format!("horizontalpodautoscaler.{purpose}"));
        }
    }
    targets
}

pub(crate) fn targets_resolved(created: &Value, targets: &[String]) -> bool {
    targets
        .iter()
        .all(|target| pathmap::get(created, target).is_some_and(|value| !value.is_null()))
}

async fn cleanup(cx: &mut StepCx<'_>) -> Result<Value> {
    let created = pathmap::get(cx.context, "created")
        .cloned()
        .unwrap_or_else(|| json!({}));
    let targets = create_targets(cx.reconciler.spec());
    let complete = targets_resolved(&created, &targets);

    if complete {
        cx.staged.status("created", created.clone());
        for purpose in ["beat", "worker", "app"] {
            let blue = pathmap::get_str(cx.context, &format!("blue_{purpose}"));
            cx.reconciler.clean_blue(blue).await?;
        }
        info!("all that was green is now blue");
    } else {
        info!("migration was incomplete; rolling back to prior state");
        for purpose in ["beat", "worker", "app"] {
            let green = pathmap::get_str(&created, &format!("deployment.{purpose}"));
            let blue = cx
                .status
                .created
                .as_ref()
                .and_then(|recorded| recorded.get("deployment"))
                .and_then(|purposes| purposes.get(purpose))
                .cloned();
            if let Some(green) = green {
                if blue.as_deref() != Some(green) {
                    cx.reconciler
                        .delete_resource(ResourceKind::Deployment, green)
                        .await?;
                }
            }
        }
        if let Some(pod_name) = pathmap::get_str(cx.context, "mgmt_pod_name") {
            cx.reconciler
                .delete_resource(ResourceKind::Pod, pod_name)
                .await?;
        }
    }
    Ok(json!({"migration_complete": complete}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::DjangoSpec;

    fn spec_with_autoscalers(app: bool, worker: bool) -> DjangoSpec {
        serde_json::from_value(json!({
            "host": "a.example.com",
            "image": "img",
            "version": "1.0.0",
            "clusterIssuer": "le",
            "autoscalers": {
                "app": {"enabled": app, "cpuUtilizationThreshold": 60,
                        "replicas": {"minimum": 1, "maximum": 4}},
                "worker": {"enabled": worker, "cpuUtilizationThreshold": 60,
                           "replicas": {"minimum": 1, "maximum": 10}},
            },
        }))
        .unwrap()
    }

    #[test]
    fn wait_gate_ready_returns_empty_patch() {
        assert_eq!(wait_gate(true, 19, (20, 6), "thing").unwrap(), json!({}));
    }

    #[test]
    fn wait_gate_reschedules_below_the_cap() {
        let err = wait_gate(false, 3, (20, 6), "thing").unwrap_err();
        match err {
            Error::Wait { delay, .. } => {
                assert_eq!(delay, std::time::Duration::from_secs(6));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wait_gate_degrades_at_the_cap() {
        let err = wait_gate(false, 20, (20, 6), "thing").unwrap_err();
        assert!(matches!(err, Error::Degraded(_)));
        // spec-provided caps are honored
        let err = wait_gate(false, 10, (10, 12), "thing").unwrap_err();
        assert!(matches!(err, Error::Degraded(_)));
    }

    #[test]
    fn bounds_prefer_spec_values() {
        let bounds = WaitBounds {
            iterations: Some(13),
            period: Some(12),
        };
        assert_eq!(bounds_from(Some(&bounds), DEFAULT_PERIOD), (13, 12));
        assert_eq!(bounds_from(None, DEFAULT_PERIOD), (20, 6));
        assert_eq!(bounds_from(None, BEAT_PERIOD), (20, 3));
    }

    #[test]
    fn create_targets_include_enabled_autoscalers() {
        let targets = create_targets(&spec_with_autoscalers(true, false));
        assert!(targets.contains(&"horizontalpodautoscaler.app".to_string()));
        assert!(!targets.contains(&"horizontalpodautoscaler.worker".to_string()));
        assert_eq!(targets.len(), 8);

        let targets = create_targets(&spec_with_autoscalers(false, false));
        assert_eq!(targets.len(), 7);
    }

    #[test]
    fn targets_resolve_only_when_every_name_is_present() {
        let targets = create_targets(&spec_with_autoscalers(false, false));
        let complete = json!({
            "deployment": {
                "app": "app-1-0-0", "beat": "beat-1-0-0",
                "worker": "worker-1-0-0", "redis": "redis",
            },
            "service": {"app": "app", "redis": "redis"},
            "ingress": {"app": "app"},
        });
        assert!(targets_resolved(&complete, &targets));

        let mut missing_beat = complete.clone();
        missing_beat["deployment"]
            .as_object_mut()
            .unwrap()
            .remove("beat");
        assert!(!targets_resolved(&missing_beat, &targets));

        let mut null_ingress = complete.clone();
        null_ingress["ingress"]["app"] = Value::Null;
        assert!(!targets_resolved(&null_ingress, &targets));
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::{
    crd::{
        Condition, Django, DjangoSpec, DjangoStatus, MIGRATION_STEP_LABEL, spec_fingerprint,
    },
    error::{Error, Result},
    events::EventPublisher,
    manifests::ManifestCatalog,
    pathmap,
    reconciler::DjangoReconciler,
    steps,
};

/// Reserved label tokens flanking the ordered step list.
pub const READY: &str = "ready";
pub const DONE: &str = "done";

/// The ordered migration steps; the label value is the protocol token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepName {
    StartMgmt,
    AwaitMgmt,
    StartApp,
    AwaitApp,
    StartWorker,
    AwaitWorker,
    StartBeat,
    AwaitBeat,
    MigrateService,
    Cleanup,
}

impl StepName {
    pub const ORDERED: [StepName; 10] = [
        StepName::StartMgmt,
        StepName::AwaitMgmt,
        StepName::StartApp,
        StepName::AwaitApp,
        StepName::StartWorker,
        StepName::AwaitWorker,
        StepName::StartBeat,
        StepName::AwaitBeat,
        StepName::MigrateService,
        StepName::Cleanup,
    ];

    pub fn first() -> StepName {
        StepName::ORDERED[0]
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            StepName::StartMgmt => "start-mgmt",
            StepName::AwaitMgmt => "await-mgmt",
            StepName::StartApp => "start-app",
            StepName::AwaitApp => "await-app",
            StepName::StartWorker => "start-worker",
            StepName::AwaitWorker => "await-worker",
            StepName::StartBeat => "start-beat",
            StepName::AwaitBeat => "await-beat",
            StepName::MigrateService => "migrate-service",
            StepName::Cleanup => "cleanup",
        }
    }

    pub fn parse(raw: &str) -> Option<StepName> {
        StepName::ORDERED
            .into_iter()
            .find(|step| step.as_label() == raw)
    }

    /// The step after this one; `None` past the end of the list.
    pub fn next(&self) -> Option<StepName> {
        let index = StepName::ORDERED
            .iter()
            .position(|step| step == self)
            .unwrap_or(StepName::ORDERED.len());
        StepName::ORDERED.get(index + 1).copied()
    }
}

/// Where the label protocol stands for one Django object. A missing
/// label reads as `Ready` so that freshly created objects initiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Ready,
    Step(StepName),
    Done,
}

impl PipelineState {
    pub fn parse(label: Option<&str>) -> Option<PipelineState> {
        match label {
            None => Some(PipelineState::Ready),
            Some(READY) => Some(PipelineState::Ready),
            Some(DONE) => Some(PipelineState::Done),
            Some(raw) => StepName::parse(raw).map(PipelineState::Step),
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            PipelineState::Ready => READY,
            PipelineState::Done => DONE,
            PipelineState::Step(step) => step.as_label(),
        }
    }
}

/// Status and label writes staged during one event, committed by the
/// controller as a status patch followed by a metadata patch. That
/// ordering keeps the observable invariant: either "step N with context
/// N" or "step N+1 with context N merged".
#[derive(Debug, Default)]
pub struct PatchSet {
    status: serde_json::Map<String, Value>,
    labels: BTreeMap<String, String>,
}

impl PatchSet {
    pub fn status(&mut self, key: &str, value: Value) {
        self.status.insert(key.to_string(), value);
    }

    pub fn label(&mut self, key: &str, value: &str) {
        self.labels.insert(key.to_string(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_empty() && self.labels.is_empty()
    }

    pub fn status_patch(&self) -> Option<Value> {
        (!self.status.is_empty()).then(|| json!({"status": Value::Object(self.status.clone())}))
    }

    pub fn metadata_patch(&self) -> Option<Value> {
        (!self.labels.is_empty()).then(|| json!({"metadata": {"labels": self.labels}}))
    }
}

/// What the controller should do after one pipeline invocation.
#[derive(Debug)]
pub enum Outcome {
    /// The label advanced (or the pipeline initiated/finalized); the
    /// resulting watch event drives the next step.
    Progressed,
    /// A waiting step has not converged; requeue after the delay.
    Waiting(Duration),
    /// Degraded; wait for a human.
    Halted,
    /// Steady state at `ready`; requeue on the monitor cadence.
    Steady,
}

/// Should the pipeline initiate? True when the live spec's fingerprint
/// differs from the one recorded at the last finalize, i.e. when the
/// change touches something outside `metadata.*`.
pub(crate) fn initiation_needed(status: &DjangoStatus, live_spec: &DjangoSpec) -> bool {
    status.spec_fingerprint.as_deref() != Some(spec_fingerprint(live_spec).as_str())
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FinalizeDecision {
    Complete,
    Incomplete,
    Restart,
}

pub(crate) fn finalize_decision(
    snapshot: &DjangoSpec,
    live_spec: &DjangoSpec,
    context: &Value,
) -> FinalizeDecision {
    if snapshot != live_spec {
        return FinalizeDecision::Restart;
    }
    let complete = pathmap::get(context, "migration_complete")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if complete {
        FinalizeDecision::Complete
    } else {
        FinalizeDecision::Incomplete
    }
}

/// The migration pipeline for one Django object and one event: reads
/// the label to pick a step, runs it against the persisted context, and
/// stages the advance.
pub struct MigrationPipeline {
    client: Client,
    catalog: ManifestCatalog,
    django: Arc<Django>,
    events: EventPublisher,
    live_spec: DjangoSpec,
    snapshot: DjangoSpec,
    status: DjangoStatus,
}

impl MigrationPipeline {
    pub fn new(
        client: Client,
        catalog: ManifestCatalog,
        django: Arc<Django>,
        events: EventPublisher,
    ) -> Self {
        let status = django.status.clone().unwrap_or_default();
        let live_spec = django.spec.clone();
        // A spec change mid-migration must not corrupt the in-flight
        // pipeline; steps always see the snapshot.
        let snapshot = status.pipeline_spec.clone().unwrap_or_else(|| live_spec.clone());
        MigrationPipeline {
            client,
            catalog,
            django,
            events,
            live_spec,
            snapshot,
            status,
        }
    }

    pub fn status(&self) -> &DjangoStatus {
        &self.status
    }

    pub async fn run(&self) -> Result<(Outcome, PatchSet)> {
        let label = self
            .django
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(MIGRATION_STEP_LABEL))
            .map(String::as_str);
        let Some(state) = PipelineState::parse(label) else {
            warn!(label = label.unwrap_or_default(), "unrecognized migration-step label; waiting for operator intervention");
            return Ok((Outcome::Halted, PatchSet::default()));
        };
        debug!(step = state.as_label(), "running pipeline");
        match state {
            PipelineState::Ready => self.handle_initiate().await,
            PipelineState::Done => self.handle_finalize().await,
            PipelineState::Step(step) => self.handle_step(step).await,
        }
    }

    async fn handle_initiate(&self) -> Result<(Outcome, PatchSet)> {
        if !initiation_needed(&self.status, &self.live_spec) {
            debug!("changes appear to only touch metadata; skipping");
            return Ok((Outcome::Steady, PatchSet::default()));
        }
        self.initiate().await
    }

    /// Start a new pipeline run against the live spec. Also the entry
    /// point for the monitor when an owned object has gone missing.
    pub async fn initiate(&self) -> Result<(Outcome, PatchSet)> {
        // Validate by fire before the first step label is set; a spec
        // missing required fields never starts a pipeline.
        if let Err(Error::MissingField(field)) = DjangoReconciler::new(
            self.client.clone(),
            self.catalog.clone(),
            &self.django,
            self.live_spec.clone(),
            self.status.clone(),
        ) {
            error!(field, "spec missing required field");
            self.events
                .warning("ConfigError", format!("Spec missing required field `{field}`"))
                .await;
            let mut patch = PatchSet::default();
            patch.status("condition", json!(Condition::Degraded));
            return Ok((Outcome::Halted, patch));
        }

        info!(
            from = self.status.version.as_deref().unwrap_or("new"),
            to = self.live_spec.version.as_deref().unwrap_or_default(),
            "initiating migration pipeline"
        );
        self.events.info("Migrating", "Enacting new config").await;

        let mut patch = PatchSet::default();
        patch.status("pipelineSpec", serde_json::to_value(&self.live_spec)?);
        patch.status("condition", json!(Condition::Migrating));
        patch.status("migration_pipeline", json!({}));
        patch.status("pipelineRetries", Value::Null);
        patch.label(MIGRATION_STEP_LABEL, StepName::first().as_label());
        Ok((Outcome::Progressed, patch))
    }

    async fn handle_finalize(&self) -> Result<(Outcome, PatchSet)> {
        let context = self
            .status
            .migration_pipeline
            .clone()
            .unwrap_or_else(|| json!({}));
        let mut patch = PatchSet::default();
        match finalize_decision(&self.snapshot, &self.live_spec, &context) {
            FinalizeDecision::Complete => {
                info!("migration complete");
                self.events.info("Ready", "New config running").await;
                patch.status("condition", json!(Condition::Running));
                self.clear_pipeline(&mut patch);
                patch.label(MIGRATION_STEP_LABEL, READY);
            }
            FinalizeDecision::Incomplete => {
                error!("migration incomplete; manual intervention required");
                patch.status("condition", json!(Condition::Degraded));
                self.clear_pipeline(&mut patch);
                patch.label(MIGRATION_STEP_LABEL, READY);
            }
            FinalizeDecision::Restart => {
                info!("object changed during migration; starting new migration");
                patch.status("pipelineSpec", serde_json::to_value(&self.live_spec)?);
                patch.status("migration_pipeline", json!({}));
                patch.status("pipelineRetries", Value::Null);
                patch.label(MIGRATION_STEP_LABEL, StepName::first().as_label());
            }
        }
        Ok((Outcome::Progressed, patch))
    }

    fn clear_pipeline(&self, patch: &mut PatchSet) {
        patch.status("pipelineSpec", Value::Null);
        patch.status("migration_pipeline", Value::Null);
        patch.status("pipelineRetries", Value::Null);
        patch.status(
            "specFingerprint",
            json!(spec_fingerprint(&self.live_spec)),
        );
    }

    async fn handle_step(&self, step: StepName) -> Result<(Outcome, PatchSet)> {
        if self.status.condition == Some(Condition::Degraded) {
            debug!(
                step = step.as_label(),
                "pipeline is degraded; waiting for operator intervention"
            );
            return Ok((Outcome::Halted, PatchSet::default()));
        }

        let reconciler = match DjangoReconciler::new(
            self.client.clone(),
            self.catalog.clone(),
            &self.django,
            self.snapshot.clone(),
            self.status.clone(),
        ) {
            Ok(reconciler) => reconciler,
            Err(Error::MissingField(field)) => {
                self.events
                    .warning("ConfigError", format!("Spec missing required field `{field}`"))
                    .await;
                let mut patch = PatchSet::default();
                patch.status("condition", json!(Condition::Degraded));
                return Ok((Outcome::Halted, patch));
            }
            Err(err) => return Err(err),
        };

        let context = self
            .status
            .migration_pipeline
            .clone()
            .unwrap_or_else(|| json!({}));
        let retry = self.status.pipeline_retries.unwrap_or(0);
        let mut staged = PatchSet::default();

        let result = steps::run(
            step,
            &mut steps::StepCx {
                reconciler: &reconciler,
                context: &context,
                status: &self.status,
                retry,
                staged: &mut staged,
                events: &self.events,
            },
        )
        .await;

        match result {
            Ok(output) => {
                let mut merged = context;
                pathmap::merge(&mut merged, &output)?;
                staged.status("migration_pipeline", merged);
                staged.status("pipelineRetries", Value::Null);
                let next = step
                    .next()
                    .map(|next| next.as_label())
                    .unwrap_or(DONE);
                info!(step = step.as_label(), next, "pipeline step complete");
                staged.label(MIGRATION_STEP_LABEL, next);
                Ok((Outcome::Progressed, staged))
            }
            Err(Error::Wait { delay, reason }) => {
                info!(step = step.as_label(), retry, reason = %reason, "pipeline step waiting");
                staged.status("pipelineRetries", json!(retry + 1));
                Ok((Outcome::Waiting(delay), staged))
            }
            Err(Error::Degraded(reason)) => {
                error!(step = step.as_label(), reason = %reason, "pipeline degraded");
                staged.status("condition", json!(Condition::Degraded));
                Ok((Outcome::Halted, staged))
            }
            Err(Error::Scaling(reason)) => {
                error!(step = step.as_label(), reason = %reason, "autoscaler misconfigured");
                self.events.warning("ScalingError", reason).await;
                staged.status("condition", json!(Condition::Degraded));
                Ok((Outcome::Halted, staged))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_version(version: &str) -> DjangoSpec {
        serde_json::from_value(json!({
            "host": "a.example.com",
            "image": "img",
            "version": version,
            "clusterIssuer": "le",
        }))
        .unwrap()
    }

    #[test]
    fn steps_walk_in_declared_order() {
        let mut labels = vec![READY.to_string()];
        let mut step = Some(StepName::first());
        while let Some(current) = step {
            labels.push(current.as_label().to_string());
            step = current.next();
        }
        labels.push(DONE.to_string());
        assert_eq!(
            labels,
            vec![
                "ready",
                "start-mgmt",
                "await-mgmt",
                "start-app",
                "await-app",
                "start-worker",
                "await-worker",
                "start-beat",
                "await-beat",
                "migrate-service",
                "cleanup",
                "done",
            ]
        );
    }

    #[test]
    fn state_parses_reserved_and_step_tokens() {
        assert_eq!(PipelineState::parse(None), Some(PipelineState::Ready));
        assert_eq!(PipelineState::parse(Some("ready")), Some(PipelineState::Ready));
        assert_eq!(PipelineState::parse(Some("done")), Some(PipelineState::Done));
        assert_eq!(
            PipelineState::parse(Some("await-worker")),
            Some(PipelineState::Step(StepName::AwaitWorker))
        );
        assert_eq!(PipelineState::parse(Some("not-a-step")), None);
    }

    #[test]
    fn initiation_skips_when_fingerprint_matches() {
        let spec = spec_with_version("1.0.0");
        let status = DjangoStatus {
            spec_fingerprint: Some(spec_fingerprint(&spec)),
            ..Default::default()
        };
        assert!(!initiation_needed(&status, &spec));
    }

    #[test]
    fn initiation_fires_on_cold_create_and_spec_change() {
        let spec = spec_with_version("1.0.0");
        assert!(initiation_needed(&DjangoStatus::default(), &spec));

        let status = DjangoStatus {
            spec_fingerprint: Some(spec_fingerprint(&spec)),
            ..Default::default()
        };
        assert!(initiation_needed(&status, &spec_with_version("1.0.1")));
    }

    #[test]
    fn finalize_complete_when_snapshot_matches_and_context_reports_done() {
        let spec = spec_with_version("1.0.0");
        assert_eq!(
            finalize_decision(&spec, &spec, &json!({"migration_complete": true})),
            FinalizeDecision::Complete
        );
    }

    #[test]
    fn finalize_incomplete_without_completion_flag() {
        let spec = spec_with_version("1.0.0");
        assert_eq!(
            finalize_decision(&spec, &spec, &json!({})),
            FinalizeDecision::Incomplete
        );
        assert_eq!(
            finalize_decision(&spec, &spec, &json!({"migration_complete": false})),
            FinalizeDecision::Incomplete
        );
    }

    #[test]
    fn finalize_restarts_on_spec_drift() {
        let snapshot = spec_with_version("1.0.0");
        let live = spec_with_version("2.0.0");
        assert_eq!(
            finalize_decision(&snapshot, &live, &json!({"migration_complete": true})),
            FinalizeDecision::Restart
        );
    }

    #[test]
    fn patchset_splits_status_and_labels() {
        let mut patch = PatchSet::default();
        assert!(patch.is_empty());
        patch.status("condition", json!("migrating"));
        patch.label(MIGRATION_STEP_LABEL, "start-mgmt");
        assert_eq!(
            patch.status_patch(),
            Some(json!({"status": {"condition": "migrating"}}))
        );
        assert_eq!(
            patch.metadata_patch(),
            Some(json!({"metadata": {"labels": {"migration-step": "start-mgmt"}}}))
        );
    }

    #[test]
    fn empty_patchset_produces_no_patches() {
        let patch = PatchSet::default();
        assert_eq!(patch.status_patch(), None);
        assert_eq!(patch.metadata_patch(), None);
    }
}

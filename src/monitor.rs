use std::collections::BTreeMap;

use kube::Client;
use tracing::{error, warn};

use crate::{
    manifests::ManifestCatalog,
    resources::{ResourceKind, ResourceService},
};

/// One owned object the steady-state scan found wanting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Drift {
    pub kind: String,
    pub purpose: String,
    pub name: String,
    pub reason: DriftReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriftReason {
    /// The read failed; the object is gone or unreachable.
    Missing,
    /// The object carries a deletion timestamp.
    Deleting,
}

/// Verify every object in the created inventory still exists and is not
/// being deleted. Runs only at `migration-step = ready`; any drift
/// re-initiates the pipeline, which recreates what is missing.
pub async fn scan(
    client: &Client,
    namespace: &str,
    catalog: &ManifestCatalog,
    created: &BTreeMap<String, BTreeMap<String, String>>,
) -> Vec<Drift> {
    let mut drifts = Vec::new();
    for (kind_label, purposes) in created {
        let Some(kind) = ResourceKind::parse(kind_label) else {
            warn!(kind = %kind_label, "unrecognized kind in created inventory");
            continue;
        };
        let service = ResourceService::new(client.clone(), namespace, kind, catalog.clone());
        for (purpose, name) in purposes {
            match service.read(name).await {
                Err(_) => {
                    error!(kind = %kind_label, purpose = %purpose, name = %name, "owned object missing");
                    drifts.push(Drift {
                        kind: kind_label.clone(),
                        purpose: purpose.clone(),
                        name: name.clone(),
                        reason: DriftReason::Missing,
                    });
                }
                Ok(obj) if obj.metadata.deletion_timestamp.is_some() => {
                    error!(kind = %kind_label, purpose = %purpose, name = %name, "owned object marked for deletion");
                    drifts.push(Drift {
                        kind: kind_label.clone(),
                        purpose: purpose.clone(),
                        name: name.clone(),
                        reason: DriftReason::Deleting,
                    });
                }
                Ok(_) => {}
            }
        }
    }
    drifts
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::error::RenderError;

/// Directory of manifest templates, `{kind}_{purpose}.yaml` plus
/// `horizontalpodautoscaler.yaml`. Placeholders are `{name}` tokens
/// substituted from the render parameters before the YAML is parsed.
#[derive(Clone, Debug)]
pub struct ManifestCatalog {
    root: PathBuf,
}

impl ManifestCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ManifestCatalog { root: root.into() }
    }

    /// Reads `MANIFEST_DIR`, falling back to `manifests` beside the
    /// operator binary's working directory.
    pub fn from_env() -> Self {
        let root = std::env::var("MANIFEST_DIR").unwrap_or_else(|_| "manifests".to_string());
        ManifestCatalog::new(root)
    }

    pub fn render(
        &self,
        template: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Value, RenderError> {
        let path = self.root.join(template);
        let text = std::fs::read_to_string(&path).map_err(|source| RenderError::Io {
            template: template.to_string(),
            source,
        })?;
        let rendered = substitute(template, &text, params)?;
        serde_yaml::from_str(&rendered).map_err(|source| RenderError::Yaml {
            template: template.to_string(),
            source,
        })
    }
}

/// Replace `{placeholder}` tokens with their parameter values. A token
/// is a brace-wrapped identifier (`[a-z0-9_]`); anything else passes
/// through untouched. An identifier with no matching parameter is an
/// error, matching the strictness of positional substitution.
fn substitute(
    template: &str,
    text: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, RenderError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder(&after[..close]) => {
                let name = &after[..close];
                match params.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(RenderError::UnknownPlaceholder {
                            template: template.to_string(),
                            placeholder: name.to_string(),
                        });
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn is_placeholder(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitute_replaces_known_placeholders() {
        let rendered = substitute(
            "t.yaml",
            "name: app-{version_slug}\nimage: {image}\n",
            &params(&[("version_slug", "1-0-0"), ("image", "img:1.0.0")]),
        )
        .unwrap();
        assert_eq!(rendered, "name: app-1-0-0\nimage: img:1.0.0\n");
    }

    #[test]
    fn substitute_rejects_unknown_placeholder() {
        let err = substitute("t.yaml", "host: {host}", &params(&[])).unwrap_err();
        match err {
            RenderError::UnknownPlaceholder {
                template,
                placeholder,
            } => {
                assert_eq!(template, "t.yaml");
                assert_eq!(placeholder, "host");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn substitute_leaves_non_placeholder_braces() {
        let rendered = substitute(
            "t.yaml",
            "selector: {matchLabels: {app: {slug}}}",
            &params(&[("slug", "x")]),
        )
        .unwrap();
        assert_eq!(rendered, "selector: {matchLabels: {app: x}}");
    }

    #[test]
    fn render_parses_substituted_yaml() {
        let dir = std::env::temp_dir().join("django-operator-manifest-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("deployment_sample.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: app-{version_slug}\n",
        )
        .unwrap();

        let catalog = ManifestCatalog::new(&dir);
        let body = catalog
            .render(
                "deployment_sample.yaml",
                &params(&[("version_slug", "2-0-1")]),
            )
            .unwrap();
        assert_eq!(body["metadata"]["name"], json!("app-2-0-1"));
        assert_eq!(body["kind"], json!("Deployment"));
    }

    #[test]
    fn render_missing_template_is_an_io_error() {
        let catalog = ManifestCatalog::new("does/not/exist");
        let err = catalog
            .render("deployment_nope.yaml", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }));
    }

    fn shipped_catalog() -> ManifestCatalog {
        ManifestCatalog::new(concat!(env!("CARGO_MANIFEST_DIR"), "/manifests"))
    }

    fn shipped_params() -> BTreeMap<String, String> {
        params(&[
            ("namespace", "ns"),
            ("host", "a.example.com"),
            ("common_name", "example.com"),
            ("image", "img:1.0.0"),
            ("version", "1.0.0"),
            ("version_slug", "1-0-0"),
            ("cluster_issuer", "le"),
            ("purpose", "app"),
            ("app_port", "8000"),
            ("redis_port", "6379"),
            ("app_cpu_request", "100m"),
            ("app_memory_request", "200Mi"),
            ("worker_cpu_request", "30m"),
            ("worker_memory_request", "250Mi"),
            ("beat_cpu_request", "10m"),
            ("beat_memory_request", "200Mi"),
            ("deployment_name", "app-1-0-0"),
            ("cpu_threshold", "60"),
            ("min_replicas", "1"),
            ("max_replicas", "4"),
            ("current_replicas", "2"),
        ])
    }

    #[test]
    fn shipped_workloads_are_version_suffixed() {
        let catalog = shipped_catalog();
        let params = shipped_params();
        for (template, name) in [
            ("deployment_app.yaml", "app-1-0-0"),
            ("deployment_worker.yaml", "worker-1-0-0"),
            ("deployment_beat.yaml", "beat-1-0-0"),
            ("pod_migrations.yaml", "migrations-1-0-0"),
        ] {
            let body = catalog.render(template, &params).unwrap();
            assert_eq!(body["metadata"]["name"], json!(name), "{template}");
        }
    }

    #[test]
    fn shipped_singletons_carry_fixed_names() {
        let catalog = shipped_catalog();
        let params = shipped_params();
        for (template, name) in [
            ("deployment_redis.yaml", "redis"),
            ("service_redis.yaml", "redis"),
            ("service_app.yaml", "app"),
            ("ingress_app.yaml", "app"),
            ("horizontalpodautoscaler.yaml", "app"),
        ] {
            let body = catalog.render(template, &params).unwrap();
            assert_eq!(body["metadata"]["name"], json!(name), "{template}");
        }
    }

    #[test]
    fn shipped_service_selects_green_pods() {
        let body = shipped_catalog()
            .render("service_app.yaml", &shipped_params())
            .unwrap();
        assert_eq!(body["spec"]["selector"]["app"], json!("app-1-0-0"));
        assert_eq!(body["spec"]["ports"][0]["targetPort"], json!(8000));
    }

    #[test]
    fn shipped_ingress_carries_tls_and_issuer() {
        let body = shipped_catalog()
            .render("ingress_app.yaml", &shipped_params())
            .unwrap();
        assert_eq!(
            body["metadata"]["annotations"]["cert-manager.io/cluster-issuer"],
            json!("le")
        );
        assert_eq!(
            body["metadata"]["annotations"]["cert-manager.io/common-name"],
            json!("example.com")
        );
        assert_eq!(body["spec"]["tls"][0]["hosts"][0], json!("a.example.com"));
        assert_eq!(body["spec"]["rules"][0]["host"], json!("a.example.com"));
    }

    #[test]
    fn shipped_autoscaler_targets_the_green_deployment() {
        let body = shipped_catalog()
            .render("horizontalpodautoscaler.yaml", &shipped_params())
            .unwrap();
        assert_eq!(
            body["spec"]["scaleTargetRef"]["name"],
            json!("app-1-0-0")
        );
        assert_eq!(body["spec"]["minReplicas"], json!(1));
        assert_eq!(body["spec"]["maxReplicas"], json!(4));
        assert_eq!(body["spec"]["targetCPUUtilizationPercentage"], json!(60));
    }
}

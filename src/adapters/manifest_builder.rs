//! Builds the objects shipped in `manifests/controller.yaml`

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, Namespace, PodSecurityContext,
    PodSpec, PodTemplateSpec, Probe, ResourceRequirements, SecretKeySelector, SecurityContext,
    Service, ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;

use crate::{Error, Result};

const APP_NAME: &str = "kubespresso";
const DEFAULT_IMAGE: &str = "ghcr.io/kubespresso/kubespresso:latest";
const TOKEN_SECRET: &str = "kubespresso-coffee-machine";
const TOKEN_SECRET_KEY: &str = "token";

/// Knobs for the generated manifest
#[derive(Clone, Debug)]
pub struct ManifestOptions {
    pub namespace: String,
    pub image: String,
    pub metrics_port: u16,
    pub coffee_machine_url: String,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self {
            namespace: APP_NAME.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            metrics_port: 8080,
            coffee_machine_url: "http://coffee-machine.local".to_string(),
        }
    }
}

pub fn build_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), APP_NAME.to_string());
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "controller".to_string(),
    );
    labels
}

fn metadata(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(build_labels()),
        ..Default::default()
    }
}

pub fn build_namespace(opts: &ManifestOptions) -> Namespace {
    Namespace {
        metadata: metadata(&opts.namespace, None),
        ..Default::default()
    }
}

pub fn build_service_account(opts: &ManifestOptions) -> ServiceAccount {
    ServiceAccount {
        metadata: metadata(APP_NAME, Some(&opts.namespace)),
        ..Default::default()
    }
}

/// Cluster-wide access to Jobs: watch them and annotate served ones
pub fn build_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: metadata(APP_NAME, None),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["batch".to_string()]),
            resources: Some(vec!["jobs".to_string()]),
            verbs: ["get", "list", "watch", "patch"]
                .iter()
                .map(|v| v.to_string())
                .collect(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

pub fn build_cluster_role_binding(opts: &ManifestOptions) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: metadata(APP_NAME, None),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: APP_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: APP_NAME.to_string(),
            namespace: Some(opts.namespace.clone()),
            ..Default::default()
        }]),
    }
}

/// Single replica Deployment running the controller
pub fn build_deployment(opts: &ManifestOptions) -> Deployment {
    let labels = build_labels();

    Deployment {
        metadata: metadata(APP_NAME, Some(&opts.namespace)),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            // two controllers would brew twice
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(build_pod_spec(opts)),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_pod_spec(opts: &ManifestOptions) -> PodSpec {
    let container = Container {
        name: APP_NAME.to_string(),
        image: Some(opts.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(vec![
            EnvVar {
                name: "KUBESPRESSO_COFFEE_MACHINE_URL".to_string(),
                value: Some(opts.coffee_machine_url.clone()),
                ..Default::default()
            },
            EnvVar {
                name: "KUBESPRESSO_COFFEE_MACHINE_TOKEN".to_string(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: TOKEN_SECRET.to_string(),
                        key: TOKEN_SECRET_KEY.to_string(),
                        optional: Some(true),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            EnvVar {
                name: "KUBESPRESSO_METRICS_PORT".to_string(),
                value: Some(opts.metrics_port.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "RUST_LOG".to_string(),
                value: Some("info,kubespresso=debug".to_string()),
                ..Default::default()
            },
        ]),
        ports: Some(vec![ContainerPort {
            name: Some("metrics".to_string()),
            container_port: i32::from(opts.metrics_port),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        liveness_probe: Some(http_probe("/healthz", 10, 10)),
        readiness_probe: Some(http_probe("/readyz", 5, 5)),
        resources: Some(ResourceRequirements {
            requests: Some(quantities(&[("cpu", "10m"), ("memory", "32Mi")])),
            limits: Some(quantities(&[("memory", "128Mi")])),
            ..Default::default()
        }),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            read_only_root_filesystem: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };

    PodSpec {
        service_account_name: Some(APP_NAME.to_string()),
        containers: vec![container],
        security_context: Some(PodSecurityContext {
            run_as_non_root: Some(true),
            run_as_user: Some(65532),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn http_probe(path: &str, initial_delay: i32, period: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::String("metrics".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        timeout_seconds: Some(3),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

fn quantities(pairs: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect()
}

/// ClusterIP Service exposing the metrics port for scraping
pub fn build_service(opts: &ManifestOptions) -> Service {
    let mut annotations = BTreeMap::new();
    annotations.insert("prometheus.io/scrape".to_string(), "true".to_string());
    annotations.insert(
        "prometheus.io/port".to_string(),
        opts.metrics_port.to_string(),
    );

    let mut meta = metadata(APP_NAME, Some(&opts.namespace));
    meta.annotations = Some(annotations);

    Service {
        metadata: meta,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(build_labels()),
            ports: Some(vec![ServicePort {
                name: Some("metrics".to_string()),
                port: i32::from(opts.metrics_port),
                target_port: Some(IntOrString::String("metrics".to_string())),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn to_yaml<T: Serialize>(object: &T) -> Result<String> {
    serde_yaml::to_string(object)
        .map_err(|e| Error::Config(format!("Failed to serialize manifest: {}", e)))
}

/// All controller objects as a multi-document YAML stream
pub fn render_manifest(opts: &ManifestOptions) -> Result<String> {
    let documents = vec![
        to_yaml(&build_namespace(opts))?,
        to_yaml(&build_service_account(opts))?,
        to_yaml(&build_cluster_role())?,
        to_yaml(&build_cluster_role_binding(opts))?,
        to_yaml(&build_deployment(opts))?,
        to_yaml(&build_service(opts))?,
    ];

    let mut out = String::new();
    for doc in documents {
        out.push_str("---\n");
        out.push_str(&doc);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_role_only_touches_jobs() {
        let role = build_cluster_role();
        let rules = role.rules.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].resources.as_ref().unwrap(), &vec!["jobs".to_string()]);
        assert!(rules[0].verbs.contains(&"watch".to_string()));
        assert!(rules[0].verbs.contains(&"patch".to_string()));
        assert!(!rules[0].verbs.contains(&"delete".to_string()));
    }

    #[test]
    fn binding_points_at_service_account_namespace() {
        let opts = ManifestOptions {
            namespace: "tools".to_string(),
            ..Default::default()
        };
        let binding = build_cluster_role_binding(&opts);
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.kind, "ServiceAccount");
        assert_eq!(subject.namespace.as_deref(), Some("tools"));
        assert_eq!(binding.role_ref.name, APP_NAME);
    }

    #[test]
    fn deployment_runs_one_replica_with_probes() {
        let deployment = build_deployment(&ManifestOptions::default());
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));
        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.service_account_name.as_deref(), Some(APP_NAME));
        let container = &pod.containers[0];
        assert_eq!(
            container.image.as_deref(),
            Some("ghcr.io/kubespresso/kubespresso:latest")
        );
        let liveness = container.liveness_probe.as_ref().unwrap();
        assert_eq!(
            liveness.http_get.as_ref().unwrap().path.as_deref(),
            Some("/healthz")
        );
    }

    #[test]
    fn rendered_manifest_has_all_documents() {
        let yaml = render_manifest(&ManifestOptions::default()).unwrap();
        assert_eq!(yaml.matches("---\n").count(), 6);
        for kind in [
            "kind: Namespace",
            "kind: ServiceAccount",
            "kind: ClusterRole\n",
            "kind: ClusterRoleBinding",
            "kind: Deployment",
            "kind: Service\n",
        ] {
            assert!(yaml.contains(kind), "missing {}", kind);
        }
    }
}

//! Names and identities of every object the controller manages.
//!
//! The stack moved from a `kafka-*` naming scheme to `observability-*`. Both
//! schemes are addressed from here so that the sync stages and the migration
//! gate agree on which identity is current and which is legacy.

use crate::types::object::{Kind, ObjectRef, Selector};
use crate::types::spec::Observability;

pub const PROMETHEUS_DEFAULT_NAME: &str = "observability-prometheus";
pub const PROMETHEUS_OLD_DEFAULT_NAME: &str = "kafka-prometheus";
pub const ALERTMANAGER_DEFAULT_NAME: &str = "observability-alertmanager";
pub const ALERTMANAGER_OLD_DEFAULT_NAME: &str = "kafka-alertmanager";
pub const GRAFANA_DEFAULT_NAME: &str = "observability-grafana";
pub const GRAFANA_OLD_DEFAULT_NAME: &str = "kafka-grafana";
pub const PROMTAIL_DEFAULT_NAME: &str = "observability-promtail";
pub const PROMTAIL_OLD_DEFAULT_NAME: &str = "kafka-promtail";

pub const PROMETHEUS_CATALOG_SOURCE: &str = "prometheus-catalogsource";
pub const PROMETHEUS_CATALOG_IMAGE: &str = "quay.io/integreatly/custom-prometheus-index:1.0.0";
pub const PROMETHEUS_SUBSCRIPTION: &str = "prometheus-subscription";
pub const PROMETHEUS_OPERATOR_GROUP: &str = "observability-operatorgroup";
pub const PROMETHEUS_OPERATOR_DEPLOYMENT: &str = "prometheus-operator";

/// The one stale installation the drift guard knows how to remove.
pub const STALE_PROMETHEUS_CSV: &str = "prometheusoperator.0.56.3";

pub const TOKEN_SECRET: &str = "observatorium-credentials";
pub const GRAFANA_BASE_IMAGE: &str = "docker.io/grafana/grafana:";
pub const PROMTAIL_IMAGE: &str = "docker.io/grafana/promtail:2.4.2";
pub const PRIORITY_CLASS_NAME: &str = "observability-priority";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "observability-operator";

fn name_or_default<'a>(configured: &'a str, default: &'a str) -> &'a str {
    if configured.is_empty() {
        default
    } else {
        configured
    }
}

// ---------------------------------------------------------------------------
// Metrics engine
// ---------------------------------------------------------------------------

pub fn prometheus_name(cr: &Observability) -> &str {
    name_or_default(&cr.spec.prometheus_default_name, PROMETHEUS_DEFAULT_NAME)
}

pub fn prometheus(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::Prometheus, &cr.namespace, prometheus_name(cr))
}

pub fn prometheus_route(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::Route, &cr.namespace, prometheus_name(cr))
}

pub fn prometheus_service(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::Service, &cr.namespace, prometheus_name(cr))
}

pub fn prometheus_service_account(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::ServiceAccount, &cr.namespace, prometheus_name(cr))
}

pub fn prometheus_cluster_role(cr: &Observability) -> ObjectRef {
    ObjectRef::cluster(Kind::ClusterRole, prometheus_name(cr))
}

pub fn prometheus_cluster_role_binding(cr: &Observability) -> ObjectRef {
    ObjectRef::cluster(Kind::ClusterRoleBinding, prometheus_name(cr))
}

/// Pods run by the metrics engine named `name`.
pub fn prometheus_pods(cr: &Observability, name: &str) -> Selector {
    Selector::kind(Kind::Pod)
        .in_namespace(&cr.namespace)
        .with_label("prometheus", name)
}

// ---------------------------------------------------------------------------
// Alert router
// ---------------------------------------------------------------------------

pub fn alertmanager_name(cr: &Observability) -> &str {
    name_or_default(&cr.spec.alertmanager_default_name, ALERTMANAGER_DEFAULT_NAME)
}

pub fn alertmanager(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::Alertmanager, &cr.namespace, alertmanager_name(cr))
}

/// The generated routing config secret for the alert router named `name`.
pub fn alertmanager_secret_name(name: &str) -> String {
    format!("alertmanager-{}", name)
}

pub fn alertmanager_secret(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(
        Kind::Secret,
        &cr.namespace,
        &alertmanager_secret_name(alertmanager_name(cr)),
    )
}

pub fn alertmanager_route(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::Route, &cr.namespace, alertmanager_name(cr))
}

pub fn alertmanager_service(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::Service, &cr.namespace, alertmanager_name(cr))
}

pub fn alertmanager_service_account(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::ServiceAccount, &cr.namespace, alertmanager_name(cr))
}

pub fn alertmanager_cluster_role(cr: &Observability) -> ObjectRef {
    ObjectRef::cluster(Kind::ClusterRole, alertmanager_name(cr))
}

pub fn alertmanager_cluster_role_binding(cr: &Observability) -> ObjectRef {
    ObjectRef::cluster(Kind::ClusterRoleBinding, alertmanager_name(cr))
}

pub fn alertmanager_pods(cr: &Observability, name: &str) -> Selector {
    Selector::kind(Kind::Pod)
        .in_namespace(&cr.namespace)
        .with_label("alertmanager", name)
}

// ---------------------------------------------------------------------------
// Dashboard service
// ---------------------------------------------------------------------------

pub fn grafana_name(cr: &Observability) -> &str {
    name_or_default(&cr.spec.grafana_default_name, GRAFANA_DEFAULT_NAME)
}

pub fn grafana(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::Grafana, &cr.namespace, grafana_name(cr))
}

pub fn grafana_pods(cr: &Observability, name: &str) -> Selector {
    Selector::kind(Kind::Pod)
        .in_namespace(&cr.namespace)
        .with_label("app.kubernetes.io/instance", name)
}

/// Container image for the configured dashboard version, if the version can
/// be read as `major[.minor[.patch]]` with an optional `v` prefix.
pub fn grafana_image(version: Option<&str>) -> Option<String> {
    let raw = version?.trim();
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    let mut parts: Vec<u64> = Vec::with_capacity(3);
    for piece in raw.split('.') {
        parts.push(piece.parse().ok()?);
    }
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    parts.resize(3, 0);
    if parts.iter().all(|p| *p == 0) {
        return None;
    }
    Some(format!(
        "{}{}.{}.{}",
        GRAFANA_BASE_IMAGE, parts[0], parts[1], parts[2]
    ))
}

// ---------------------------------------------------------------------------
// Log shipper
// ---------------------------------------------------------------------------

pub fn promtail(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::DaemonSet, &cr.namespace, PROMTAIL_DEFAULT_NAME)
}

pub fn promtail_service_account(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::ServiceAccount, &cr.namespace, PROMTAIL_DEFAULT_NAME)
}

pub fn promtail_cluster_role(_cr: &Observability) -> ObjectRef {
    ObjectRef::cluster(Kind::ClusterRole, PROMTAIL_DEFAULT_NAME)
}

pub fn promtail_cluster_role_binding(_cr: &Observability) -> ObjectRef {
    ObjectRef::cluster(Kind::ClusterRoleBinding, PROMTAIL_DEFAULT_NAME)
}

// ---------------------------------------------------------------------------
// Operator installation
// ---------------------------------------------------------------------------

pub fn prometheus_namespace(cr: &Observability) -> ObjectRef {
    ObjectRef::cluster(Kind::Namespace, cr.prometheus_operator_namespace())
}

pub fn prometheus_catalog_source(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(
        Kind::CatalogSource,
        cr.prometheus_operator_namespace(),
        PROMETHEUS_CATALOG_SOURCE,
    )
}

pub fn prometheus_subscription(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(
        Kind::Subscription,
        cr.prometheus_operator_namespace(),
        PROMETHEUS_SUBSCRIPTION,
    )
}

pub fn prometheus_operator_group(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(
        Kind::OperatorGroup,
        cr.prometheus_operator_namespace(),
        PROMETHEUS_OPERATOR_GROUP,
    )
}

pub fn stale_prometheus_csv(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(
        Kind::ClusterServiceVersion,
        cr.prometheus_operator_namespace(),
        STALE_PROMETHEUS_CSV,
    )
}

pub fn token_secret(cr: &Observability) -> ObjectRef {
    ObjectRef::namespaced(Kind::Secret, &cr.namespace, TOKEN_SECRET)
}

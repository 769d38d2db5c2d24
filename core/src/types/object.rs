use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object kinds the controller reads or writes in the cluster store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Namespace,
    Secret,
    Service,
    ServiceAccount,
    Route,
    ClusterRole,
    ClusterRoleBinding,
    Deployment,
    DaemonSet,
    Pod,
    CatalogSource,
    Subscription,
    OperatorGroup,
    ClusterServiceVersion,
    Prometheus,
    Alertmanager,
    Grafana,
}

impl Kind {
    /// Cluster-scoped kinds are addressed without a namespace.
    pub fn is_cluster_scoped(self) -> bool {
        matches!(
            self,
            Kind::Namespace | Kind::ClusterRole | Kind::ClusterRoleBinding
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Namespace => "namespace",
            Kind::Secret => "secret",
            Kind::Service => "service",
            Kind::ServiceAccount => "service_account",
            Kind::Route => "route",
            Kind::ClusterRole => "cluster_role",
            Kind::ClusterRoleBinding => "cluster_role_binding",
            Kind::Deployment => "deployment",
            Kind::DaemonSet => "daemon_set",
            Kind::Pod => "pod",
            Kind::CatalogSource => "catalog_source",
            Kind::Subscription => "subscription",
            Kind::OperatorGroup => "operator_group",
            Kind::ClusterServiceVersion => "cluster_service_version",
            Kind::Prometheus => "prometheus",
            Kind::Alertmanager => "alertmanager",
            Kind::Grafana => "grafana",
        };
        f.write_str(s)
    }
}

/// Identity of an object in the store: (kind, namespace, name).
///
/// Cluster-scoped objects carry an empty namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub kind: Kind,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn namespaced(kind: Kind, namespace: &str, name: &str) -> Self {
        ObjectRef {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn cluster(kind: Kind, name: &str) -> Self {
        ObjectRef {
            kind,
            namespace: String::new(),
            name: name.to_string(),
        }
    }

    /// The same kind and namespace under a different name. Used to address
    /// objects that still carry a legacy name.
    pub fn renamed(&self, name: &str) -> Self {
        ObjectRef {
            kind: self.kind,
            namespace: self.namespace.clone(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// A store-resident object together with its concurrency token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagedObject {
    #[serde(flatten)]
    pub identity: ObjectRef,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub status: Value,
    /// Optimistic concurrency token. Zero on objects not yet stored.
    #[serde(default)]
    pub resource_version: u64,
}

impl ManagedObject {
    /// An object carrying only its identity.
    pub fn empty(identity: ObjectRef) -> Self {
        ManagedObject {
            identity,
            labels: BTreeMap::new(),
            spec: Value::Null,
            status: Value::Null,
            resource_version: 0,
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_status(mut self, status: Value) -> Self {
        self.status = status;
        self
    }

    /// Set one top-level spec field, turning a null spec into an object first.
    /// Fields not named here are left untouched.
    pub fn set_spec_field(&mut self, key: &str, value: Value) {
        if !self.spec.is_object() {
            self.spec = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut self.spec {
            map.insert(key.to_string(), value);
        }
    }

    pub fn spec_field(&self, key: &str) -> Option<&Value> {
        self.spec.get(key)
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        if self.identity.kind != selector.kind {
            return false;
        }
        if let Some(ns) = &selector.namespace {
            if &self.identity.namespace != ns {
                return false;
            }
        }
        selector
            .labels
            .iter()
            .all(|(k, v)| self.labels.get(k) == Some(v))
    }
}

/// A list query: one kind, optionally one namespace, plus label equality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selector {
    pub kind: Kind,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Selector {
    pub fn kind(kind: Kind) -> Self {
        Selector {
            kind,
            namespace: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ns) = &self.namespace {
            write!(f, " in {}", ns)?;
        }
        for (k, v) in &self.labels {
            write!(f, " {}={}", k, v)?;
        }
        Ok(())
    }
}

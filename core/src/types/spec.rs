use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReconcileError, ReconcileResult};

/// The user-declared target for the whole observability stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observability {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub spec: ObservabilitySpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObservabilitySpec {
    /// Overrides the metrics engine's object name. Empty means the current
    /// default name is in use and legacy-named objects must be removed.
    #[serde(default)]
    pub prometheus_default_name: String,
    #[serde(default)]
    pub alertmanager_default_name: String,
    #[serde(default)]
    pub grafana_default_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_contained: Option<SelfContained>,
    /// Dashboard service version, e.g. `7.5.11` or `v8.1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_operator_resources: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Value>,
    /// Extra command-line arguments for the log shipper.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_shipper_args: Vec<String>,
}

/// Settings for clusters where the stack runs without the central
/// configuration repository and remote write targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelfContained {
    /// When set, the metrics operator is installed into this namespace
    /// instead of the resource's own namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_operator_namespace: Option<String>,
    #[serde(default)]
    pub disable_repo_sync: bool,
    #[serde(default)]
    pub disable_observatorium: bool,
    /// Name of a user-provided alert routing secret that replaces the
    /// generated one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertmanager_config_secret: Option<String>,
}

impl Observability {
    pub fn new(name: &str, namespace: &str) -> Self {
        Observability {
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec: ObservabilitySpec::default(),
        }
    }

    pub fn from_yaml(content: &str) -> ReconcileResult<Self> {
        let cr: Observability = serde_yaml::from_str(content)
            .map_err(|e| ReconcileError::invalid_spec(e.to_string()))?;
        cr.validate()?;
        Ok(cr)
    }

    /// Reject specifications no stage could act on.
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.name.trim().is_empty() {
            return Err(ReconcileError::invalid_spec("name is empty"));
        }
        if self.namespace.trim().is_empty() {
            return Err(ReconcileError::invalid_spec("namespace is empty"));
        }
        if let Some(sc) = &self.spec.self_contained {
            if let Some(ns) = &sc.prometheus_operator_namespace {
                if ns.trim().is_empty() {
                    return Err(ReconcileError::invalid_spec(
                        "self_contained.prometheus_operator_namespace is empty",
                    ));
                }
            }
        }
        Ok(())
    }

    /// The operator is installed outside the resource's namespace.
    pub fn descoped_mode_enabled(&self) -> bool {
        self.spec
            .self_contained
            .as_ref()
            .and_then(|sc| sc.prometheus_operator_namespace.as_ref())
            .is_some()
    }

    pub fn prometheus_operator_namespace(&self) -> &str {
        self.spec
            .self_contained
            .as_ref()
            .and_then(|sc| sc.prometheus_operator_namespace.as_deref())
            .unwrap_or(&self.namespace)
    }

    pub fn external_sync_disabled(&self) -> bool {
        self.spec
            .self_contained
            .as_ref()
            .map(|sc| sc.disable_repo_sync)
            .unwrap_or(false)
    }

    pub fn observatorium_disabled(&self) -> bool {
        self.spec
            .self_contained
            .as_ref()
            .map(|sc| sc.disable_observatorium)
            .unwrap_or(false)
    }

    pub fn alertmanager_config_secret(&self) -> Option<&str> {
        self.spec
            .self_contained
            .as_ref()
            .and_then(|sc| sc.alertmanager_config_secret.as_deref())
            .filter(|s| !s.is_empty())
    }
}

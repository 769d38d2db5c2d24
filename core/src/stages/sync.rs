//! Per-resource sync: apply each managed resource's desired fields.
//!
//! A `ResourceSyncStage` owns a fixed list of templates. Each template names
//! one object and writes only the spec fields it owns, so fields written by
//! other actors survive and a second apply of an unchanged specification is
//! a no-op.

use serde_json::json;
use tracing::info;

use crate::convergence::apply::{Applier, ApplyResult};
use crate::error::{ReconcileError, ReconcileResult};
use crate::model;
use crate::store::ObjectStore;
use crate::types::context::Context;
use crate::types::object::{ManagedObject, ObjectRef};
use crate::types::spec::Observability;
use crate::types::status::{ObservabilityStatus, StageOutcome};

use super::{delete_in_order, Stage};

/// Desired shape of one managed object.
pub trait ResourceTemplate {
    fn identity(&self, cr: &Observability) -> ObjectRef;

    /// Write the fields this template owns onto `obj`.
    fn render(&self, cr: &Observability, obj: &mut ManagedObject) -> ReconcileResult<()>;
}

fn mark_managed(obj: &mut ManagedObject) {
    obj.labels.insert(
        model::MANAGED_BY_LABEL.to_string(),
        model::MANAGED_BY_VALUE.to_string(),
    );
}

fn apply_scheduling(cr: &Observability, obj: &mut ManagedObject) {
    if let Some(t) = &cr.spec.tolerations {
        obj.set_spec_field("tolerations", t.clone());
    }
    if let Some(a) = &cr.spec.affinity {
        obj.set_spec_field("affinity", a.clone());
    }
}

/// Dashboard service.
#[derive(Debug, Default)]
pub struct GrafanaTemplate;

impl ResourceTemplate for GrafanaTemplate {
    fn identity(&self, cr: &Observability) -> ObjectRef {
        model::grafana(cr)
    }

    fn render(&self, cr: &Observability, obj: &mut ManagedObject) -> ReconcileResult<()> {
        mark_managed(obj);
        obj.set_spec_field(
            "config",
            json!({
                "log": { "mode": "console", "level": "warn" },
                "auth": { "disable_login_form": false, "disable_signout_menu": true },
                "auth.basic": { "enabled": true },
                "auth.anonymous": { "enabled": true },
            }),
        );
        if let Some(image) = model::grafana_image(cr.spec.grafana_version.as_deref()) {
            obj.set_spec_field("baseImage", json!(image));
        }
        obj.set_spec_field(
            "deployment",
            json!({
                "replicas": 1,
                "priorityClassName": model::PRIORITY_CLASS_NAME,
                "annotations": { "cluster-autoscaler.kubernetes.io/safe-to-evict": "true" },
            }),
        );
        obj.set_spec_field(
            "ingress",
            json!({ "enabled": true, "targetPort": "grafana-proxy", "termination": "reencrypt" }),
        );
        obj.set_spec_field("secrets", json!(["grafana-k8s-tls", "grafana-k8s-proxy"]));
        obj.set_spec_field(
            "dashboardLabelSelector",
            json!([{ "matchLabels": { "app": model::GRAFANA_DEFAULT_NAME } }]),
        );
        apply_scheduling(cr, obj);
        Ok(())
    }
}

/// Alert router.
#[derive(Debug, Default)]
pub struct AlertmanagerTemplate;

impl ResourceTemplate for AlertmanagerTemplate {
    fn identity(&self, cr: &Observability) -> ObjectRef {
        model::alertmanager(cr)
    }

    fn render(&self, cr: &Observability, obj: &mut ManagedObject) -> ReconcileResult<()> {
        mark_managed(obj);
        let config_secret = match cr.alertmanager_config_secret() {
            Some(name) => name.to_string(),
            None => model::alertmanager_secret(cr).name,
        };
        obj.set_spec_field("configSecret", json!(config_secret));
        obj.set_spec_field("serviceAccountName", json!(model::alertmanager_name(cr)));
        obj.set_spec_field("replicas", json!(1));
        obj.set_spec_field("priorityClassName", json!(model::PRIORITY_CLASS_NAME));
        apply_scheduling(cr, obj);
        Ok(())
    }
}

/// Metrics engine.
#[derive(Debug, Default)]
pub struct PrometheusTemplate;

impl ResourceTemplate for PrometheusTemplate {
    fn identity(&self, cr: &Observability) -> ObjectRef {
        model::prometheus(cr)
    }

    fn render(&self, cr: &Observability, obj: &mut ManagedObject) -> ReconcileResult<()> {
        mark_managed(obj);
        obj.set_spec_field("serviceAccountName", json!(model::prometheus_name(cr)));
        obj.set_spec_field(
            "alerting",
            json!({ "alertmanagers": [{
                "namespace": cr.namespace,
                "name": model::alertmanager_name(cr),
                "port": "web",
            }]}),
        );
        obj.set_spec_field("replicas", json!(1));
        obj.set_spec_field("priorityClassName", json!(model::PRIORITY_CLASS_NAME));
        obj.set_spec_field("remoteWriteEnabled", json!(!cr.observatorium_disabled()));
        apply_scheduling(cr, obj);
        Ok(())
    }
}

/// Log shipper.
#[derive(Debug, Default)]
pub struct PromtailTemplate;

impl ResourceTemplate for PromtailTemplate {
    fn identity(&self, cr: &Observability) -> ObjectRef {
        model::promtail(cr)
    }

    fn render(&self, cr: &Observability, obj: &mut ManagedObject) -> ReconcileResult<()> {
        let mut args = vec!["-config.file=/etc/promtail/promtail.yaml".to_string()];
        for arg in &cr.spec.log_shipper_args {
            if !arg.starts_with('-') {
                return Err(ReconcileError::render(
                    &obj.identity,
                    format!("log shipper argument {:?} is not a flag", arg),
                ));
            }
            args.push(arg.clone());
        }
        mark_managed(obj);
        obj.set_spec_field("image", json!(model::PROMTAIL_IMAGE));
        obj.set_spec_field("args", json!(args));
        obj.set_spec_field("serviceAccountName", json!(model::PROMTAIL_DEFAULT_NAME));
        apply_scheduling(cr, obj);
        Ok(())
    }
}

/// Applies a fixed list of resource templates through the applier.
pub struct ResourceSyncStage {
    name: String,
    applier: Applier,
    templates: Vec<Box<dyn ResourceTemplate>>,
}

impl ResourceSyncStage {
    pub fn new(name: &str, applier: Applier, templates: Vec<Box<dyn ResourceTemplate>>) -> Self {
        ResourceSyncStage {
            name: name.to_string(),
            applier,
            templates,
        }
    }

    pub fn grafana(applier: Applier) -> Self {
        Self::new("grafana", applier, vec![Box::new(GrafanaTemplate)])
    }

    pub fn alertmanager(applier: Applier) -> Self {
        Self::new("alertmanager", applier, vec![Box::new(AlertmanagerTemplate)])
    }

    pub fn prometheus(applier: Applier) -> Self {
        Self::new("prometheus", applier, vec![Box::new(PrometheusTemplate)])
    }

    pub fn promtail(applier: Applier) -> Self {
        Self::new("promtail", applier, vec![Box::new(PromtailTemplate)])
    }
}

impl Stage for ResourceSyncStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn reconcile(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
        _status: &mut ObservabilityStatus,
    ) -> ReconcileResult<StageOutcome> {
        for template in &self.templates {
            let identity = template.identity(cr);
            let result = self
                .applier
                .apply(store, ctx, &identity, |obj| template.render(cr, obj))?;
            if result != ApplyResult::Unchanged {
                info!(stage = %self.name, object = %identity, ?result, "synced");
            }
        }
        Ok(StageOutcome::Success)
    }

    fn cleanup(
        &self,
        store: &dyn ObjectStore,
        ctx: &Context,
        cr: &Observability,
    ) -> ReconcileResult<StageOutcome> {
        let ids: Vec<ObjectRef> = self.templates.iter().map(|t| t.identity(cr)).collect();
        delete_in_order(store, ctx, &ids)?;
        Ok(StageOutcome::Success)
    }
}

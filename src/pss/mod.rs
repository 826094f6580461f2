//! Pod Security Standards evaluation of workload manifests.
//!
//! Objects are decoded into typed Kubernetes API structures, their pod
//! template extracted, and the template checked against a profile level
//! and version.

pub mod api;
pub mod checks;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::Result;
use crate::manifest::{collect_objects, object_name};
use api::LevelVersion;
use checks::{aggregate_check_results, all_checks, evaluate_pod, PodCheck};

/// Returned alongside the reports when at least one object fails the policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("One or more resources do not satisfy the PSS policy: {policy}/{policy_version}")]
pub struct PolicyNotSatisfiedError {
    pub policy: String,
    pub policy_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenCheck {
    pub reason: String,
    pub detail: String,
}

/// Policy outcome for one supported object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub object: String,
    pub valid: bool,
    #[serde(rename = "fileName", default, skip_serializing_if = "String::is_empty")]
    pub file_name: String,
    pub policy: String,
    #[serde(rename = "policyVersion")]
    pub policy_version: String,
    #[serde(rename = "forbiddenChecks", default)]
    pub forbidden_checks: Vec<ForbiddenCheck>,
}

/// Reports for a manifest plus the policy failure, if any. Reports are kept
/// even when the policy is not satisfied.
#[derive(Debug, Clone, Default)]
pub struct PssOutcome {
    pub reports: Vec<Report>,
    pub violation: Option<PolicyNotSatisfiedError>,
}

impl PssOutcome {
    pub fn into_result(self) -> Result<Vec<Report>> {
        match self.violation {
            Some(violation) => Err(violation.into()),
            None => Ok(self.reports),
        }
    }
}

/// Top-level kind name plus the pod template to check.
struct Workload {
    object: String,
    meta: ObjectMeta,
    spec: PodSpec,
}

/// A missing template is checked as an empty pod spec.
fn template(object: String, template: Option<PodTemplateSpec>) -> Workload {
    let template = template.unwrap_or_default();
    Workload {
        object,
        meta: template.metadata.unwrap_or_default(),
        spec: template.spec.unwrap_or_default(),
    }
}

fn named(kind: &str, meta: &ObjectMeta) -> String {
    object_name(kind, meta.name.as_deref(), meta.namespace.as_deref())
}

enum Decoded {
    Workload(Workload),
    Unsupported(String),
}

/// Dispatch on apiVersion/kind. `None` means the object could not be decoded.
fn decode(object: Value) -> Option<Decoded> {
    let api_version = object.get("apiVersion")?.as_str()?.to_string();
    let kind = object.get("kind")?.as_str()?.to_string();

    let decoded = match (api_version.as_str(), kind.as_str()) {
        ("v1", "Pod") => {
            let pod: Pod = from_value(object)?;
            Workload {
                object: named(&kind, &pod.metadata),
                meta: pod.metadata,
                spec: pod.spec.unwrap_or_default(),
            }
        }
        ("apps/v1", "DaemonSet") => {
            let ds: DaemonSet = from_value(object)?;
            template(named(&kind, &ds.metadata), ds.spec.map(|s| s.template))
        }
        ("apps/v1", "Deployment") => {
            let deploy: Deployment = from_value(object)?;
            template(named(&kind, &deploy.metadata), deploy.spec.map(|s| s.template))
        }
        ("apps/v1", "StatefulSet") => {
            let sts: StatefulSet = from_value(object)?;
            template(named(&kind, &sts.metadata), sts.spec.map(|s| s.template))
        }
        ("batch/v1", "Job") => {
            let job: Job = from_value(object)?;
            template(named(&kind, &job.metadata), job.spec.map(|s| s.template))
        }
        ("batch/v1", "CronJob") => {
            let cron: CronJob = from_value(object)?;
            let pod_template = cron
                .spec
                .and_then(|s| s.job_template.spec)
                .map(|s| s.template);
            template(named(&kind, &cron.metadata), pod_template)
        }
        _ => return Some(Decoded::Unsupported(kind)),
    };
    Some(Decoded::Workload(decoded))
}

fn from_value<T: serde::de::DeserializeOwned>(object: Value) -> Option<T> {
    match serde_json::from_value(object) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::debug!(error = %e, "unable to decode resource");
            None
        }
    }
}

/// Checks a manifest's workloads against a Pod Security Standards profile.
pub struct Evaluator {
    checks: Vec<Box<dyn PodCheck>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            checks: all_checks(),
        }
    }

    /// Evaluate every supported object of a manifest.
    ///
    /// Fails only when the profile or version cannot be parsed. A policy
    /// failure is reported through [`PssOutcome::violation`].
    pub fn run(
        &self,
        file_name: &str,
        bytes: &[u8],
        policy: &str,
        policy_version: &str,
    ) -> Result<PssOutcome> {
        let level_version = LevelVersion::parse(policy, policy_version)?;

        let text = String::from_utf8_lossy(bytes);
        let objects = collect_objects(&text);
        if objects.is_empty() {
            tracing::info!(file = file_name, "no objects found in manifest");
            return Ok(PssOutcome::default());
        }

        let mut reports = Vec::new();
        for object in objects {
            let workload = match decode(object) {
                Some(Decoded::Workload(workload)) => workload,
                Some(Decoded::Unsupported(kind)) => {
                    tracing::debug!(kind = %kind, "resource not supported, validation skipped");
                    continue;
                }
                None => continue,
            };
            reports.push(self.evaluate(file_name, level_version, policy, policy_version, workload));
        }

        let violation = reports
            .iter()
            .any(|r| !r.valid)
            .then(|| PolicyNotSatisfiedError {
                policy: policy.to_string(),
                policy_version: policy_version.to_string(),
            });
        Ok(PssOutcome { reports, violation })
    }

    fn evaluate(
        &self,
        file_name: &str,
        level_version: LevelVersion,
        policy: &str,
        policy_version: &str,
        workload: Workload,
    ) -> Report {
        let results = evaluate_pod(&self.checks, level_version, &workload.meta, &workload.spec);
        let forbidden_checks = results
            .iter()
            .filter(|r| !r.result.allowed)
            .map(|r| ForbiddenCheck {
                reason: r.result.forbidden_reason.clone(),
                detail: r.result.forbidden_detail.clone(),
            })
            .collect();

        Report {
            object: workload.object,
            valid: aggregate_check_results(&results),
            file_name: file_name.to_string(),
            policy: policy.to_string(),
            policy_version: policy_version.to_string(),
            forbidden_checks,
        }
    }
}

//! Fan-out to remote worker services.
//!
//! Each identity is served by `POST {base}/run_<identity>` taking
//! `{topic, plan}` and answering `{status, result}`. Calls run concurrently,
//! each with its own timeout.

use crate::agents::WorkerIdentity;
use crate::types::{AppError, Result, WorkerRunRequest, WorkerRunResponse};
use crate::utils::toml_config::CrewConfig;
use crate::workflows::fanout::{handle_failure, FailurePolicy, FanOut, FanOutResult, ResearchSeed};
use crate::workflows::state::{AbortReason, Findings, Stage, WorkerReport};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Findings key for the partial output of a remote worker that aborted.
const REMOTE_FINDINGS: &str = "remote";

pub struct DelegationGateway {
    http: reqwest::Client,
    services: BTreeMap<WorkerIdentity, String>,
    base_url: Option<String>,
    timeout: Duration,
    policy: FailurePolicy,
}

impl DelegationGateway {
    pub fn new(timeout: Duration, policy: FailurePolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            services: BTreeMap::new(),
            base_url: None,
            timeout,
            policy,
        }
    }

    pub fn from_config(config: &CrewConfig) -> Result<Self> {
        let mut gateway = Self::new(config.delegation.timeout(), config.research.failure_policy);
        gateway.base_url = config.delegation.base_url.clone();
        for (name, url) in &config.delegation.services {
            let identity: WorkerIdentity = name.parse().map_err(AppError::Configuration)?;
            gateway.services.insert(identity, url.clone());
        }
        Ok(gateway)
    }

    pub fn with_service(mut self, identity: WorkerIdentity, base_url: impl Into<String>) -> Self {
        self.services.insert(identity, base_url.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn endpoint(&self, identity: WorkerIdentity) -> Result<String> {
        let base = self
            .services
            .get(&identity)
            .or(self.base_url.as_ref())
            .ok_or_else(|| {
                AppError::Configuration(format!(
                    "No delegation service URL configured for worker '{}'",
                    identity
                ))
            })?;
        Ok(format!(
            "{}{}",
            base.trim_end_matches('/'),
            identity.endpoint_path()
        ))
    }

    async fn call_service(
        &self,
        identity: WorkerIdentity,
        url: String,
        seed: &ResearchSeed,
    ) -> std::result::Result<WorkerReport, String> {
        let body = WorkerRunRequest {
            topic: seed.topic.clone(),
            plan: seed.plan.clone(),
        };

        debug!(worker = %identity, %url, "delegating worker");
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("{} timed out after {:?}", url, self.timeout)
                } else {
                    format!("request to {} failed: {}", url, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{} returned {}", url, status));
        }

        let reply: WorkerRunResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response from {}: {}", url, e))?;

        match reply.status.to_ascii_lowercase().as_str() {
            "aborted" => {
                let mut findings = Findings::new();
                findings.record(REMOTE_FINDINGS, &reply.result);
                let reason = reply.reason.unwrap_or(AbortReason::CycleCap);
                Ok(WorkerReport::aborted(identity, reason, findings))
            }
            "failed" | "error" => Err(format!("{} reported failure: {}", url, reply.result)),
            _ => Ok(WorkerReport::done(identity, reply.result)),
        }
    }
}

#[async_trait]
impl FanOut for DelegationGateway {
    async fn run_parallel(
        &self,
        workers: &[WorkerIdentity],
        seed: &ResearchSeed,
        cancel: &CancellationToken,
    ) -> Result<FanOutResult> {
        let mut targets = BTreeMap::new();
        for &identity in workers {
            targets.insert(identity, self.endpoint(identity)?);
        }

        info!(workers = targets.len(), "delegating research to remote workers");

        let calls = targets.into_iter().map(|(identity, url)| async move {
            (identity, self.call_service(identity, url, seed).await)
        });

        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("delegated research cancelled");
                return Err(AppError::Cancelled { stage: Stage::Research });
            }
            outcomes = join_all(calls) => outcomes,
        };

        let mut results = FanOutResult::new();
        for (identity, outcome) in outcomes {
            let report = match outcome {
                Ok(report) => report,
                Err(message) => handle_failure(self.policy, identity, message)?,
            };
            results.insert(identity, report);
        }
        Ok(results)
    }

    fn kind(&self) -> &'static str {
        "delegated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_resolution() {
        let gateway = DelegationGateway::new(Duration::from_secs(1), FailurePolicy::BestEffort)
            .with_service(WorkerIdentity::Who, "http://localhost:8001/")
            .with_base_url("http://workers:9000");

        assert_eq!(
            gateway.endpoint(WorkerIdentity::Who).unwrap(),
            "http://localhost:8001/run_who"
        );
        assert_eq!(
            gateway.endpoint(WorkerIdentity::Why).unwrap(),
            "http://workers:9000/run_why"
        );
    }

    #[test]
    fn test_missing_url_is_configuration_error() {
        let gateway = DelegationGateway::new(Duration::from_secs(1), FailurePolicy::BestEffort);
        assert!(matches!(
            gateway.endpoint(WorkerIdentity::How),
            Err(AppError::Configuration(_))
        ));
    }
}

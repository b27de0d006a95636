use std::sync::Arc;

use futures::{future, stream, StreamExt};
use log::{debug, info};

use crate::core::catalog::VulnerabilityModule;
use crate::core::mutator::ParamTarget;
use crate::core::Detection;
use crate::http::HttpClient;

/// Query-parameter injection engine
///
/// For one vulnerability module the engine:
/// 1. Walks the target's parameters in order
/// 2. Replaces one parameter's value with each payload, in catalog order
/// 3. Sends the probe and matches the module's signature against the body
/// 4. Stops on the first matching payload for that parameter
///
/// Different parameters may be probed concurrently, but payloads for one
/// parameter are always tried in sequence, so the recorded payload is the
/// highest-priority one that matched regardless of scheduling.
pub struct InjectionEngine {
    client: Arc<HttpClient>,
    concurrency_limit: usize,
}

impl InjectionEngine {
    pub fn new(client: Arc<HttpClient>, concurrency_limit: usize) -> Self {
        Self {
            client,
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    /// Runs `module` against a raw target URL. Targets without query
    /// parameters yield no detections and send no requests.
    pub async fn run(&self, module: &VulnerabilityModule, target_url: &str) -> Vec<Detection> {
        match ParamTarget::parse(target_url) {
            Ok(target) => self.run_target(module, &target).await,
            Err(e) => {
                debug!("Skipping {} for {}: {}", module.type_id, target_url, e);
                Vec::new()
            }
        }
    }

    /// Runs `module` against an already parsed target. Detections come back
    /// in parameter order.
    pub async fn run_target(&self, module: &VulnerabilityModule, target: &ParamTarget) -> Vec<Detection> {
        stream::iter(target.injection_points())
            .map(|index| self.probe_parameter(module, target, index))
            .buffered(self.concurrency_limit)
            .filter_map(future::ready)
            .collect()
            .await
    }

    /// Tries each payload on one parameter until the signature matches.
    async fn probe_parameter(
        &self,
        module: &VulnerabilityModule,
        target: &ParamTarget,
        index: usize,
    ) -> Option<Detection> {
        let param_name = target.param_name(index)?;

        for payload in &module.payloads {
            let probe_url = target.probe_url(index, payload);

            let response = match self.client.get(&probe_url).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("[{}] {} | transport error: {}", module.type_id, param_name, e);
                    continue;
                }
            };

            debug!(
                "[{}] Testing {} | Code: {} | Payload: {}",
                module.type_id,
                param_name,
                response.status_code,
                preview(payload)
            );

            if module.matches(&response.body) {
                info!("{} found on parameter '{}'", module.type_id, param_name);
                return Some(Detection {
                    type_id: module.type_id.clone(),
                    parameter_name: param_name.to_string(),
                    payload: payload.clone(),
                    proof_url: probe_url.to_string(),
                    status_code: response.status_code,
                    server: response.server,
                    timing_ms: response.timing_ms,
                });
            }
        }

        None
    }
}

fn preview(payload: &str) -> String {
    let mut out: String = payload.chars().take(20).collect();
    if payload.chars().count() > 20 {
        out.push_str("...");
    }
    out
}

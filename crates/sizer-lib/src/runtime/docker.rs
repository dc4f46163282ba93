//! Docker Engine API client
//!
//! Talks to the Docker daemon over its HTTP API. The endpoint comes from
//! configuration (or `DOCKER_HOST`); `tcp://` schemes are rewritten to
//! `http://` so the same value works for both the CLI and the daemon.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{async_trait, ContainerHandle, ContainerRuntime, ContainerState};
use crate::error::RuntimeError;
use crate::models::{PortMapping, StatsSnapshot};

/// Default engine endpoint when neither config nor `DOCKER_HOST` is set.
pub const DEFAULT_DOCKER_HOST: &str = "http://localhost:2375";

/// Stop timeout passed to the daemon before it kills the container.
const STOP_TIMEOUT_SECS: u32 = 5;

/// Client for the Docker Engine HTTP API.
pub struct DockerRuntime {
    http: Client,
    base_url: String,
}

impl DockerRuntime {
    pub fn new(endpoint: &str) -> Result<Self, RuntimeError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        let base_url = normalize_endpoint(endpoint);
        Ok(Self { http, base_url })
    }

    /// Build a client from `DOCKER_HOST`, falling back to the default
    /// local endpoint.
    pub fn from_env() -> Result<Self, RuntimeError> {
        let endpoint =
            std::env::var("DOCKER_HOST").unwrap_or_else(|_| DEFAULT_DOCKER_HOST.to_string());
        Self::new(&endpoint)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        let response = self
            .http
            .get(self.url(&format!("/images/{}/json", image)))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(api_error(status, response.text().await.unwrap_or_default())),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        info!(image = %image, "Pulling image from registry");

        let response = self
            .http
            .post(self.url(&format!("/images/create?fromImage={}", image)))
            .send()
            .await?;

        let status = response.status();
        // The daemon streams progress as JSON lines and reports pull
        // failures inside the stream with a 200 status.
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RuntimeError::Pull(error_message(status, &body)));
        }

        for line in body.lines() {
            if let Ok(progress) = serde_json::from_str::<PullProgress>(line) {
                if let Some(err) = progress.error {
                    return Err(RuntimeError::Pull(err));
                }
            }
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn resolve_image(&self, image: &str) -> Result<(), RuntimeError> {
        if self.image_exists(image).await? {
            debug!(image = %image, "Image found locally");
            return Ok(());
        }
        self.pull_image(image).await
    }

    async fn start_container(
        &self,
        image: &str,
        command: Option<&[String]>,
        ports: Option<&[PortMapping]>,
    ) -> Result<ContainerHandle, RuntimeError> {
        let mut body = json!({ "Image": image });
        if let Some(cmd) = command {
            body["Cmd"] = json!(cmd);
        }
        if let Some(ports) = ports {
            let mut exposed = HashMap::new();
            let mut bindings = HashMap::new();
            for mapping in ports {
                let key = format!("{}/tcp", mapping.container_port);
                exposed.insert(key.clone(), json!({}));
                bindings.insert(
                    key,
                    json!([{ "HostPort": mapping.host_port.to_string() }]),
                );
            }
            body["ExposedPorts"] = json!(exposed);
            body["HostConfig"] = json!({ "PortBindings": bindings });
        }

        let response = self
            .http
            .post(self.url("/containers/create"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RuntimeError::Start(error_message(status, &text)));
        }
        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::Start(e.to_string()))?;
        let handle = ContainerHandle::new(created.id);

        let response = self
            .http
            .post(self.url(&format!("/containers/{}/start", handle.id)))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Don't leave the created-but-unstartable container behind.
            let _ = self.stop_and_remove(&handle).await;
            return Err(RuntimeError::Start(error_message(status, &text)));
        }

        debug!(container_id = %handle.short_id(), image = %image, "Container started");
        Ok(handle)
    }

    async fn status(&self, handle: &ContainerHandle) -> Result<ContainerState, RuntimeError> {
        let response = self
            .http
            .get(self.url(&format!("/containers/{}/json", handle.id)))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(ContainerState::Exited);
        }
        if !status.is_success() {
            return Err(api_error(status, response.text().await.unwrap_or_default()));
        }

        let inspect: InspectResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::MalformedStats(e.to_string()))?;
        Ok(ContainerState::from(inspect.state.status.as_str()))
    }

    async fn stats(&self, handle: &ContainerHandle) -> Result<StatsSnapshot, RuntimeError> {
        let response = self
            .http
            .get(self.url(&format!("/containers/{}/stats?stream=false", handle.id)))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RuntimeError::EndOfStream);
        }
        if !status.is_success() {
            return Err(api_error(status, response.text().await.unwrap_or_default()));
        }

        let payload: StatsPayload = response
            .json()
            .await
            .map_err(|e| RuntimeError::MalformedStats(e.to_string()))?;

        Ok(StatsSnapshot {
            container_cpu_ns: payload.cpu_stats.cpu_usage.total_usage,
            system_cpu_ns: payload.cpu_stats.system_cpu_usage,
            online_cpus: payload.cpu_stats.online_cpus,
            percpu_usage: payload.cpu_stats.cpu_usage.percpu_usage.unwrap_or_default(),
            memory_bytes: payload.memory_stats.usage,
        })
    }

    async fn stop_and_remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let response = self
            .http
            .post(self.url(&format!(
                "/containers/{}/stop?t={}",
                handle.id, STOP_TIMEOUT_SECS
            )))
            .send()
            .await?;

        // 304 = already stopped, 404 = already gone; both fine.
        let status = response.status();
        if !status.is_success()
            && status != StatusCode::NOT_MODIFIED
            && status != StatusCode::NOT_FOUND
        {
            warn!(container_id = %handle.short_id(), status = %status, "Container stop returned an error");
        }

        let response = self
            .http
            .delete(self.url(&format!("/containers/{}?force=true", handle.id)))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(api_error(status, response.text().await.unwrap_or_default()));
        }

        debug!(container_id = %handle.short_id(), "Container removed");
        Ok(())
    }

    async fn logs(&self, handle: &ContainerHandle, tail: usize) -> Result<String, RuntimeError> {
        let response = self
            .http
            .get(self.url(&format!(
                "/containers/{}/logs?stdout=true&stderr=true&tail={}",
                handle.id, tail
            )))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response.text().await.unwrap_or_default()));
        }

        let raw = response.bytes().await?;
        Ok(demux_log_stream(&raw))
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let rewritten = if let Some(rest) = endpoint.strip_prefix("tcp://") {
        format!("http://{}", rest)
    } else {
        endpoint.to_string()
    };
    rewritten.trim_end_matches('/').to_string()
}

fn api_error(status: StatusCode, body: String) -> RuntimeError {
    RuntimeError::Api {
        status: status.as_u16(),
        message: error_message(status, &body),
    }
}

/// Extract the daemon's `{"message": ...}` error body, falling back to the
/// raw text.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.trim().to_string()
            }
        })
}

/// Demultiplex the daemon's 8-byte-framed log stream into plain text.
/// Containers attached to a TTY return unframed text, which is passed
/// through unchanged.
fn demux_log_stream(raw: &[u8]) -> String {
    // Frame header: [stream_type, 0, 0, 0, len_be32]; stream_type <= 2.
    let framed = raw.len() >= 8 && raw[0] <= 2 && raw[1] == 0 && raw[2] == 0 && raw[3] == 0;
    if !framed {
        return String::from_utf8_lossy(raw).into_owned();
    }

    let mut out = String::new();
    let mut offset = 0usize;
    while offset + 8 <= raw.len() {
        let len = u32::from_be_bytes([
            raw[offset + 4],
            raw[offset + 5],
            raw[offset + 6],
            raw[offset + 7],
        ]) as usize;
        let start = offset + 8;
        let end = (start + len).min(raw.len());
        out.push_str(&String::from_utf8_lossy(&raw[start..end]));
        offset = end;
    }
    out
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct InspectResponse {
    #[serde(rename = "State")]
    state: InspectState,
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Status", default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PullProgress {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatsPayload {
    #[serde(default)]
    cpu_stats: CpuStats,
    #[serde(default)]
    memory_stats: MemoryStats,
}

#[derive(Debug, Default, Deserialize)]
struct CpuStats {
    #[serde(default)]
    cpu_usage: CpuUsage,
    #[serde(default)]
    system_cpu_usage: u64,
    #[serde(default)]
    online_cpus: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CpuUsage {
    #[serde(default)]
    total_usage: u64,
    #[serde(default)]
    percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryStats {
    #[serde(default)]
    usage: u64,
}

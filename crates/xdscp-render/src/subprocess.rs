//! Subprocess isolation for renders (section 4.8's closing paragraph and
//! section 5): each render happens in a child process so a crashing or
//! looping template cannot take the worker down with it, and is killed
//! after a per-render timeout.
//!
//! The child is the same binary re-invoked with a hidden subcommand (see
//! `xdscp-cli`'s `render-worker`); the parent never forks arbitrary code,
//! it shells out to itself. The job crosses the process boundary as a
//! single JSON line on stdin; the result comes back the same way on
//! stdout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};
use xdscp_core::{ContextResult, DiscoveryRequest, Entry, SourceData};
use xdscp_error::{ErrorCode, XdscpError, XdscpErrorDto};

/// How long a single read off the child's line-delimited stdout stream may
/// stall before the drain gives up on it — distinct from, and nested
/// inside, the overall per-render wall-clock timeout. The original polls
/// its log pipe on this same cadence.
const LOG_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a render-worker child needs, serialised across the process
/// boundary.
#[derive(Debug, Serialize, Deserialize)]
pub struct RenderJob {
    pub request: DiscoveryRequest,
    pub source_data: SourceData,
    pub context_values: BTreeMap<String, ContextResult>,
}

/// The child's reply: either the rendered entry or an error to surface to
/// the caller as-is.
#[derive(Debug, Serialize, Deserialize)]
pub enum RenderJobResult {
    Ok(Entry),
    Err(XdscpErrorDto),
}

fn error_from_dto(dto: XdscpErrorDto) -> XdscpError {
    let mut err = XdscpError::new(dto.code, dto.message);
    for (key, value) in dto.context {
        err = err.with_context(key, value);
    }
    err
}

/// Name of the hidden subcommand the child process runs.
pub const RENDER_WORKER_SUBCOMMAND: &str = "render-worker";

/// Run `job` in a child process, killing it if it exceeds `timeout`.
/// `self_exe` is the path to the current binary (`std::env::current_exe`);
/// `extra_args` are appended after the `render-worker` subcommand name
/// (e.g. `["--config", "/etc/xdscp.toml"]` so the child can rebuild its
/// own `RenderPipeline`).
pub async fn render_in_subprocess(
    self_exe: &std::path::Path,
    extra_args: &[&str],
    job: &RenderJob,
    timeout: Duration,
) -> Result<Entry, XdscpError> {
    let payload = serde_json::to_vec(job)
        .map_err(|e| XdscpError::new(ErrorCode::InternalError, "render job not serialisable").with_source(e))?;

    let mut child = Command::new(self_exe)
        .arg(RENDER_WORKER_SUBCOMMAND)
        .args(extra_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| XdscpError::new(ErrorCode::RenderError, "failed to spawn render subprocess").with_source(e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&payload)
            .await
            .map_err(|e| XdscpError::new(ErrorCode::RenderError, "failed to write render job to subprocess").with_source(e))?;
    }

    let stdout = child.stdout.take().expect("stdout piped at spawn");
    let mut lines = BufReader::new(stdout).lines();

    // Drain the child's line-delimited stdout: plain lines are treated as
    // log chatter, the line that parses as JSON is the render result. Each
    // individual read is bounded by `LOG_POLL_TIMEOUT`, separate from (and
    // nested inside) the outer per-render `timeout`.
    let drain_result_line = async {
        let mut result_line: Option<String> = None;
        loop {
            match tokio::time::timeout(LOG_POLL_TIMEOUT, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if line.trim_start().starts_with('{') {
                        result_line = Some(line);
                    } else {
                        debug!(child_log = %line, "render subprocess log line");
                    }
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    warn!(error = %e, "render subprocess stdout drain failed");
                    break;
                }
                Err(_) => {
                    warn!(seconds = LOG_POLL_TIMEOUT.as_secs(), "render subprocess log drain idle past poll timeout");
                    break;
                }
            }
        }
        result_line
    };

    let outcome = tokio::time::timeout(timeout, async {
        let result_line = drain_result_line.await;
        let status = child.wait().await;
        (result_line, status)
    })
    .await;

    match outcome {
        Ok((result_line, Ok(status))) => {
            if !status.success() {
                let mut stderr_buf = String::new();
                if let Some(mut stderr) = child.stderr.take() {
                    let _ = stderr.read_to_string(&mut stderr_buf).await;
                }
                return Err(XdscpError::new(ErrorCode::RenderError, format!("render subprocess exited with {:?}", status.code()))
                    .with_context("stderr", stderr_buf));
            }
            let Some(line) = result_line else {
                return Err(XdscpError::new(ErrorCode::RenderError, "render subprocess exited without producing a result line"));
            };
            let result: RenderJobResult = serde_json::from_str(&line)
                .map_err(|e| XdscpError::new(ErrorCode::RenderError, "render subprocess produced unreadable output").with_source(e))?;
            match result {
                RenderJobResult::Ok(entry) => Ok(entry),
                RenderJobResult::Err(dto) => Err(error_from_dto(dto)),
            }
        }
        Ok((_, Err(e))) => Err(XdscpError::new(ErrorCode::RenderError, "failed to wait on render subprocess").with_source(e)),
        Err(_) => {
            let _ = child.start_kill();
            Err(XdscpError::new(ErrorCode::TimeoutError, format!("render exceeded {}s timeout", timeout.as_secs())))
        }
    }
}

/// Read one [`RenderJob`] from stdin, render it with `pipeline`, and write
/// a [`RenderJobResult`] to stdout. This is the body of the `render-worker`
/// subcommand; it never returns an `Err` itself — render failures are
/// folded into the result written to stdout so the parent always gets a
/// well-formed reply.
pub async fn run_render_worker(pipeline: &crate::pipeline::RenderPipeline) -> Result<(), XdscpError> {
    let mut raw = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut raw)
        .await
        .map_err(|e| XdscpError::new(ErrorCode::InternalError, "failed to read render job from stdin").with_source(e))?;

    let job: RenderJob = serde_json::from_slice(&raw)
        .map_err(|e| XdscpError::new(ErrorCode::InternalError, "malformed render job on stdin").with_source(e))?;

    let result = match pipeline.render_entry(&job.request, &job.source_data, &job.context_values) {
        Ok(entry) => RenderJobResult::Ok(entry),
        Err(e) => RenderJobResult::Err(XdscpErrorDto::from(&e)),
    };

    let encoded = serde_json::to_vec(&result)
        .map_err(|e| XdscpError::new(ErrorCode::InternalError, "render result not serialisable").with_source(e))?;
    tokio::io::stdout()
        .write_all(&encoded)
        .await
        .map_err(|e| XdscpError::new(ErrorCode::InternalError, "failed to write render result to stdout").with_source(e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_job_round_trips_through_json() {
        let job = RenderJob {
            request: DiscoveryRequest {
                node: xdscp_core::Node::new("p", "c"),
                version_info: String::new(),
                resource_names: vec![],
                api_version: xdscp_core::ApiVersion::V3,
                resource_type: xdscp_core::ResourceType::Clusters,
                desired_controlplane: None,
                is_internal_request: false,
            },
            source_data: SourceData::new(),
            context_values: BTreeMap::new(),
        };
        let bytes = serde_json::to_vec(&job).unwrap();
        let back: RenderJob = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.request.node.cluster, "c");
    }
}

use genmux_common::protocol::error::{DispatchError, Result};
use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// Sends a request and returns the JSON body of a 2xx response.
pub(super) async fn send_json(builder: RequestBuilder, timeout: Duration) -> Result<Value> {
    let response = send(builder, timeout).await?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| map_reqwest_error(e, timeout))?;

    serde_json::from_str(&body).map_err(|e| malformed(status, e))
}

/// Sends a request and discards the body of a 2xx response.
pub(super) async fn send_empty(builder: RequestBuilder, timeout: Duration) -> Result<()> {
    send(builder, timeout).await.map(|_| ())
}

async fn send(builder: RequestBuilder, timeout: Duration) -> Result<Response> {
    let response = builder
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| map_reqwest_error(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DispatchError::NodeApi {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> DispatchError {
    if error.is_timeout() {
        DispatchError::NodeTimeout(timeout.as_millis() as u64)
    } else {
        DispatchError::Transport(error.to_string())
    }
}

pub(super) fn malformed(status: u16, detail: impl std::fmt::Display) -> DispatchError {
    DispatchError::NodeApi {
        status,
        body: format!("malformed response: {}", detail),
    }
}

/// Pulls a string out of a JSON body by pointer, or reports the body as malformed.
pub(super) fn text_at(body: &Value, pointer: &str) -> Result<String> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed(200, format!("missing {}", pointer)))
}

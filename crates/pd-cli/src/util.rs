//! Shared HTTP plumbing: every sub-command talks JSON over HTTP to a
//! `pd-server` node's admin surface (spec.md §6), so the request/response
//! and error-decoding logic lives in one place.

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Decodes the `{"error": {"code", "message", "leader_addr"}}` body a
/// `pd-server` admin handler returns on failure, falling back to the raw
/// status line if the body isn't in that shape.
async fn error_from_response(resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    match resp.json::<Value>().await {
        Ok(body) => {
            let message = body["error"]["message"].as_str().unwrap_or("unknown error");
            match body["error"]["leader_addr"].as_str() {
                Some(addr) => anyhow!("{status}: {message} (current leader: {addr})"),
                None => anyhow!("{status}: {message}"),
            }
        }
        Err(_) => anyhow!("request failed with status {status}"),
    }
}

pub async fn get_json<T: DeserializeOwned>(addr: &str, path: &str) -> Result<T> {
    let resp = client().get(format!("http://{addr}{path}")).send().await?;
    if !resp.status().is_success() {
        return Err(error_from_response(resp).await);
    }
    Ok(resp.json().await?)
}

pub async fn post_json<B: serde::Serialize, T: DeserializeOwned>(addr: &str, path: &str, body: &B) -> Result<T> {
    let resp = client().post(format!("http://{addr}{path}")).json(body).send().await?;
    if !resp.status().is_success() {
        return Err(error_from_response(resp).await);
    }
    Ok(resp.json().await?)
}

pub async fn put_json<B: serde::Serialize, T: DeserializeOwned>(addr: &str, path: &str, body: &B) -> Result<T> {
    let resp = client().put(format!("http://{addr}{path}")).json(body).send().await?;
    if !resp.status().is_success() {
        return Err(error_from_response(resp).await);
    }
    Ok(resp.json().await?)
}

pub async fn delete_json<T: DeserializeOwned>(addr: &str, path: &str) -> Result<T> {
    let resp = client().delete(format!("http://{addr}{path}")).send().await?;
    if !resp.status().is_success() {
        return Err(error_from_response(resp).await);
    }
    Ok(resp.json().await?)
}

/// Parses a region `key` argument: either a raw UTF-8 string or a
/// protobuf-text-escaped byte string using `\NNN` octal escapes, passed
/// straight through to the server which performs the actual decode
/// (spec.md §6 "Region's `key` sub-command").
pub fn format_key_arg(raw: &str, format: &str) -> Result<String> {
    match format {
        "raw" | "proto" | "protobuf" | "pb" => Ok(raw.to_string()),
        other => Err(anyhow!("unknown key format '{other}', expected raw|pb|proto|protobuf")),
    }
}

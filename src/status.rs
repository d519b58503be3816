//! Status Query: the read-only observation point consumed by the enclosing
//! proxy's peer selector, plus the snapshot and renderer behind the optional
//! operator status endpoint.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::ids::WorkerId;
use crate::parser::TerminalOutcome;
use crate::registry::Registry;

/// HTTP method of a status-endpoint request, as the core sees it. The core
/// never parses a full request — the embedder's HTTP server hands this in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Other,
}

/// Parses a raw HTTP method token (as lifted from a request line by the
/// embedder's HTTP server) into a [`Method`]; anything other than GET/HEAD
/// maps to `Other` rather than failing, since §6 requires the endpoint to
/// answer 405 rather than error out.
fn parse_method(raw: &str) -> Method {
    match raw {
        "GET" => Method::Get,
        "HEAD" => Method::Head,
        _ => Method::Other,
    }
}

/// Outer-boundary handler for the optional operator status endpoint: takes
/// the raw method token off the wire, builds a snapshot, and renders it.
/// Mirrors the teacher's `handle_peers_request` shape (`api/peers.rs`) —
/// an async entry point returning `anyhow::Result` with `.context()` on the
/// one fallible step (decoding the method token), even though the render
/// path itself cannot fail.
pub async fn handle_status_request(
    registry: &Registry,
    raw_method: &[u8],
) -> anyhow::Result<(u16, Bytes)> {
    let method_str =
        std::str::from_utf8(raw_method).context("status endpoint method token is not UTF-8")?;
    let method = parse_method(method_str);
    let snap = snapshot(registry);
    Ok(render_status_page(&snap, method))
}

/// One row of the status table: `index, name, owner, action_time, run_length,
/// since, last_verdict, last_code (as text), down`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    pub index: u32,
    pub name: String,
    pub addr: std::net::SocketAddr,
    pub owner: Option<u64>,
    pub action_time_ms: u64,
    pub run_length: u32,
    pub since_ms: u64,
    pub last_verdict_bad: bool,
    pub last_code: &'static str,
    pub down: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub rows: Vec<StatusRow>,
}

/// Builds a point-in-time snapshot of every registered peer's shared slot.
/// Cross-field consistency is not guaranteed for any row — this is an
/// operator diagnostic view, not a basis for routing decisions.
pub fn snapshot(registry: &Registry) -> StatusSnapshot {
    let rows = registry
        .peers()
        .map(|(idx, cfg, slot)| StatusRow {
            index: idx.as_u32(),
            name: cfg.upstream.clone(),
            addr: cfg.addr,
            owner: slot.owner().map(WorkerId::as_u64),
            action_time_ms: slot.action_time_ms(),
            run_length: slot.run_length(),
            since_ms: slot.since_ms(),
            last_verdict_bad: slot.last_verdict_bad(),
            last_code: outcome_name(slot.last_code()),
            down: slot.is_down(),
        })
        .collect();
    StatusSnapshot { rows }
}

fn outcome_name(outcome: TerminalOutcome) -> &'static str {
    outcome.as_str()
}

/// Renders the status snapshot as JSON into a single growable backing
/// buffer rather than reallocating on overflow.
///
/// Responds 405 to anything other than GET/HEAD.
pub fn render_status_page(snapshot: &StatusSnapshot, method: Method) -> (u16, Bytes) {
    if matches!(method, Method::Other) {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_slice(b"method not allowed");
        return (405, buf.freeze());
    }

    let body = match method {
        Method::Get => serde_json::to_vec(snapshot).unwrap_or_default(),
        // HEAD: same status line, no body.
        Method::Head => Vec::new(),
        Method::Other => unreachable!(),
    };

    let mut buf = BytesMut::with_capacity(body.len());
    buf.put_slice(&body);
    (200, buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> StatusSnapshot {
        StatusSnapshot {
            rows: vec![StatusRow {
                index: 0,
                name: "api".into(),
                addr: "127.0.0.1:8080".parse().unwrap(),
                owner: Some(7),
                action_time_ms: 10,
                run_length: 3,
                since_ms: 1,
                last_verdict_bad: false,
                last_code: "ok",
                down: false,
            }],
        }
    }

    #[test]
    fn get_renders_json_body() {
        let (status, body) = render_status_page(&sample_snapshot(), Method::Get);
        assert_eq!(status, 200);
        assert!(!body.is_empty());
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["rows"][0]["name"], "api");
    }

    #[test]
    fn head_renders_empty_body() {
        let (status, body) = render_status_page(&sample_snapshot(), Method::Head);
        assert_eq!(status, 200);
        assert!(body.is_empty());
    }

    #[test]
    fn other_methods_are_rejected() {
        let (status, _) = render_status_page(&sample_snapshot(), Method::Other);
        assert_eq!(status, 405);
    }

    #[test]
    fn parse_method_is_case_sensitive_and_defaults_to_other() {
        assert_eq!(parse_method("GET"), Method::Get);
        assert_eq!(parse_method("HEAD"), Method::Head);
        assert_eq!(parse_method("get"), Method::Other);
        assert_eq!(parse_method("POST"), Method::Other);
    }

    #[tokio::test]
    async fn handle_status_request_rejects_non_utf8_method() {
        let registry = crate::registry::Registry::builder().build();
        let err = handle_status_request(&registry, &[0xff, 0xfe]).await.unwrap_err();
        assert!(err.to_string().contains("not UTF-8"));
    }

    #[tokio::test]
    async fn handle_status_request_renders_get() {
        let registry = crate::registry::Registry::builder().build();
        let (status, body) = handle_status_request(&registry, b"GET").await.unwrap();
        assert_eq!(status, 200);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["rows"].as_array().unwrap().is_empty());
    }
}

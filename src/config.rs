//! Static, owner-agnostic per-peer configuration.
//!
//! Directive parsing itself (the `delay`/`timeout`/`failcount`/`send`/
//! `expected`/`buffer` text directives) is an external collaborator — the
//! core only consumes the already-parsed values (SPEC_FULL.md §6). This
//! module is the Rust shape of that consumed configuration plus the one
//! piece of text-to-bytes transformation the spec assigns to the core: the
//! `send` line concatenation.

use std::net::SocketAddr;
use std::time::Duration;

/// The expected response body for a healthy probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    /// Any body is accepted once the header section ends.
    Any,
    /// The body must be a literal byte-for-byte prefix match, with no extra
    /// trailing bytes (SPEC_FULL.md §4.4).
    Literal(Vec<u8>),
}

impl Expected {
    pub fn len(&self) -> usize {
        match self {
            Expected::Any => 0,
            Expected::Literal(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Expected::Any) || self.len() == 0
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Expected::Any)
    }

    pub(crate) fn byte_at(&self, pos: usize) -> Option<u8> {
        match self {
            Expected::Any => None,
            Expected::Literal(bytes) => bytes.get(pos).copied(),
        }
    }
}

/// Builds the raw `send` payload from an ordered list of text lines: each
/// line is followed by `CRLF`, and the whole payload is terminated by one
/// extra `CRLF`, producing the blank-line terminator of an HTTP request.
///
/// Example: `build_send_payload(&["GET /health HTTP/1.1", "Host: x", "Connection: close"])`
/// yields `"GET /health HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n"`.
pub fn build_send_payload<S: AsRef<str>>(lines: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        out.extend_from_slice(line.as_ref().as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Static configuration for one registered peer. Immutable after
/// registration — this is the "static configuration" field of the private
/// entry in SPEC_FULL.md §3.1.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Upstream group name this peer belongs to, for logging and the status
    /// page only — never used as an identity.
    pub upstream: String,
    pub addr: SocketAddr,
    /// Raw bytes written verbatim to the peer at the start of every probe.
    pub send_payload: Vec<u8>,
    pub expected: Expected,
    /// Size of the per-worker read buffer; must accommodate headers + body.
    pub buffer_size: usize,
    /// Delay between the end of one probe and the start of the next.
    pub delay: Duration,
    /// Per-probe timeout, measured from `probe_started_at`.
    pub timeout: Duration,
    /// Consecutive like-kind outcomes required to flip `down`.
    pub failcount: u32,
    /// Whether this peer participates in health checking at all
    /// (the `enabled` directive, per upstream group).
    pub enabled: bool,
}

impl PeerConfig {
    /// Staleness deadline beyond which a peer's current owner is presumed
    /// dead: `(delay + timeout) * 3` (SPEC_FULL.md §4.1, Glossary).
    pub fn staleness_deadline(&self) -> Duration {
        (self.delay + self.timeout) * 3
    }

    /// Retry delay for a worker that failed to claim an owned, live peer:
    /// `delay * 10` (SPEC_FULL.md §4.1 step 7).
    pub fn claim_retry_delay(&self) -> Duration {
        self.delay * 10
    }
}

/// Builder for [`PeerConfig`], mirroring the teacher's builder-style
/// construction (`edge/core/builder.rs`) but scoped to one peer's static
/// configuration rather than a whole service.
pub struct PeerConfigBuilder {
    upstream: String,
    addr: SocketAddr,
    send_lines: Vec<String>,
    expected: Expected,
    buffer_size: usize,
    delay: Duration,
    timeout: Duration,
    failcount: u32,
    enabled: bool,
}

impl PeerConfigBuilder {
    pub fn new(upstream: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            upstream: upstream.into(),
            addr,
            send_lines: Vec::new(),
            expected: Expected::Any,
            buffer_size: 4096,
            delay: Duration::from_secs(5),
            timeout: Duration::from_secs(2),
            failcount: 2,
            enabled: true,
        }
    }

    pub fn send_lines<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.send_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn expected_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.expected = Expected::Literal(body.into());
        self
    }

    pub fn expected_any(mut self) -> Self {
        self.expected = Expected::Any;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn failcount(mut self, failcount: u32) -> Self {
        self.failcount = failcount;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn build(self) -> PeerConfig {
        let send_payload = build_send_payload(&self.send_lines);
        PeerConfig {
            upstream: self.upstream,
            addr: self.addr,
            send_payload,
            expected: self.expected,
            buffer_size: self.buffer_size,
            delay: self.delay,
            timeout: self.timeout,
            failcount: self.failcount,
            enabled: self.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_payload_concatenates_with_crlf_and_final_blank_line() {
        let payload =
            build_send_payload(&["GET /health HTTP/1.1", "Host: x", "Connection: close"]);
        assert_eq!(
            payload,
            b"GET /health HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn builder_defaults_are_sane() {
        let cfg = PeerConfigBuilder::new("api", "127.0.0.1:8080".parse().unwrap())
            .send_lines(["GET / HTTP/1.0"])
            .expected_body(*b"pong")
            .build();
        assert_eq!(cfg.failcount, 2);
        assert!(cfg.enabled);
        assert_eq!(cfg.expected, Expected::Literal(b"pong".to_vec()));
    }
}

//! The probe lifecycle (SPEC_FULL.md §4.3): the send/receive/parse sequence
//! over a single TCP connection per probe.
//!
//! The overall per-probe deadline is enforced the way SPEC_FULL.md §4.3/§5
//! describe it: "the write side has no independent timeout; a stuck
//! connect/send is caught by the same read-side timer because readable and
//! writable readiness share the timeout" — here that's one
//! `tokio::time::timeout` wrapping connect+send+recv+parse as a whole.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::PeerConfig;
use crate::parser::{self, ParserState, StepResult, TerminalOutcome};

/// High-level lifecycle state of a probe, as distinct from the parser's own
/// states (SPEC_FULL.md §4.5 groups `UninitState`/`Waiting`/`Sending` with
/// the parser states under one enum; here they are two enums, per the Rust
/// encoding note in §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// No probe has ever run for this peer in this worker's lifetime.
    UninitState,
    /// Owned, waiting for `delay_timer` to fire.
    Waiting,
    /// Connected, writing the send payload.
    Sending,
    /// Payload fully sent; reading and parsing the response.
    Parsing(ParserState),
}

/// Per-(worker, peer) scratch state (SPEC_FULL.md §3 "Private entry"):
/// connection handle, read buffer, and the three probe cursors. Reused and
/// reset at the start of every probe rather than reallocated.
pub struct PrivateEntry {
    pub probe_state: ProbeState,
    pub read_buf: BytesMut,
    pub send_pos: usize,
    pub read_pos: usize,
    pub probe_started_at: Option<tokio::time::Instant>,
}

impl PrivateEntry {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            probe_state: ProbeState::UninitState,
            read_buf: BytesMut::with_capacity(buffer_size),
            send_pos: 0,
            read_pos: 0,
            probe_started_at: None,
        }
    }

    fn reset_for_new_probe(&mut self) {
        self.read_buf.clear();
        self.send_pos = 0;
        self.read_pos = 0;
        self.probe_started_at = Some(tokio::time::Instant::now());
        self.probe_state = ProbeState::Sending;
    }
}

/// Runs one connect+send+recv+parse cycle against `cfg.addr`, returning the
/// terminal outcome. Never returns early without a terminal value — every
/// exit path in SPEC_FULL.md §4.3 is represented.
pub async fn run_probe(cfg: &PeerConfig, entry: &mut PrivateEntry) -> TerminalOutcome {
    entry.reset_for_new_probe();

    match tokio::time::timeout(cfg.timeout, probe_body(cfg, entry)).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => TerminalOutcome::Timeout,
    }
}

async fn probe_body(cfg: &PeerConfig, entry: &mut PrivateEntry) -> TerminalOutcome {
    let mut stream = match TcpStream::connect(cfg.addr).await {
        Ok(stream) => stream,
        Err(_) => return TerminalOutcome::BadConn,
    };

    if let Some(outcome) = write_payload(&mut stream, cfg, entry).await {
        return outcome;
    }

    entry.probe_state = ProbeState::Parsing(ParserState::default());
    read_and_parse(&mut stream, cfg, entry).await
}

/// Writes `cfg.send_payload` from `entry.send_pos`, looping on short writes.
/// Returns `Some(outcome)` on a terminal condition, `None` once the full
/// payload has been sent (SPEC_FULL.md §4.3 "Write side").
async fn write_payload(
    stream: &mut TcpStream,
    cfg: &PeerConfig,
    entry: &mut PrivateEntry,
) -> Option<TerminalOutcome> {
    while entry.send_pos < cfg.send_payload.len() {
        match stream.write(&cfg.send_payload[entry.send_pos..]).await {
            Ok(0) => return Some(TerminalOutcome::BadConn),
            Ok(n) => entry.send_pos += n,
            Err(_) => return Some(TerminalOutcome::BadConn),
        }
    }
    None
}

/// Reads into `entry.read_buf` up to `cfg.buffer_size` bytes total, invoking
/// the parser on every chunk appended, per SPEC_FULL.md §4.3 "Read side".
async fn read_and_parse(
    stream: &mut TcpStream,
    cfg: &PeerConfig,
    entry: &mut PrivateEntry,
) -> TerminalOutcome {
    let mut parser_state = ParserState::default();
    let mut chunk = vec![0u8; cfg.buffer_size.max(1)];

    loop {
        if entry.read_pos >= cfg.buffer_size {
            return TerminalOutcome::FullBuffer;
        }

        let remaining = cfg.buffer_size - entry.read_pos;
        let n = match stream.read(&mut chunk[..remaining]).await {
            Ok(0) => return TerminalOutcome::BadConn,
            Ok(n) => n,
            Err(_) => return TerminalOutcome::BadConn,
        };

        entry.read_buf.extend_from_slice(&chunk[..n]);
        entry.read_pos += n;

        match parser::feed(parser_state, &chunk[..n], &cfg.expected) {
            StepResult::Terminal(outcome) => return outcome,
            StepResult::NeedMore(next) => {
                parser_state = next;
                entry.probe_state = ProbeState::Parsing(next);
                if entry.read_pos >= cfg.buffer_size {
                    return TerminalOutcome::FullBuffer;
                }
            }
        }
    }
}

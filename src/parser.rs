//! The incremental HTTP response recognizer.
//!
//! A pure, allocation-free `step(state, byte) -> StepResult` function: it
//! consumes bytes one at a time, never backtracks, and is driven by
//! [`crate::probe`] but has no dependency on it — every chunk-invariance and
//! determinism property is testable directly against this module with no
//! runtime at all.

use crate::config::Expected;

/// In-progress parser states. `UninitState` and `Waiting`/`Sending` are
/// probe-lifecycle states owned by [`crate::probe`], not the parser — the
/// parser's own state machine starts at `ReadingStatusLine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    ReadingStatusLine,
    ReadingStatusCode { stat_code: u32 },
    ReadingHeader,
    HeaderAlmostDone,
    ReadingBody { body_match_pos: usize },
}

impl Default for ParserState {
    fn default() -> Self {
        ParserState::ReadingStatusLine
    }
}

/// Terminal probe outcomes. This is the value written to
/// `SharedSlot.last_code`; `#[repr(u8)]` so it packs directly into an
/// `AtomicU8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TerminalOutcome {
    Ok = 100,
    BadHeader = 200,
    BadStatus = 201,
    BadBody = 202,
    BadState = 203,
    BadConn = 204,
    BadCode = 205,
    Timeout = 206,
    FullBuffer = 207,
}

impl TerminalOutcome {
    /// `bad = (t != OK)`, the input the verdict filter flaps on.
    pub fn is_bad(self) -> bool {
        self != TerminalOutcome::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TerminalOutcome::Ok => "ok",
            TerminalOutcome::BadHeader => "bad_header",
            TerminalOutcome::BadStatus => "bad_status",
            TerminalOutcome::BadBody => "bad_body",
            TerminalOutcome::BadState => "bad_state",
            TerminalOutcome::BadConn => "bad_conn",
            TerminalOutcome::BadCode => "bad_code",
            TerminalOutcome::Timeout => "timeout",
            TerminalOutcome::FullBuffer => "full_buffer",
        }
    }
}

impl std::fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of feeding bytes to the parser: either it needs more bytes, or
/// it has reached a terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    NeedMore(ParserState),
    Terminal(TerminalOutcome),
}

/// Consumes a single byte against the current parser state. Pure, `#[inline]`
/// eligible, allocation-free.
pub fn step(state: ParserState, byte: u8, expected: &Expected) -> StepResult {
    use ParserState::*;
    match state {
        ReadingStatusLine => match byte {
            b' ' => StepResult::NeedMore(ReadingStatusCode { stat_code: 0 }),
            b'\r' | b'\n' => StepResult::Terminal(TerminalOutcome::BadStatus),
            _ => StepResult::NeedMore(ReadingStatusLine),
        },
        ReadingStatusCode { stat_code } => match byte {
            b' ' => {
                if stat_code == 200 {
                    StepResult::NeedMore(ReadingHeader)
                } else {
                    StepResult::Terminal(TerminalOutcome::BadCode)
                }
            }
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u32;
                StepResult::NeedMore(ReadingStatusCode {
                    stat_code: stat_code * 10 + digit,
                })
            }
            _ => StepResult::Terminal(TerminalOutcome::BadStatus),
        },
        ReadingHeader => match byte {
            b'\n' => StepResult::NeedMore(HeaderAlmostDone),
            _ => StepResult::NeedMore(ReadingHeader),
        },
        HeaderAlmostDone => match byte {
            b'\n' => {
                if expected.is_any() {
                    StepResult::Terminal(TerminalOutcome::Ok)
                } else {
                    StepResult::NeedMore(ReadingBody { body_match_pos: 0 })
                }
            }
            b'\r' => StepResult::NeedMore(HeaderAlmostDone),
            _ => StepResult::NeedMore(ReadingHeader),
        },
        ReadingBody { body_match_pos } => {
            let expected_len = expected.len();
            if body_match_pos >= expected_len {
                // Would exceed expected length: any further byte is extra.
                return StepResult::Terminal(TerminalOutcome::BadBody);
            }
            match expected.byte_at(body_match_pos) {
                // Stay in ReadingBody even once the last expected byte has
                // matched — OK is only declared after the consume loop ends
                // (see `feed`), so a following extra byte still hits the
                // `body_match_pos >= expected_len` branch above and fails.
                Some(want) if want == byte => StepResult::NeedMore(ReadingBody {
                    body_match_pos: body_match_pos + 1,
                }),
                _ => StepResult::Terminal(TerminalOutcome::BadBody),
            }
        }
    }
}

/// Folds [`step`] over a byte slice, starting from `state`, stopping as soon
/// as a terminal outcome is produced. This is the chunk-boundary-agnostic
/// entry point `probe.rs` calls on every readable event; chunk-invariance
/// follows directly from `step` being pure and from this fold containing no
/// lookahead.
///
/// After the loop, a `ReadingBody` state whose `body_match_pos` has reached
/// the expected length is the one place OK is declared outside of `step`
/// itself (SPEC_FULL.md §4.4: "after the consume loop, if state is
/// `ReadingBody` and `body_match_pos == expected.len`, transition to
/// terminal `OK`") — it means the buffer ran out exactly on the last
/// expected byte, with nothing left to prove it isn't followed by more.
pub fn feed(mut state: ParserState, bytes: &[u8], expected: &Expected) -> StepResult {
    for &byte in bytes {
        match step(state, byte, expected) {
            StepResult::NeedMore(next) => state = next,
            terminal @ StepResult::Terminal(_) => return terminal,
        }
    }
    if let ParserState::ReadingBody { body_match_pos } = state {
        if body_match_pos == expected.len() {
            return StepResult::Terminal(TerminalOutcome::Ok);
        }
    }
    StepResult::NeedMore(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_from_start(bytes: &[u8], expected: &Expected) -> StepResult {
        feed(ParserState::default(), bytes, expected)
    }

    #[test]
    fn b3_any_body_ok_after_two_newlines() {
        let result = feed_from_start(b"HTTP/1.1 200 OK\r\n\r\n", &Expected::Any);
        assert_eq!(result, StepResult::Terminal(TerminalOutcome::Ok));
    }

    #[test]
    fn b4_bad_code_regardless_of_body() {
        let result = feed_from_start(b"HTTP/1.1 404 Not Found\r\n\r\nanything", &Expected::Any);
        assert_eq!(result, StepResult::Terminal(TerminalOutcome::BadCode));
    }

    #[test]
    fn b5_missing_status_token_is_bad_status() {
        let result = feed_from_start(b"\r\n", &Expected::Any);
        assert_eq!(result, StepResult::Terminal(TerminalOutcome::BadStatus));
    }

    #[test]
    fn s1_exact_body_match_is_ok() {
        let expected = Expected::Literal(b"pong".to_vec());
        let result = feed_from_start(
            b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\npong",
            &expected,
        );
        assert_eq!(result, StepResult::Terminal(TerminalOutcome::Ok));
    }

    #[test]
    fn s2_non_200_is_bad_code() {
        let expected = Expected::Literal(b"pong".to_vec());
        let result = feed_from_start(b"HTTP/1.1 500 X\r\n\r\n", &expected);
        assert_eq!(result, StepResult::Terminal(TerminalOutcome::BadCode));
    }

    #[test]
    fn s3_body_mismatch_is_bad_body() {
        let expected = Expected::Literal(b"pong".to_vec());
        let result = feed_from_start(b"HTTP/1.1 200 OK\r\n\r\nping", &expected);
        assert_eq!(result, StepResult::Terminal(TerminalOutcome::BadBody));
    }

    #[test]
    fn s4_extra_trailing_body_byte_is_bad_body() {
        let expected = Expected::Literal(b"pong".to_vec());
        let result = feed_from_start(b"HTTP/1.1 200 OK\r\n\r\npongX", &expected);
        assert_eq!(result, StepResult::Terminal(TerminalOutcome::BadBody));
    }

    #[test]
    fn b1_body_exactly_filling_buffer_is_ok_not_full_buffer() {
        // The buffer/FullBuffer distinction lives in probe.rs; at the parser
        // level, a response that ends exactly at the expected body's last
        // byte must terminate OK on that very byte, not NeedMore.
        let expected = Expected::Literal(b"pong".to_vec());
        let result = feed_from_start(b"HTTP/1.1 200 OK\r\n\r\npong", &expected);
        assert_eq!(result, StepResult::Terminal(TerminalOutcome::Ok));
    }

    #[test]
    fn b2_one_extra_byte_past_expected_is_bad_body() {
        let expected = Expected::Literal(b"pong".to_vec());
        let result = feed_from_start(b"HTTP/1.1 200 OK\r\n\r\npong!", &expected);
        assert_eq!(result, StepResult::Terminal(TerminalOutcome::BadBody));
    }

    #[test]
    fn incomplete_response_needs_more() {
        let result = feed_from_start(b"HTTP/1.1 200 ", &Expected::Any);
        assert!(matches!(result, StepResult::NeedMore(_)));
    }

    #[test]
    fn r1_chunk_invariance_manual_split() {
        let expected = Expected::Literal(b"pong".to_vec());
        let whole = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\npong";
        let whole_result = feed_from_start(whole, &expected);

        for split in 0..whole.len() {
            let (a, b) = whole.split_at(split);
            let state = match feed(ParserState::default(), a, &expected) {
                StepResult::NeedMore(s) => s,
                terminal @ StepResult::Terminal(_) => {
                    // If the first half already reached a terminal, the
                    // second half is never fed (mirrors probe.rs finishing
                    // the probe on first terminal). Chunk-invariance only
                    // claims the overall verdict matches; skip ahead.
                    assert_eq!(terminal, whole_result);
                    continue;
                }
            };
            let split_result = feed(state, b, &expected);
            assert_eq!(split_result, whole_result, "split at {split} diverged");
        }
    }
}

//! Result classifier
//!
//! Folds the message stream a kernel emits for one request into exactly one
//! [`ExecutionOutcome`]. Messages whose parent id is not the current request
//! are ignored; the first terminal message for the request decides:
//!
//! | message | effect |
//! |---|---|
//! | `stream` | text appended (pip "already satisfied" lines dropped) |
//! | `execute_result` | `text/plain` appended |
//! | `display_data` | PNG ends with `Image`; plain text appended; else `Error` |
//! | `error` | ends with `Error("{ename}: {evalue}")` |
//! | `status: idle` | ends with the accumulated `Text` |

use crate::channel::{ExecutionState, KernelMessage, MessageKind, MimeBundle};
use crate::outcome::ExecutionOutcome;

/// Output longer than this many characters is cut down to its tail
pub const MAX_OUTPUT_CHARS: usize = 500;

/// Prefix marking truncated output
pub const TRUNCATION_MARKER: &str = "[...]\n";

/// Text returned when the code ran and printed nothing
pub const NO_OUTPUT: &str = "code run successfully (no output)";

/// Error returned for display payloads with neither PNG nor plain text
pub const UNPARSEABLE_OUTPUT: &str = "Could not parse output";

const ALREADY_SATISFIED: &str = "Requirement already satisfied:";

/// Classifies the replies to a single request
#[derive(Debug)]
pub struct ResultClassifier {
    msg_id: String,
    lines: Vec<String>,
}

impl ResultClassifier {
    pub fn new(msg_id: impl Into<String>) -> Self {
        Self {
            msg_id: msg_id.into(),
            lines: Vec::new(),
        }
    }

    pub fn msg_id(&self) -> &str {
        &self.msg_id
    }

    /// Feed one message; returns the outcome once a terminal message arrives
    pub fn observe(&mut self, message: KernelMessage) -> Option<ExecutionOutcome> {
        if !message.is_reply_to(&self.msg_id) {
            return None;
        }

        match message.kind {
            MessageKind::Stream { text } => {
                self.push_stream(&text);
                None
            }
            MessageKind::ExecuteResult(bundle) => {
                if let Some(text) = bundle.text() {
                    self.push_text(text);
                }
                None
            }
            MessageKind::DisplayData(bundle) => self.display(bundle),
            MessageKind::Error { ename, evalue } => {
                Some(ExecutionOutcome::error(format!("{}: {}", ename, evalue)))
            }
            MessageKind::Status(ExecutionState::Idle) => Some(self.finish()),
            MessageKind::Status(_) | MessageKind::Other(_) => None,
        }
    }

    fn display(&mut self, bundle: MimeBundle) -> Option<ExecutionOutcome> {
        if let Some(png) = bundle.png() {
            return Some(ExecutionOutcome::png(png));
        }
        match bundle.text() {
            Some(text) => {
                self.push_text(text);
                None
            }
            None => Some(ExecutionOutcome::error(UNPARSEABLE_OUTPUT)),
        }
    }

    fn push_stream(&mut self, text: &str) {
        let kept: Vec<&str> = text
            .lines()
            .filter(|line| !line.contains(ALREADY_SATISFIED))
            .collect();
        self.push_text(&kept.join("\n"));
    }

    fn push_text(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.lines.push(text.to_string());
        }
    }

    fn finish(&mut self) -> ExecutionOutcome {
        let output = self.lines.join("\n");
        if output.is_empty() {
            ExecutionOutcome::text(NO_OUTPUT)
        } else {
            ExecutionOutcome::text(truncate_output(&output))
        }
    }
}

/// Keep the last [`MAX_OUTPUT_CHARS`] characters behind a marker
pub fn truncate_output(text: &str) -> String {
    let count = text.chars().count();
    if count <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - MAX_OUTPUT_CHARS).collect();
    format!("{}{}", TRUNCATION_MARKER, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    const REQ: &str = "req-1";

    fn reply(kind: MessageKind) -> KernelMessage {
        KernelMessage::new(Some(REQ), kind)
    }

    fn stream(text: &str) -> KernelMessage {
        reply(MessageKind::Stream { text: text.into() })
    }

    fn idle() -> KernelMessage {
        reply(MessageKind::Status(ExecutionState::Idle))
    }

    fn bundle(value: Value) -> MimeBundle {
        match value {
            Value::Object(map) => MimeBundle(map),
            _ => MimeBundle(Map::new()),
        }
    }

    fn run_to_end(messages: Vec<KernelMessage>) -> Option<ExecutionOutcome> {
        let mut classifier = ResultClassifier::new(REQ);
        messages.into_iter().find_map(|m| classifier.observe(m))
    }

    #[test]
    fn test_silent_code_yields_sentinel() {
        let outcome = run_to_end(vec![reply(MessageKind::Status(ExecutionState::Busy)), idle()]);
        assert_eq!(outcome, Some(ExecutionOutcome::text(NO_OUTPUT)));
    }

    #[test]
    fn test_expression_value() {
        let outcome = run_to_end(vec![
            reply(MessageKind::ExecuteResult(bundle(json!({"text/plain": "2"})))),
            idle(),
        ]);
        assert_eq!(outcome, Some(ExecutionOutcome::text("2")));
    }

    #[test]
    fn test_stream_and_result_are_merged() {
        let outcome = run_to_end(vec![
            stream("hello\n"),
            stream("world\n"),
            reply(MessageKind::ExecuteResult(bundle(json!({"text/plain": "42"})))),
            idle(),
        ]);
        assert_eq!(outcome, Some(ExecutionOutcome::text("hello\nworld\n42")));
    }

    #[test]
    fn test_pip_noise_is_filtered() {
        let outcome = run_to_end(vec![
            stream("Requirement already satisfied: pandas in /usr/lib/python3\nok\n"),
            idle(),
        ]);
        assert_eq!(outcome, Some(ExecutionOutcome::text("ok")));
    }

    #[test]
    fn test_image_wins_over_prior_text() {
        let outcome = run_to_end(vec![
            stream("plotting...\n"),
            reply(MessageKind::DisplayData(bundle(
                json!({"image/png": "iVBORw0KGgo=", "text/plain": "<Figure size 640x480>"}),
            ))),
            idle(),
        ]);
        assert_eq!(outcome, Some(ExecutionOutcome::png("iVBORw0KGgo=")));
    }

    #[test]
    fn test_text_only_display_accumulates() {
        let outcome = run_to_end(vec![
            reply(MessageKind::DisplayData(bundle(json!({"text/plain": "shown"})))),
            stream("after\n"),
            idle(),
        ]);
        assert_eq!(outcome, Some(ExecutionOutcome::text("shown\nafter")));
    }

    #[test]
    fn test_unknown_display_payload_is_error() {
        let outcome = run_to_end(vec![reply(MessageKind::DisplayData(bundle(
            json!({"text/html": "<b>hi</b>"}),
        )))]);
        assert_eq!(outcome, Some(ExecutionOutcome::error(UNPARSEABLE_OUTPUT)));
    }

    #[test]
    fn test_error_short_circuits() {
        let outcome = run_to_end(vec![
            stream("partial\n"),
            reply(MessageKind::Error {
                ename: "NameError".into(),
                evalue: "name 'x' is not defined".into(),
            }),
            idle(),
        ]);
        assert_eq!(
            outcome,
            Some(ExecutionOutcome::error("NameError: name 'x' is not defined"))
        );
    }

    #[test]
    fn test_foreign_request_ids_are_ignored() {
        let other = |kind| KernelMessage::new(Some("stale-req"), kind);
        let outcome = run_to_end(vec![
            other(MessageKind::Stream { text: "stale".into() }),
            stream("mine\n"),
            other(MessageKind::Status(ExecutionState::Idle)),
            other(MessageKind::Error {
                ename: "ValueError".into(),
                evalue: "old".into(),
            }),
            other(MessageKind::DisplayData(bundle(json!({"image/png": "AAAA"})))),
            KernelMessage::new(None, MessageKind::Status(ExecutionState::Idle)),
            stream("still mine\n"),
            idle(),
        ]);
        assert_eq!(outcome, Some(ExecutionOutcome::text("mine\nstill mine")));
    }

    #[test]
    fn test_no_terminal_message_means_no_outcome() {
        assert_eq!(run_to_end(vec![stream("running...\n")]), None);
    }

    #[test]
    fn test_long_output_keeps_tail() {
        let long: String = (0..700).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let outcome = run_to_end(vec![stream(&long), idle()]).unwrap();

        let expected = format!("[...]\n{}", &long[200..]);
        assert_eq!(outcome, ExecutionOutcome::text(expected));
    }

    #[test]
    fn test_truncate_exactly_at_limit_is_untouched() {
        let text = "x".repeat(MAX_OUTPUT_CHARS);
        assert_eq!(truncate_output(&text), text);
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let text = "é".repeat(MAX_OUTPUT_CHARS + 3);
        let truncated = truncate_output(&text);
        assert!(truncated.starts_with(TRUNCATION_MARKER));
        assert_eq!(
            truncated.chars().count(),
            TRUNCATION_MARKER.chars().count() + MAX_OUTPUT_CHARS
        );
    }
}

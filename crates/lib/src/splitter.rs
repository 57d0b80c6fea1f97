//! Live stream splitter: classifies streamed fragments into a thinking phase and a
//! response phase using the inline `<think>` / `</think>` sentinels.
//!
//! Detection is per fragment (substring containment). Nothing is buffered across fragment
//! boundaries, so a sentinel cut in two by the backend's chunking is not recognized here:
//! partial sentinel text may be rendered, and a split `</think>` does not end the thinking
//! phase. Stored replies are re-parsed by [`crate::reparse`], which matches over the whole
//! text and is not affected by chunking.

use crate::display::{ChatDisplay, UpdateTarget};
use crate::llm::{FragmentResult, LlmError};

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

pub const THINKING_LABEL: &str = "Thinking...";
pub const THINKING_COMPLETE_LABEL: &str = "Thinking complete!";

/// Remove every occurrence of both sentinels.
pub fn strip_sentinels(text: &str) -> String {
    text.replace(THINK_OPEN, "").replace(THINK_CLOSE, "")
}

/// Thinking text accumulated during one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkingPhase {
    /// Verbatim fragment text, sentinels included, up to and including the first `</think>`.
    pub raw: String,
    /// Text that followed `</think>` in the fragment that closed the phase.
    pub carry: String,
    /// True when a `</think>` ended the phase; false when the stream ran out first.
    pub complete: bool,
}

impl ThinkingPhase {
    /// Thinking text as shown to the user.
    pub fn text(&self) -> String {
        strip_sentinels(&self.raw)
    }
}

/// Response text accumulated during one turn. No sentinel handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponsePhase {
    pub content: String,
}

/// Consume fragments until the first fragment containing `</think>`, or until the stream
/// ends. Fragments after the closing one are left in `stream` for the response phase.
pub fn process_thinking_phase<I, D>(stream: &mut I, display: &mut D) -> Result<ThinkingPhase, LlmError>
where
    I: Iterator<Item = FragmentResult>,
    D: ChatDisplay,
{
    let mut phase = ThinkingPhase::default();
    display.show_progress(THINKING_LABEL, false);
    let mut target = display.create_update_target();

    for fragment in stream.by_ref() {
        let content = fragment?.content;

        if let Some(idx) = content.find(THINK_CLOSE) {
            let end = idx + THINK_CLOSE.len();
            phase.raw.push_str(&content[..end]);
            phase.carry = content[end..].to_string();
            phase.complete = true;
            display.show_progress(THINKING_COMPLETE_LABEL, true);
            log::debug!(
                "splitter: thinking complete after {} bytes",
                phase.raw.len()
            );
            return Ok(phase);
        }

        phase.raw.push_str(&content);
        if content.contains(THINK_OPEN) {
            continue;
        }
        target.render(&phase.text());
    }

    log::debug!("splitter: stream ended inside the thinking phase");
    Ok(phase)
}

/// Consume the rest of the stream as the final answer, starting with `carry`.
pub fn process_response_phase<I, D>(
    stream: &mut I,
    carry: &str,
    display: &mut D,
) -> Result<ResponsePhase, LlmError>
where
    I: Iterator<Item = FragmentResult>,
    D: ChatDisplay,
{
    let mut phase = ResponsePhase::default();
    let mut target = display.create_update_target();

    if !carry.is_empty() {
        phase.content.push_str(carry);
        target.render(&phase.content);
    }

    for fragment in stream.by_ref() {
        phase.content.push_str(&fragment?.content);
        target.render(&phase.content);
    }

    Ok(phase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayEvent, RecordingDisplay};
    use crate::llm::{FragmentStream, OllamaError};

    fn split(fragments: &[&str]) -> (ThinkingPhase, ResponsePhase, RecordingDisplay) {
        let mut stream = FragmentStream::from_fragments(fragments.iter().copied());
        let mut display = RecordingDisplay::new();
        let thinking = process_thinking_phase(&mut stream, &mut display).unwrap();
        let response = process_response_phase(&mut stream, &thinking.carry, &mut display).unwrap();
        (thinking, response, display)
    }

    /// Every way to cut `text` into three pieces, skipping cuts inside a sentinel.
    fn three_way_splits(text: &str) -> Vec<Vec<String>> {
        let inside_sentinel = |i: usize| {
            [THINK_OPEN, THINK_CLOSE].iter().any(|s| {
                text.match_indices(s)
                    .any(|(start, m)| i > start && i < start + m.len())
            })
        };
        let cuts: Vec<usize> = (0..=text.len()).filter(|&i| !inside_sentinel(i)).collect();
        let mut out = Vec::new();
        for &a in &cuts {
            for &b in cuts.iter().filter(|&&b| b >= a) {
                out.push(vec![
                    text[..a].to_string(),
                    text[a..b].to_string(),
                    text[b..].to_string(),
                ]);
            }
        }
        out
    }

    #[test]
    fn splits_thinking_and_response_for_any_clean_boundaries() {
        let text = "<think>abc</think>xyz";
        for pieces in three_way_splits(text) {
            let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
            let (thinking, response, _) = split(&refs);
            assert_eq!(thinking.text(), "abc", "pieces: {:?}", pieces);
            assert_eq!(response.content, "xyz", "pieces: {:?}", pieces);
            assert!(thinking.complete);
            assert_eq!(format!("{}{}", thinking.raw, response.content), text);
        }
    }

    #[test]
    fn single_fragment_with_both_sentinels_ends_phase() {
        let mut stream = FragmentStream::from_fragments(["<think>done</think>", "next"]);
        let mut display = RecordingDisplay::new();
        let thinking = process_thinking_phase(&mut stream, &mut display).unwrap();
        assert!(thinking.complete);
        assert_eq!(thinking.text(), "done");
        // "next" was not consumed by the thinking phase.
        let rest = process_response_phase(&mut stream, &thinking.carry, &mut display).unwrap();
        assert_eq!(rest.content, "next");
    }

    #[test]
    fn empty_fragments_change_nothing() {
        let (thinking, response, _) = split(&["", "<think>", "", "ab", "</think>", "", "x", ""]);
        assert_eq!(thinking.raw, "<think>ab</think>");
        assert_eq!(response.content, "x");
    }

    #[test]
    fn progress_and_updates_follow_the_phases() {
        let (_, _, display) = split(&["<think>", "a", "b", "</think>", "hi"]);
        assert_eq!(
            display.events(),
            vec![
                DisplayEvent::Progress {
                    label: THINKING_LABEL.to_string(),
                    complete: false
                },
                DisplayEvent::TargetCreated(0),
                DisplayEvent::Update { target: 0, text: "a".to_string() },
                DisplayEvent::Update { target: 0, text: "ab".to_string() },
                DisplayEvent::Progress {
                    label: THINKING_COMPLETE_LABEL.to_string(),
                    complete: true
                },
                DisplayEvent::TargetCreated(1),
                DisplayEvent::Update { target: 1, text: "hi".to_string() },
            ]
        );
    }

    #[test]
    fn fragment_with_open_sentinel_is_not_rendered() {
        let (_, _, display) = split(&["<think>a", "b", "</think>"]);
        // "<think>a" skipped, "b" rendered, closing fragment not rendered.
        assert_eq!(display.update_count(0), 1);
        assert_eq!(display.last_update(0).as_deref(), Some("ab"));
    }

    #[test]
    fn closing_fragment_ends_phase_without_rendering() {
        let (thinking, response, display) = split(&["<think>", "a", "b</think>x"]);
        assert_eq!(display.update_count(0), 1);
        assert_eq!(display.last_update(0).as_deref(), Some("a"));
        // The stored and returned text still include everything up to the sentinel.
        assert_eq!(thinking.text(), "ab");
        assert_eq!(response.content, "x");
    }

    #[test]
    fn missing_close_makes_everything_thinking() {
        let (thinking, response, display) = split(&["<think>", "still ", "going"]);
        assert!(!thinking.complete);
        assert_eq!(thinking.text(), "still going");
        assert_eq!(response.content, "");
        assert!(!display
            .events()
            .iter()
            .any(|e| matches!(e, DisplayEvent::Progress { complete: true, .. })));
    }

    #[test]
    fn split_close_sentinel_is_not_detected() {
        let (thinking, response, _) = split(&["<think>abc</th", "ink>xyz"]);
        assert!(!thinking.complete);
        assert_eq!(thinking.raw, "<think>abc</think>xyz");
        assert_eq!(response.content, "");
    }

    #[test]
    fn split_open_sentinel_leaks_into_display() {
        let (_, _, display) = split(&["<thi", "nk>abc", "</think>"]);
        let first = display.events().into_iter().find_map(|e| match e {
            DisplayEvent::Update { target: 0, text } => Some(text),
            _ => None,
        });
        assert_eq!(first.as_deref(), Some("<thi"));
    }

    #[test]
    fn sentinels_in_response_are_shown_literally() {
        let (_, response, _) = split(&["<think>a</think>", "b<think>c</think>"]);
        assert_eq!(response.content, "b<think>c</think>");
    }

    #[test]
    fn first_close_wins_with_nested_open() {
        let (thinking, response, _) = split(&["<think>a<think>b</think>c</think>d"]);
        assert!(thinking.complete);
        assert_eq!(thinking.text(), "ab");
        assert_eq!(response.content, "c</think>d");
    }

    #[test]
    fn stream_error_aborts_thinking() {
        let mut stream = FragmentStream::from_results(vec![
            Ok(crate::llm::StreamFragment::new("<think>a")),
            Err(LlmError::Ollama(OllamaError::Incomplete)),
        ]);
        let mut display = RecordingDisplay::new();
        let err = process_thinking_phase(&mut stream, &mut display).unwrap_err();
        assert!(matches!(err, LlmError::Ollama(OllamaError::Incomplete)));
    }

    #[test]
    fn strip_removes_all_sentinels() {
        assert_eq!(strip_sentinels("<think>a</think><think>b</think>"), "ab");
        assert_eq!(strip_sentinels("plain"), "plain");
    }
}

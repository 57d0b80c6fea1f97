//! LLM abstraction and Ollama client.
//!
//! A backend turns the conversation history into a [`FragmentStream`]: a blocking iterator
//! over a channel that a producer (e.g. the Ollama streaming task) feeds with text fragments.
//! The stream ends when the producer drops its sender; errors arrive in-band. Dropping the
//! stream cancels the producer at its next send.

mod ollama;

use std::sync::mpsc;

use crate::session::ConversationMessage;

pub use ollama::{OllamaBackend, OllamaClient, OllamaError, OllamaModel};

/// One incremental piece of model output. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFragment {
    pub content: String,
}

impl StreamFragment {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error(transparent)]
    Ollama(#[from] OllamaError),
}

/// Item type carried by a fragment stream.
pub type FragmentResult = Result<StreamFragment, LlmError>;

/// Producer half of a fragment stream.
#[derive(Clone)]
pub struct FragmentSender {
    tx: mpsc::Sender<FragmentResult>,
}

impl FragmentSender {
    /// Send a fragment. Returns false once the consumer has dropped the stream.
    pub fn send(&self, fragment: StreamFragment) -> bool {
        self.tx.send(Ok(fragment)).is_ok()
    }

    /// Report a failure to the consumer. The consumer sees it as the next item.
    pub fn fail(&self, err: LlmError) -> bool {
        self.tx.send(Err(err)).is_ok()
    }
}

/// Forward-only, non-restartable sequence of fragments.
///
/// `next()` blocks until the producer sends something, and returns `None` once every
/// sender is dropped.
pub struct FragmentStream {
    rx: mpsc::Receiver<FragmentResult>,
}

impl FragmentStream {
    /// Create a connected producer/consumer pair.
    pub fn channel() -> (FragmentSender, FragmentStream) {
        let (tx, rx) = mpsc::channel();
        (FragmentSender { tx }, FragmentStream { rx })
    }

    /// A stream that yields the given fragments in order and then ends.
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(fragments.into_iter().map(|s| Ok(StreamFragment::new(s))))
    }

    /// Like `from_fragments` but lets callers inject errors.
    pub fn from_results<I>(items: I) -> Self
    where
        I: IntoIterator<Item = FragmentResult>,
    {
        let (tx, rx) = mpsc::channel();
        for item in items {
            // Receiver is alive in this scope, so sending cannot fail.
            let _ = tx.send(item);
        }
        FragmentStream { rx }
    }
}

impl Iterator for FragmentStream {
    type Item = FragmentResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

/// Something that can stream a chat completion for the given history.
pub trait ChatBackend {
    /// Name of the model replies come from (for logs and headers).
    fn model(&self) -> &str;

    /// Start streaming a reply to `messages`. Errors that happen before the first
    /// fragment may be returned here or in-band; later ones are always in-band.
    fn stream_chat(&self, messages: &[ConversationMessage]) -> Result<FragmentStream, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fragments_yields_in_order_then_ends() {
        let mut s = FragmentStream::from_fragments(["a", "", "b"]);
        assert_eq!(s.next().unwrap().unwrap().content, "a");
        assert_eq!(s.next().unwrap().unwrap().content, "");
        assert_eq!(s.next().unwrap().unwrap().content, "b");
        assert!(s.next().is_none());
        assert!(s.next().is_none());
    }

    #[test]
    fn send_reports_dropped_consumer() {
        let (tx, stream) = FragmentStream::channel();
        assert!(tx.send(StreamFragment::new("x")));
        drop(stream);
        assert!(!tx.send(StreamFragment::new("y")));
    }

    #[test]
    fn consumer_blocks_until_producer_sends() {
        let (tx, mut stream) = FragmentStream::channel();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            tx.send(StreamFragment::new("late"));
        });
        assert_eq!(stream.next().unwrap().unwrap().content, "late");
        producer.join().unwrap();
        assert!(stream.next().is_none());
    }
}

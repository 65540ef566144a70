//! Rolling-summary compaction.
//!
//! After every fold the organic (non-summary) turns are counted. Once the
//! count reaches `summary_threshold`, the whole log, including any earlier
//! summary, is handed to the summarizer and replaced by one summary turn:
//!   1. Append the new user/model pair.
//!   2. Count turns that are not summaries.
//!   3. At or above the threshold, summarize everything.
//!   4. Replace the log with `[summary turn]`.
//!
//! Compaction is best-effort. A failing or empty summary keeps the log intact.

use crate::{ContextError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::strategy::FoldOutcome;
use super::turn::{render_transcript, Turn};

/// Default organic turn count that triggers compaction
pub const DEFAULT_SUMMARY_THRESHOLD: usize = 10;

/// Instruction placed ahead of the transcript in a summarization request
pub const SUMMARIZATION_PROMPT: &str = "Concisely summarize this conversation:";

/// Produces summary text for a turn sequence (usually an extra model call)
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, turns: &[Turn]) -> Result<String>;
}

/// Content list a host can send to its generation call to implement
/// [`Summarizer`].
pub fn summarization_request(turns: &[Turn]) -> Vec<Turn> {
    vec![Turn::user(format!(
        "{}\n\n{}",
        SUMMARIZATION_PROMPT,
        render_transcript(turns)
    ))]
}

/// Full history until the threshold, then one summary turn.
#[derive(Clone)]
pub struct RollingSummaryStrategy {
    summary_threshold: usize,
    summarizer: Arc<dyn Summarizer>,
}

impl std::fmt::Debug for RollingSummaryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingSummaryStrategy")
            .field("summary_threshold", &self.summary_threshold)
            .finish_non_exhaustive()
    }
}

impl RollingSummaryStrategy {
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            summary_threshold: DEFAULT_SUMMARY_THRESHOLD,
            summarizer,
        }
    }

    /// A threshold of zero would compact on every fold and is rejected.
    pub fn with_summary_threshold(mut self, threshold: usize) -> Result<Self> {
        if threshold == 0 {
            return Err(ContextError::Configuration(
                "summary_threshold must be at least 1".to_string(),
            ));
        }
        self.summary_threshold = threshold;
        Ok(self)
    }

    pub fn summary_threshold(&self) -> usize {
        self.summary_threshold
    }

    /// Same as the simple strategy: stored history plus the prompt.
    pub fn build(&self, history: &[Turn], prompt: &str) -> Vec<Turn> {
        let mut contents = history.to_vec();
        contents.push(Turn::user(prompt));
        contents
    }

    /// Append the new pair, compacting when the threshold is reached.
    pub async fn fold(
        &self,
        conversation_id: &str,
        history: &[Turn],
        prompt: &str,
        response: &str,
    ) -> FoldOutcome {
        let new_turns = vec![Turn::user(prompt), Turn::model(response)];
        let organic = history
            .iter()
            .chain(&new_turns)
            .filter(|t| !t.is_summary())
            .count();
        if organic < self.summary_threshold {
            return FoldOutcome::Append(new_turns);
        }

        info!(
            "Compacting context {} ({} turns, threshold {})",
            conversation_id, organic, self.summary_threshold
        );

        let mut full = history.to_vec();
        full.extend(new_turns.iter().cloned());

        match self.summarizer.summarize(&full).await {
            Ok(summary) if !summary.trim().is_empty() => {
                info!(
                    "Context {} compacted: {} turns -> 1 summary",
                    conversation_id,
                    full.len()
                );
                FoldOutcome::Replace(vec![Turn::summary(summary.trim())])
            }
            Ok(_) => {
                warn!(
                    "Summarizer returned empty text for {}. Keeping full history.",
                    conversation_id
                );
                FoldOutcome::Append(new_turns)
            }
            Err(e) => {
                warn!(
                    "Summarization failed for {}: {}. Keeping full history.",
                    conversation_id, e
                );
                FoldOutcome::Append(new_turns)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for CountingSummarizer {
        async fn summarize(&self, turns: &[Turn]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("summary #{} of {} turns", n, turns.len()))
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _turns: &[Turn]) -> Result<String> {
            Err(ContextError::Capability("quota exhausted".to_string()))
        }
    }

    fn pair(prompt: &str, response: &str) -> Vec<Turn> {
        vec![Turn::user(prompt), Turn::model(response)]
    }

    #[tokio::test]
    async fn test_below_threshold_appends() {
        let strategy = RollingSummaryStrategy::new(Arc::new(CountingSummarizer {
            calls: AtomicUsize::new(0),
        }))
        .with_summary_threshold(4)
        .unwrap();

        let outcome = strategy.fold("c", &[], "My name is Jane.", "Hi Jane.").await;
        match outcome {
            FoldOutcome::Append(turns) => assert_eq!(turns.len(), 2),
            other => panic!("expected append, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_threshold_replaces_with_summary() {
        let strategy = RollingSummaryStrategy::new(Arc::new(CountingSummarizer {
            calls: AtomicUsize::new(0),
        }))
        .with_summary_threshold(4)
        .unwrap();

        let history = pair("My name is Jane.", "Hi Jane.");
        let outcome = strategy
            .fold("c", &history, "The password is 'fjord'.", "Got it.")
            .await;
        match outcome {
            FoldOutcome::Replace(turns) => {
                assert_eq!(turns.len(), 1);
                assert!(turns[0].is_summary());
                assert!(turns[0].text.contains("of 4 turns"));
            }
            other => panic!("expected replace, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_summary_turn_does_not_count() {
        let strategy = RollingSummaryStrategy::new(Arc::new(CountingSummarizer {
            calls: AtomicUsize::new(0),
        }))
        .with_summary_threshold(4)
        .unwrap();

        // summary + 2 organic turns after this fold would be 3 organic, not 4
        let history = vec![Turn::summary("earlier")];
        let outcome = strategy.fold("c", &history, "next", "reply").await;
        assert!(matches!(outcome, FoldOutcome::Append(_)));
    }

    #[tokio::test]
    async fn test_failed_summary_keeps_turns() {
        let strategy = RollingSummaryStrategy::new(Arc::new(FailingSummarizer))
            .with_summary_threshold(2)
            .unwrap();

        let outcome = strategy.fold("c", &[], "keep me", "kept").await;
        match outcome {
            FoldOutcome::Append(turns) => {
                assert_eq!(turns[0].text, "keep me");
                assert_eq!(turns[1].text, "kept");
            }
            other => panic!("expected append, got {:?}", other),
        }
    }

    #[test]
    fn test_build_matches_history_plus_prompt() {
        let strategy = RollingSummaryStrategy::new(Arc::new(FailingSummarizer))
            .with_summary_threshold(2)
            .unwrap();
        let history = vec![Turn::summary("s"), Turn::user("a"), Turn::model("b")];
        let contents = strategy.build(&history, "c");
        assert_eq!(&contents[..3], &history[..]);
        assert_eq!(contents[3].text, "c");
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let strategy = RollingSummaryStrategy::new(Arc::new(FailingSummarizer));
        assert_eq!(strategy.summary_threshold(), DEFAULT_SUMMARY_THRESHOLD);
        assert!(matches!(
            strategy.clone().with_summary_threshold(0),
            Err(ContextError::Configuration(_))
        ));
        assert_eq!(strategy.with_summary_threshold(1).unwrap().summary_threshold(), 1);
    }

    #[test]
    fn test_summarization_request() {
        let request = summarization_request(&pair("Hi", "Hello!"));
        assert_eq!(request.len(), 1);
        assert!(request[0].text.starts_with(SUMMARIZATION_PROMPT));
        assert!(request[0].text.ends_with("user: Hi\nmodel: Hello!"));
    }
}

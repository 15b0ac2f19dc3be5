//! Question answering over the knowledge base.
//!
//! An [`Assistant`] pairs a [`KnowledgeBase`] with a [`Generator`]. Each
//! [`Assistant::answer`] call retrieves context, generates a reply, and
//! records the exchange in the caller's [`Session`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use fitflix_core::models::RetrievedResult;

use crate::config::Config;
use crate::generation::{create_client, GenerationError, Generator, LlmClient, ModelInfo};
use crate::knowledge_base::{IndexReport, KnowledgeBase};

/// Shown by the `help` command in interactive chat.
pub const SAMPLE_QUESTIONS: &[&str] = &[
    "What yoga classes do you offer?",
    "What are your membership prices?",
    "Who are the personal trainers?",
    "What should I eat after a workout?",
    "What are the gym opening hours?",
    "Do you have a swimming pool?",
    "How do I cancel my membership?",
];

/// Turns kept per session. Older turns are dropped first.
pub const MAX_HISTORY_TURNS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// One conversation. The history holds at most [`MAX_HISTORY_TURNS`] turns;
/// it is kept for display and is not fed back into prompts.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub history: Vec<ChatTurn>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            history: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Append a turn, dropping the oldest once the history is full.
    pub fn record(&mut self, turn: ChatTurn) {
        if self.history.len() >= MAX_HISTORY_TURNS {
            let excess = self.history.len() + 1 - MAX_HISTORY_TURNS;
            self.history.drain(..excess);
        }
        self.history.push(turn);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock time spent in each phase of a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Timings {
    pub retrieval_ms: u64,
    pub generation_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// Distinct `source` values of `retrieved`, in first-seen order.
    pub sources: Vec<String>,
    pub retrieved: Vec<RetrievedResult>,
    pub timings: Timings,
}

pub struct Assistant {
    kb: KnowledgeBase,
    generator: Generator,
}

impl Assistant {
    pub fn new(kb: KnowledgeBase, generator: Generator) -> Self {
        Self { kb, generator }
    }

    /// Build the embedding provider and LLM client named in the config.
    ///
    /// Fails if the generation API key is missing.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = create_client(&config.generation)?;
        Self::with_client(config, client)
    }

    pub fn with_client(config: Config, client: Arc<dyn LlmClient>) -> Result<Self> {
        let generator = Generator::new(client, &config.generation);
        let kb = KnowledgeBase::from_config(config)?;
        Ok(Self::new(kb, generator))
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn model_info(&self) -> ModelInfo {
        self.generator.model_info()
    }

    /// Open the store and index the knowledge base if it is empty.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.kb.ensure_initialized().await?;
        Ok(())
    }

    pub async fn reindex(&self, reset: bool) -> Result<IndexReport> {
        self.kb.index(reset).await
    }

    /// Answer one question and append the turn to `session`.
    ///
    /// Retrieval problems degrade to an answer without context. Generation
    /// errors carry a [`GenerationError`] context so callers can tell them
    /// apart from store failures; either kind leaves the history untouched.
    pub async fn answer(&self, session: &mut Session, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            bail!("Question must not be empty");
        }

        let config = self.kb.config();
        let started = Instant::now();
        let mut retrieved = self
            .kb
            .retrieve(question, config.retrieval.top_k, None)
            .await?;
        if let Some(min) = config.retrieval.min_similarity {
            retrieved.retain(|r| r.similarity >= min);
        }
        let retrieval_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let text = self
            .generator
            .generate_response(question, &retrieved, None)
            .await
            .context(GenerationError)?;
        let generation_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            "Answered in {}ms retrieval + {}ms generation using {} documents",
            retrieval_ms,
            generation_ms,
            retrieved.len()
        );

        session.record(ChatTurn {
            question: question.to_string(),
            answer: text.clone(),
        });

        Ok(Answer {
            sources: distinct_sources(&retrieved),
            text,
            retrieved,
            timings: Timings {
                retrieval_ms,
                generation_ms,
            },
        })
    }
}

fn distinct_sources(results: &[RetrievedResult]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for source in results.iter().filter_map(|r| r.source()) {
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
    }
    sources
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::generation::tests::EchoClient;
    use crate::knowledge_base::tests::{fixture, hash_kb};

    pub(crate) fn echo_assistant(config: Config, client: Arc<EchoClient>) -> Assistant {
        let generator = Generator::new(client, &config.generation);
        Assistant::new(hash_kb(config), generator)
    }

    fn result(source: Option<&str>) -> RetrievedResult {
        let mut metadata = fitflix_core::models::Metadata::new();
        if let Some(s) = source {
            metadata.insert("source".into(), s.into());
        }
        RetrievedResult {
            id: "x".into(),
            content: "x".into(),
            metadata,
            distance: 0.0,
            similarity: 1.0,
            rank: 1,
        }
    }

    #[test]
    fn test_distinct_sources_first_seen_order() {
        let sources = distinct_sources(&[
            result(Some("faq.md")),
            result(None),
            result(Some("classes.md")),
            result(Some("faq.md")),
        ]);
        assert_eq!(sources, vec!["faq.md", "classes.md"]);
    }

    #[test]
    fn test_session_clear() {
        let mut session = Session::new();
        assert_eq!(session.id.len(), 36);
        session.history.push(ChatTurn {
            question: "q".into(),
            answer: "a".into(),
        });
        session.clear();
        assert!(session.history.is_empty());
        assert_ne!(Session::new().id, session.id);
    }

    #[test]
    fn test_history_keeps_latest_turns() {
        let mut session = Session::with_id("s");
        for i in 0..MAX_HISTORY_TURNS + 10 {
            session.record(ChatTurn {
                question: format!("q{i}"),
                answer: format!("a{i}"),
            });
        }
        assert_eq!(session.history.len(), MAX_HISTORY_TURNS);
        assert_eq!(session.history[0].question, "q10");
        assert_eq!(
            session.history.last().unwrap().question,
            format!("q{}", MAX_HISTORY_TURNS + 9)
        );
    }

    #[tokio::test]
    async fn test_answer_records_turn_and_sources() {
        let tmp = TempDir::new().unwrap();
        let mut config = fixture(tmp.path());
        config.retrieval.top_k = 2;
        let client = Arc::new(EchoClient::ok("Yoga is at 7am."));
        let assistant = echo_assistant(config, client.clone());

        let mut session = Session::new();
        let answer = assistant
            .answer(&mut session, "  When are yoga classes?  ")
            .await
            .unwrap();

        assert_eq!(answer.text, "Yoga is at 7am.");
        assert_eq!(answer.retrieved.len(), 2);
        assert_eq!(answer.sources[0], "classes.md");
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.history[0].question, "When are yoga classes?");

        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].contains("Source: classes.md"));
    }

    #[tokio::test]
    async fn test_min_similarity_filters_context() {
        let tmp = TempDir::new().unwrap();
        let mut config = fixture(tmp.path());
        config.retrieval.min_similarity = Some(1.0);
        let client = Arc::new(EchoClient::ok("Not sure."));
        let assistant = echo_assistant(config, client.clone());

        let answer = assistant
            .answer(&mut Session::new(), "completely unrelated zebra question")
            .await
            .unwrap();
        assert!(answer.retrieved.is_empty());
        assert!(answer.sources.is_empty());
        assert!(client.prompts.lock().unwrap()[0]
            .contains("No relevant information found in the knowledge base."));
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let tmp = TempDir::new().unwrap();
        let assistant = echo_assistant(fixture(tmp.path()), Arc::new(EchoClient::ok("x")));
        let mut session = Session::new();
        assert!(assistant.answer(&mut session, "   ").await.is_err());
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_history() {
        let tmp = TempDir::new().unwrap();
        let assistant = echo_assistant(
            fixture(tmp.path()),
            Arc::new(EchoClient::failing("model overloaded")),
        );
        let mut session = Session::new();
        let err = assistant.answer(&mut session, "Yoga?").await.unwrap_err();
        assert!(err.downcast_ref::<GenerationError>().is_some());
        assert!(format!("{:#}", err).contains("model overloaded"));
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_not_a_generation_error() {
        let tmp = TempDir::new().unwrap();
        let mut config = fixture(tmp.path());
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        config.store.path = blocker.join("fitflix.sqlite");
        let client = Arc::new(EchoClient::ok("x"));
        let assistant = echo_assistant(config, client.clone());

        let err = assistant
            .answer(&mut Session::new(), "Yoga?")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<GenerationError>().is_none());
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reindex_reports_counts() {
        let tmp = TempDir::new().unwrap();
        let assistant = echo_assistant(fixture(tmp.path()), Arc::new(EchoClient::ok("x")));
        assistant.ensure_initialized().await.unwrap();
        let report = assistant.reindex(true).await.unwrap();
        assert_eq!(report.documents, 3);
        assert_eq!(report.total, 3);
        assert_eq!(assistant.model_info().model_name, "echo");
    }
}

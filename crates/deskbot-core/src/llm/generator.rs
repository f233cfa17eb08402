//! Answer generator interface
//!
//! The decision pipeline is agnostic of the backing model: any
//! implementation of `AnswerGenerator` can be plugged in, selected by
//! configuration. The LLM-backed implementation asks for strict JSON and
//! decodes it through a fallible step; a malformed response is a decode
//! error, mapped by callers to the "cannot answer" outcome, never a panic
//! or a crossed exception.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::conversation::{ChatMessage, ConversationAnalysis, QuestionAnalysis};
use crate::domain::knowledge::retrieval::EmbeddingProvider;
use crate::domain::knowledge::RetrievalCandidate;
use crate::error::{Error, Result};

use super::client::LlmClient;
use super::types::Message;

/// Synthesized answer for one query
///
/// Always produced fresh per query; never cached.
#[derive(Debug, Clone)]
pub struct AnswerResult {
    pub answer: String,
    /// Normalized 0-100
    pub confidence: u8,
    /// Knowledge entry IDs cited by the answer
    pub sources: Vec<i64>,
    pub can_answer: bool,
}

impl AnswerResult {
    /// The conservative default for any generator failure
    pub fn cannot_answer() -> Self {
        Self {
            answer: String::new(),
            confidence: 0,
            sources: Vec::new(),
            can_answer: false,
        }
    }
}

/// Capability interface over the backing language model
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Synthesize an answer to `query` from the ranked candidates
    async fn generate_answer(
        &self,
        query: &str,
        candidates: &[RetrievalCandidate],
    ) -> Result<AnswerResult>;

    /// Judge whether a single message is a question
    async fn analyze_question(&self, text: &str) -> Result<QuestionAnalysis>;

    /// Judge a whole conversation window for unanswered questions
    async fn analyze_conversation(&self, messages: &[ChatMessage])
        -> Result<ConversationAnalysis>;
}

/// Raw decoded shape of a generated answer, before normalization
#[derive(Debug, Deserialize)]
struct ParsedAnswer {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    sources: Vec<i64>,
    #[serde(default)]
    can_answer: bool,
}

/// Extract the first JSON object from free-form model output
///
/// Models wrap JSON in prose or code fences often enough that parsing the
/// raw text directly is unreliable.
fn extract_json(text: &str) -> Result<&str> {
    let start = text
        .find('{')
        .ok_or_else(|| Error::Decode("no JSON object in output".to_string()))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    Err(Error::Decode("unterminated JSON object in output".to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T> {
    let json = extract_json(text)?;
    serde_json::from_str(json).map_err(|e| Error::Decode(e.to_string()))
}

/// LLM-backed answer generator
pub struct LlmAnswerGenerator {
    client: Arc<LlmClient>,
}

impl LlmAnswerGenerator {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }

    fn answer_prompt(query: &str, candidates: &[RetrievalCandidate]) -> Vec<Message> {
        let mut context = String::new();
        for candidate in candidates {
            context.push_str(&format!(
                "[{}] Q: {}\nA: {}\n\n",
                candidate.entry.id, candidate.entry.question, candidate.entry.answer
            ));
        }

        vec![
            Message::system(
                "You are a customer-support assistant. Answer the user's question \
                 using only the numbered knowledge entries provided. Respond with a \
                 single JSON object: {\"answer\": string, \"confidence\": 0-100, \
                 \"sources\": [entry ids], \"can_answer\": bool}. If the entries do \
                 not answer the question, set can_answer to false.",
            ),
            Message::user(format!("Knowledge entries:\n{context}\nQuestion: {query}")),
        ]
    }

    fn conversation_prompt(messages: &[ChatMessage]) -> Vec<Message> {
        let mut transcript = String::new();
        for m in messages {
            transcript.push_str(&format!(
                "[{}] {}: {}\n",
                m.timestamp.format("%H:%M:%S"),
                m.sender,
                m.content
            ));
        }

        vec![
            Message::system(
                "You analyze a support group-chat transcript. Identify every \
                 customer question and whether it was answered. Respond with a \
                 single JSON object: {\"has_unanswered_question\": bool, \
                 \"question\": string|null, \"all_questions\": [{\"question\": \
                 string, \"status\": \"unanswered\"|\"answered\"|\"abandoned\", \
                 \"answered_by\": string|null}], \"confidence\": 0-100, \
                 \"summary\": string, \"sentiment\": \
                 \"positive\"|\"neutral\"|\"negative\"}.",
            ),
            Message::user(transcript),
        ]
    }

    fn question_prompt(text: &str) -> Vec<Message> {
        vec![
            Message::system(
                "Judge whether the message is a customer question needing support. \
                 Respond with a single JSON object: {\"is_question\": bool, \
                 \"confidence\": 0-100, \"summary\": string, \"sentiment\": \
                 \"positive\"|\"neutral\"|\"negative\", \"suggested_tags\": \
                 [string]}.",
            ),
            Message::user(text.to_string()),
        ]
    }
}

#[async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn generate_answer(
        &self,
        query: &str,
        candidates: &[RetrievalCandidate],
    ) -> Result<AnswerResult> {
        if candidates.is_empty() {
            return Ok(AnswerResult::cannot_answer());
        }

        let output = self
            .client
            .complete(Self::answer_prompt(query, candidates))
            .await?;
        let parsed: ParsedAnswer = decode(&output)?;

        debug!(
            query = %query,
            can_answer = parsed.can_answer,
            confidence = parsed.confidence,
            "Answer generated"
        );

        Ok(AnswerResult {
            answer: parsed.answer,
            confidence: crate::domain::conversation::normalize_confidence(parsed.confidence),
            sources: parsed.sources,
            can_answer: parsed.can_answer,
        })
    }

    async fn analyze_question(&self, text: &str) -> Result<QuestionAnalysis> {
        let output = self.client.complete(Self::question_prompt(text)).await?;
        decode(&output)
    }

    async fn analyze_conversation(
        &self,
        messages: &[ChatMessage],
    ) -> Result<ConversationAnalysis> {
        let output = self
            .client
            .complete(Self::conversation_prompt(messages))
            .await?;
        decode(&output)
    }
}

#[async_trait]
impl EmbeddingProvider for LlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        LlmClient::embed(self, text).await
    }
}

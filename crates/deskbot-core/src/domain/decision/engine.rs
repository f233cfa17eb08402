//! Reply decision engine
//!
//! Turns a detected question into an action: reply with a synthesized
//! answer, reply with the fallback text, or stay silent and only track an
//! issue. All collaborator failures are recovered locally with a
//! conservative "do not answer" default; nothing here aborts message
//! processing.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ReplyConfig;
use crate::domain::conversation::AnalyzedConversation;
use crate::domain::issue::{AutoReplyLog, AutoReplyLogStore, Issue, IssueStore};
use crate::domain::knowledge::{GroupConfig, RetrievalOrchestrator};
use crate::llm::{AnswerGenerator, AnswerResult};

use super::safety::apply_safety_filter;

/// Most recent unanswered questions resolved per message
const MAX_QUESTIONS: usize = 3;

/// An inbound group-chat message handed to the engine
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub group_id: String,
    pub customer_id: Option<String>,
    pub message_id: Option<String>,
    pub text: String,
    /// One-to-one chats skip question detection entirely
    pub direct_chat: bool,
}

impl InboundMessage {
    pub fn new(group_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            customer_id: None,
            message_id: None,
            text: text.into(),
            direct_chat: false,
        }
    }

    pub fn direct(mut self) -> Self {
        self.direct_chat = true;
        self
    }

    pub fn from_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

/// One question resolved through retrieval, generation and safety filtering
#[derive(Debug, Clone)]
pub struct ResolvedQuestion {
    pub question: String,
    /// Generated answer text, present when the generator could answer
    pub answer: Option<String>,
    /// Cited knowledge entry, when one matched
    pub knowledge_id: Option<i64>,
    pub matched: bool,
    /// Knowledge-match confidence, 0-100
    pub confidence: u8,
    /// Matched at or above the group threshold
    pub answered: bool,
}

/// Final outcome for one inbound message
#[derive(Debug, Clone, Default)]
pub struct ReplyDecision {
    /// Text to send, or None for silence
    pub reply: Option<String>,
    /// Tracked issue opened for this message, if any
    pub issue_id: Option<String>,
    pub questions: Vec<ResolvedQuestion>,
}

impl ReplyDecision {
    /// The deliberate "ignore noise" outcome: no reply, no issue
    fn ignore() -> Self {
        Self::default()
    }
}

/// The reply-or-track policy
pub struct ReplyDecisionEngine {
    retrieval: Arc<RetrievalOrchestrator>,
    generator: Arc<dyn AnswerGenerator>,
    issues: Arc<dyn IssueStore>,
    logs: Arc<dyn AutoReplyLogStore>,
    reply_config: ReplyConfig,
}

impl ReplyDecisionEngine {
    pub fn new(
        retrieval: Arc<RetrievalOrchestrator>,
        generator: Arc<dyn AnswerGenerator>,
        issues: Arc<dyn IssueStore>,
        logs: Arc<dyn AutoReplyLogStore>,
        reply_config: ReplyConfig,
    ) -> Self {
        Self {
            retrieval,
            generator,
            issues,
            logs,
            reply_config,
        }
    }

    /// Decide what to do about one inbound message
    ///
    /// `analysis` is the conversation analyzer's output; it is not
    /// consulted when the bot was named or the chat is one-to-one.
    pub async fn decide(
        &self,
        message: &InboundMessage,
        config: &GroupConfig,
        analysis: &AnalyzedConversation,
    ) -> ReplyDecision {
        let mentioned = config.mentions_bot(&message.text);
        let forced = mentioned || message.direct_chat;
        let threshold = config.confidence_threshold;

        // Named mention and direct chat skip question detection
        let question_confidence = if forced { 100 } else { analysis.confidence };
        let question_detected = forced || analysis.has_unanswered_question;

        // Deliberate "ignore noise" branch: nothing tracked, nothing sent
        if !question_detected || question_confidence < threshold {
            debug!(
                group_id = %message.group_id,
                confidence = question_confidence,
                threshold = threshold,
                "Below question threshold, ignoring"
            );
            return ReplyDecision::ignore();
        }

        let questions = self.select_questions(message, analysis, forced);

        // Auto-reply disabled: track the question, never speak
        if !config.auto_reply_enabled {
            let mut decision = ReplyDecision::ignore();
            for question in &questions {
                let log = AutoReplyLog::new(&message.group_id, question, None)
                    .with_confidence(question_confidence);
                self.append_log(log).await;
            }
            decision.issue_id = self
                .create_issue(message, analysis, &questions, question_confidence, None)
                .await;
            return decision;
        }

        // Resolve each question independently
        let mut resolved = Vec::with_capacity(questions.len());
        for question in &questions {
            resolved.push(self.resolve_question(question, config).await);
        }

        let any_answered = resolved.iter().any(|r| r.answered);
        let should_reply = any_answered || forced;

        let reply = should_reply.then(|| self.compose_reply(&resolved, mentioned));

        // Usage statistics for surfaced answers, best-effort
        for question in resolved.iter().filter(|r| r.answered || (r.matched && mentioned)) {
            if let Some(id) = question.knowledge_id {
                self.retrieval.mark_used(&[id]).await;
            }
        }

        for question in &resolved {
            let shown = reply.is_some();
            let shown_text = shown.then(|| self.display_text(question, mentioned).to_string());
            let log = AutoReplyLog::new(&message.group_id, &question.question, shown_text)
                .with_matched(question.matched)
                .with_confidence(question.confidence);
            let log = match question.knowledge_id {
                Some(id) => log.with_knowledge(id),
                None => log,
            };
            self.append_log(log).await;
        }

        let issue_id = self
            .create_issue(
                message,
                analysis,
                &questions,
                question_confidence,
                reply.as_deref(),
            )
            .await;

        info!(
            group_id = %message.group_id,
            questions = resolved.len(),
            answered = resolved.iter().filter(|r| r.answered).count(),
            replied = reply.is_some(),
            "Decision made"
        );

        ReplyDecision {
            reply,
            issue_id,
            questions: resolved,
        }
    }

    /// Up to the three most recent unanswered questions, oldest first;
    /// falls back to the raw message text when none were itemized.
    fn select_questions(
        &self,
        message: &InboundMessage,
        analysis: &AnalyzedConversation,
        forced: bool,
    ) -> Vec<String> {
        if forced || analysis.unanswered.is_empty() {
            return vec![message.text.clone()];
        }
        let skip = analysis.unanswered.len().saturating_sub(MAX_QUESTIONS);
        analysis.unanswered[skip..].to_vec()
    }

    async fn resolve_question(&self, question: &str, config: &GroupConfig) -> ResolvedQuestion {
        let retrieval = self
            .retrieval
            .retrieve(question, &config.knowledge_categories)
            .await;

        let mut result = match self
            .generator
            .generate_answer(question, &retrieval.candidates)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(question = %question, error = %e, "Answer generation failed");
                AnswerResult::cannot_answer()
            }
        };

        apply_safety_filter(&mut result);

        let matched = result.can_answer && !result.answer.trim().is_empty();
        let knowledge_id = if matched {
            result
                .sources
                .first()
                .copied()
                .or_else(|| retrieval.candidates.first().map(|c| c.entry.id))
        } else {
            None
        };
        let answered = matched && result.confidence >= config.confidence_threshold;

        ResolvedQuestion {
            question: question.to_string(),
            answer: matched.then(|| result.answer.clone()),
            knowledge_id,
            matched,
            confidence: result.confidence,
            answered,
        }
    }

    /// The text shown for one question within a reply
    ///
    /// A below-threshold ("partial") match is only surfaced when the bot
    /// was explicitly named; unprompted users never see low-confidence
    /// content.
    fn display_text<'a>(&'a self, question: &'a ResolvedQuestion, mentioned: bool) -> &'a str {
        if question.answered || (question.matched && mentioned) {
            if let Some(answer) = &question.answer {
                return answer;
            }
        }
        &self.reply_config.fallback_message
    }

    fn compose_reply(&self, resolved: &[ResolvedQuestion], mentioned: bool) -> String {
        if resolved.len() == 1 {
            return self.display_text(&resolved[0], mentioned).to_string();
        }
        resolved
            .iter()
            .enumerate()
            .map(|(i, question)| {
                format!(
                    "{}. {}\n{}",
                    i + 1,
                    question.question,
                    self.display_text(question, mentioned)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn append_log(&self, log: AutoReplyLog) {
        if let Err(e) = self.logs.append(&log).await {
            warn!(group_id = %log.group_id, error = %e, "Failed to append auto-reply log");
        }
    }

    async fn create_issue(
        &self,
        message: &InboundMessage,
        analysis: &AnalyzedConversation,
        questions: &[String],
        confidence: u8,
        reply: Option<&str>,
    ) -> Option<String> {
        let summary = questions.join("\n");
        let mut issue = Issue::new(&message.group_id, summary)
            .with_confidence(confidence)
            .with_sentiment(analysis.sentiment)
            .with_timeout_minutes(self.reply_config.issue_timeout_minutes);

        if let Some(customer_id) = &message.customer_id {
            issue = issue.with_customer(customer_id.clone());
        }
        if let Some(message_id) = &message.message_id {
            issue = issue.with_message(message_id.clone());
        }
        if let Some(reply) = reply {
            issue = issue.with_suggested_reply(reply).replied_at_creation();
        }

        match self.issues.create(&issue).await {
            Ok(()) => Some(issue.id),
            Err(e) => {
                warn!(group_id = %message.group_id, error = %e, "Failed to create issue");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::conversation::{ChatMessage, ConversationAnalysis, QuestionAnalysis};
    use crate::domain::issue::IssueStatus;
    use crate::domain::knowledge::{KnowledgeEntry, KnowledgeRepository, RetrievalCandidate};
    use crate::domain::knowledge::repository::EmbeddingHit;
    use crate::error::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeRepository {
        entries: Vec<KnowledgeEntry>,
        usage_increments: AtomicUsize,
    }

    impl FakeRepository {
        fn empty() -> Self {
            Self {
                entries: Vec::new(),
                usage_increments: AtomicUsize::new(0),
            }
        }

        fn with_entry(question: &str, answer: &str) -> Self {
            let mut entry = KnowledgeEntry::new(question, answer);
            entry.id = 7;
            Self {
                entries: vec![entry],
                usage_increments: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl KnowledgeRepository for FakeRepository {
        async fn find_active(&self, _categories: &[String]) -> Result<Vec<KnowledgeEntry>> {
            Ok(self.entries.clone())
        }

        async fn has_embeddings(&self) -> Result<bool> {
            Ok(false)
        }

        async fn find_by_embedding(
            &self,
            _query: &[f32],
            _k: usize,
            _threshold: f32,
            _categories: &[String],
        ) -> Result<Vec<EmbeddingHit>> {
            Ok(Vec::new())
        }

        async fn increment_usage(&self, _id: i64) -> Result<()> {
            self.usage_increments.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn insert(&self, _entry: &KnowledgeEntry) -> Result<i64> {
            unimplemented!("not used in these tests")
        }
    }

    /// Returns scripted answers in order, repeating the last one
    struct ScriptedGenerator {
        results: Mutex<Vec<AnswerResult>>,
    }

    impl ScriptedGenerator {
        fn answering(answer: &str, confidence: u8) -> Self {
            Self {
                results: Mutex::new(vec![AnswerResult {
                    answer: answer.to_string(),
                    confidence,
                    sources: vec![7],
                    can_answer: true,
                }]),
            }
        }

        fn refusing() -> Self {
            Self {
                results: Mutex::new(vec![AnswerResult::cannot_answer()]),
            }
        }

        fn sequence(results: Vec<AnswerResult>) -> Self {
            Self {
                results: Mutex::new(results),
            }
        }
    }

    #[async_trait]
    impl AnswerGenerator for ScriptedGenerator {
        async fn generate_answer(
            &self,
            _query: &str,
            _candidates: &[RetrievalCandidate],
        ) -> Result<AnswerResult> {
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                Ok(results.remove(0))
            } else {
                Ok(results[0].clone())
            }
        }

        async fn analyze_question(&self, _text: &str) -> Result<QuestionAnalysis> {
            unimplemented!("not used in these tests")
        }

        async fn analyze_conversation(
            &self,
            _messages: &[ChatMessage],
        ) -> Result<ConversationAnalysis> {
            unimplemented!("not used in these tests")
        }
    }

    #[derive(Default)]
    struct MemoryIssueStore {
        issues: Mutex<Vec<Issue>>,
    }

    #[async_trait]
    impl IssueStore for MemoryIssueStore {
        async fn create(&self, issue: &Issue) -> Result<()> {
            self.issues.lock().unwrap().push(issue.clone());
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<Option<Issue>> {
            Ok(self
                .issues
                .lock()
                .unwrap()
                .iter()
                .find(|i| i.id == id)
                .cloned())
        }

        async fn list_by_group(&self, _group_id: &str, _limit: usize) -> Result<Vec<Issue>> {
            Ok(self.issues.lock().unwrap().clone())
        }

        async fn list_by_status(
            &self,
            status: crate::domain::issue::IssueStatus,
            _limit: usize,
        ) -> Result<Vec<Issue>> {
            Ok(self
                .issues
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.status == status)
                .cloned()
                .collect())
        }

        async fn mark_timed_out(&self, _now: DateTime<Utc>) -> Result<u64> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct MemoryLogStore {
        logs: Mutex<Vec<AutoReplyLog>>,
    }

    #[async_trait]
    impl AutoReplyLogStore for MemoryLogStore {
        async fn append(&self, log: &AutoReplyLog) -> Result<()> {
            self.logs.lock().unwrap().push(log.clone());
            Ok(())
        }

        async fn recent_for_group(
            &self,
            _group_id: &str,
            _limit: usize,
        ) -> Result<Vec<AutoReplyLog>> {
            Ok(self.logs.lock().unwrap().clone())
        }
    }

    struct Harness {
        engine: ReplyDecisionEngine,
        repository: Arc<FakeRepository>,
        issues: Arc<MemoryIssueStore>,
        logs: Arc<MemoryLogStore>,
    }

    fn harness(repository: FakeRepository, generator: ScriptedGenerator) -> Harness {
        let repository = Arc::new(repository);
        let issues = Arc::new(MemoryIssueStore::default());
        let logs = Arc::new(MemoryLogStore::default());
        let retrieval = Arc::new(RetrievalOrchestrator::new(repository.clone()));
        let engine = ReplyDecisionEngine::new(
            retrieval,
            Arc::new(generator),
            issues.clone(),
            logs.clone(),
            Config::default().reply,
        );
        Harness {
            engine,
            repository,
            issues,
            logs,
        }
    }

    fn analysis(confidence: u8, unanswered: Vec<&str>) -> AnalyzedConversation {
        AnalyzedConversation {
            has_unanswered_question: !unanswered.is_empty(),
            unanswered: unanswered.into_iter().map(str::to_string).collect(),
            confidence,
            summary: None,
            sentiment: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_below_threshold_is_ignored() {
        let h = harness(
            FakeRepository::with_entry("reset password", "use the settings page"),
            ScriptedGenerator::answering("use the settings page", 90),
        );
        let message = InboundMessage::new("g1", "reset password?");
        let config = GroupConfig::for_group("g1");

        let decision = h
            .engine
            .decide(&message, &config, &analysis(59, vec!["reset password?"]))
            .await;

        assert!(decision.reply.is_none());
        assert!(decision.issue_id.is_none());
        assert!(decision.questions.is_empty());
        assert!(h.logs.logs.lock().unwrap().is_empty());
        assert!(h.issues.issues.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answered_question_replies_and_tracks() {
        let h = harness(
            FakeRepository::with_entry("reset password", "use the settings page"),
            ScriptedGenerator::answering("use the settings page", 90),
        );
        let message = InboundMessage::new("g1", "reset password?").from_customer("c1");
        let config = GroupConfig::for_group("g1");

        let decision = h
            .engine
            .decide(&message, &config, &analysis(80, vec!["reset password?"]))
            .await;

        assert_eq!(decision.reply.as_deref(), Some("use the settings page"));
        assert!(decision.questions[0].answered);
        assert_eq!(decision.questions[0].knowledge_id, Some(7));

        let issues = h.issues.issues.lock().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].status, IssueStatus::Replied);
        assert!(issues[0].replied_at.is_some());
        assert_eq!(
            issues[0].suggested_reply.as_deref(),
            Some("use the settings page")
        );

        let logs = h.logs.logs.lock().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].answer.as_deref(), Some("use the settings page"));
        assert!(logs[0].matched);

        // Cited entry usage was bumped
        assert_eq!(h.repository.usage_increments.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unanswerable_question_tracks_silently() {
        let h = harness(FakeRepository::empty(), ScriptedGenerator::refusing());
        let message = InboundMessage::new("g1", "something obscure?");
        let config = GroupConfig::for_group("g1");

        let decision = h
            .engine
            .decide(&message, &config, &analysis(80, vec!["something obscure?"]))
            .await;

        assert!(decision.reply.is_none());
        assert!(decision.issue_id.is_some());

        let issues = h.issues.issues.lock().unwrap();
        assert_eq!(issues[0].status, IssueStatus::Pending);
        assert!(issues[0].suggested_reply.is_none());

        let logs = h.logs.logs.lock().unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].answer.is_none());
        assert!(!logs[0].matched);
    }

    #[tokio::test]
    async fn test_named_bot_gets_fallback_when_unanswerable() {
        let h = harness(FakeRepository::empty(), ScriptedGenerator::refusing());
        let message = InboundMessage::new("g1", "小助手 something obscure?");
        let mut config = GroupConfig::for_group("g1");
        config.bot_names = vec!["小助手".to_string()];

        // Analyzer says nothing useful; the mention alone forces engagement
        let decision = h
            .engine
            .decide(&message, &config, &analysis(0, vec![]))
            .await;

        let reply = decision.reply.expect("named mention always replies");
        assert_eq!(reply, Config::default().reply.fallback_message);

        let issues = h.issues.issues.lock().unwrap();
        assert_eq!(issues[0].status, IssueStatus::Replied);
    }

    #[tokio::test]
    async fn test_partial_match_surfaced_only_when_named() {
        // Matched but below the 60 threshold
        let unprompted = harness(
            FakeRepository::with_entry("export data", "use the export tab"),
            ScriptedGenerator::answering("use the export tab", 45),
        );
        let config = GroupConfig::for_group("g1");
        let message = InboundMessage::new("g1", "how to export data?");

        let decision = unprompted
            .engine
            .decide(&message, &config, &analysis(80, vec!["how to export data?"]))
            .await;
        assert!(decision.reply.is_none());
        assert!(decision.questions[0].matched);
        assert!(!decision.questions[0].answered);

        let named = harness(
            FakeRepository::with_entry("export data", "use the export tab"),
            ScriptedGenerator::answering("use the export tab", 45),
        );
        let mut config = GroupConfig::for_group("g1");
        config.bot_names = vec!["helpbot".to_string()];
        let message = InboundMessage::new("g1", "helpbot how to export data?");

        let decision = named
            .engine
            .decide(&message, &config, &analysis(80, vec![]))
            .await;
        assert_eq!(decision.reply.as_deref(), Some("use the export tab"));
    }

    #[tokio::test]
    async fn test_direct_chat_forces_engagement() {
        let h = harness(
            FakeRepository::with_entry("pricing", "see the pricing page"),
            ScriptedGenerator::answering("see the pricing page", 90),
        );
        let message = InboundMessage::new("g1", "pricing").direct();
        let config = GroupConfig::for_group("g1");

        let decision = h
            .engine
            .decide(&message, &config, &analysis(0, vec![]))
            .await;
        assert_eq!(decision.reply.as_deref(), Some("see the pricing page"));
    }

    #[tokio::test]
    async fn test_disabled_group_tracks_without_resolving() {
        let h = harness(
            FakeRepository::with_entry("reset password", "use the settings page"),
            ScriptedGenerator::answering("use the settings page", 90),
        );
        let message = InboundMessage::new("g1", "reset password?");
        let mut config = GroupConfig::for_group("g1");
        config.auto_reply_enabled = false;

        let decision = h
            .engine
            .decide(&message, &config, &analysis(80, vec!["reset password?"]))
            .await;

        assert!(decision.reply.is_none());
        assert!(decision.issue_id.is_some());
        assert!(decision.questions.is_empty());

        let issues = h.issues.issues.lock().unwrap();
        assert_eq!(issues[0].status, IssueStatus::Pending);

        let logs = h.logs.logs.lock().unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].answer.is_none());
    }

    #[tokio::test]
    async fn test_multi_question_numbered_reply_keeps_latest_three() {
        let answered = AnswerResult {
            answer: "answer text".to_string(),
            confidence: 90,
            sources: vec![7],
            can_answer: true,
        };
        let h = harness(
            FakeRepository::with_entry("q", "answer text"),
            ScriptedGenerator::sequence(vec![
                answered.clone(),
                AnswerResult::cannot_answer(),
                answered,
            ]),
        );
        let message = InboundMessage::new("g1", "latest message");
        let config = GroupConfig::for_group("g1");

        let decision = h
            .engine
            .decide(
                &message,
                &config,
                &analysis(80, vec!["oldest?", "q1?", "q2?", "q3?"]),
            )
            .await;

        // Only the three most recent questions are resolved, oldest first
        assert_eq!(decision.questions.len(), 3);
        assert_eq!(decision.questions[0].question, "q1?");

        let reply = decision.reply.expect("one answered question triggers a reply");
        assert!(reply.starts_with("1. q1?\nanswer text"));
        assert!(reply.contains("2. q2?"));
        // The unanswered middle question shows the fallback text
        assert!(reply.contains(&Config::default().reply.fallback_message));
        assert!(reply.contains("3. q3?\nanswer text"));
    }

    #[tokio::test]
    async fn test_threshold_boundary_is_inclusive() {
        let h = harness(
            FakeRepository::with_entry("q", "a"),
            ScriptedGenerator::answering("a", 60),
        );
        let message = InboundMessage::new("g1", "q?");
        let config = GroupConfig::for_group("g1");

        let decision = h
            .engine
            .decide(&message, &config, &analysis(60, vec!["q?"]))
            .await;

        assert!(decision.questions[0].answered);
        assert!(decision.reply.is_some());
    }
}

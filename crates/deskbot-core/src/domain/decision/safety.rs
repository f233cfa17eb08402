//! Answer safety filter
//!
//! A model asked to answer from weak context sometimes produces a list of
//! clarifying counter-questions instead of an answer. The filter vetoes
//! such output post-hoc: it forces `can_answer` off but never rewrites
//! the answer text.

use tracing::debug;

use crate::llm::AnswerResult;

/// Question marks at or above this count mark a disguised question list
const QUESTION_MARK_LIMIT: usize = 3;

/// Bullet lines at or above this count mark a disguised question list
const BULLET_LIMIT: usize = 5;

fn count_question_marks(text: &str) -> usize {
    text.chars().filter(|c| *c == '?' || *c == '？').count()
}

fn is_bullet_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with(['-', '*', '•', '・', '‣']) {
        return true;
    }
    // Numbered list markers: "1." "2、" "3)"
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0
        && trimmed[digits..].starts_with(['.', '、', ')'])
}

fn count_bullets(text: &str) -> usize {
    text.lines().filter(|line| is_bullet_line(line)).count()
}

/// Veto answers that look like a list of counter-questions
pub fn apply_safety_filter(result: &mut AnswerResult) {
    let question_marks = count_question_marks(&result.answer);
    let bullets = count_bullets(&result.answer);

    if question_marks >= QUESTION_MARK_LIMIT || bullets >= BULLET_LIMIT {
        debug!(
            question_marks = question_marks,
            bullets = bullets,
            "Answer rejected as disguised question list"
        );
        result.can_answer = false;
        result.confidence = 0;
    }
}

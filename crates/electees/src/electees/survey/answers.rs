use serde::Serialize;

use crate::electees::domain::{AnswerId, QuestionId, SurveyAnswer};

/// A single write derived from comparing a submission with stored answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum AnswerChange {
    Create { question: QuestionId, answer: String },
    Update { id: AnswerId, answer: String },
    Delete { id: AnswerId },
}

/// Counts of answer writes performed by one submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnswerSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl AnswerSummary {
    pub fn of(changes: &[AnswerChange]) -> Self {
        changes
            .iter()
            .fold(Self::default(), |mut summary, change| {
                match change {
                    AnswerChange::Create { .. } => summary.created += 1,
                    AnswerChange::Update { .. } => summary.updated += 1,
                    AnswerChange::Delete { .. } => summary.deleted += 1,
                }
                summary
            })
    }
}

/// Diff submitted answers against the member's stored ones.
///
/// Empty text never creates a row and deletes an existing one; non-empty text
/// creates or updates in place. Unchanged text produces no write.
pub fn diff_answers(
    existing: &[SurveyAnswer],
    submitted: &[(QuestionId, String)],
) -> Vec<AnswerChange> {
    submitted
        .iter()
        .filter_map(|(question, text)| {
            let stored = existing.iter().find(|answer| answer.question == *question);
            match (stored, text.is_empty()) {
                (Some(answer), true) => Some(AnswerChange::Delete { id: answer.id }),
                (Some(answer), false) if answer.answer != *text => Some(AnswerChange::Update {
                    id: answer.id,
                    answer: text.clone(),
                }),
                (Some(_), false) => None,
                (None, true) => None,
                (None, false) => Some(AnswerChange::Create {
                    question: *question,
                    answer: text.clone(),
                }),
            }
        })
        .collect()
}

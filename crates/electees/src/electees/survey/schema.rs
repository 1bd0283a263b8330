use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::electees::domain::{PartId, QuestionId, SurveyAnswer, SurveyQuestion};
use crate::electees::rows::FieldErrors;

/// One generated input of the completion form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionField {
    pub question: QuestionId,
    pub name: String,
    pub part: PartId,
    pub label: String,
    pub max_words: Option<u32>,
}

/// Form description generated from a term's active questions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SurveySchema {
    pub fields: Vec<QuestionField>,
}

impl SurveySchema {
    pub fn for_questions(questions: &[SurveyQuestion]) -> Self {
        let fields = questions
            .iter()
            .map(|question| QuestionField {
                question: question.id,
                name: Self::field_name(question.id),
                part: question.part,
                label: question.text.clone(),
                max_words: question.max_words,
            })
            .collect();
        Self { fields }
    }

    pub fn field_name(question: QuestionId) -> String {
        format!("question-{question}")
    }

    /// Prefill values keyed by field name.
    pub fn initial(&self, answers: &[SurveyAnswer]) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter_map(|field| {
                answers
                    .iter()
                    .find(|answer| answer.question == field.question)
                    .map(|answer| (field.name.clone(), answer.answer.clone()))
            })
            .collect()
    }

    /// Validate submitted values against each field's word limit.
    ///
    /// Missing fields count as empty answers; unknown keys are ignored.
    pub fn validate(
        &self,
        data: &HashMap<String, String>,
    ) -> Result<Vec<(QuestionId, String)>, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut answers = Vec::with_capacity(self.fields.len());

        for field in &self.fields {
            let text = data
                .get(&field.name)
                .map(|value| value.trim().to_string())
                .unwrap_or_default();
            if let Some(limit) = field.max_words {
                let words = word_count(&text);
                if words > limit as usize {
                    errors.add(
                        &field.name,
                        format!("Please limit your answer to {limit} words ({words} submitted)."),
                    );
                }
            }
            answers.push((field.question, text));
        }

        errors.finish(answers)
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

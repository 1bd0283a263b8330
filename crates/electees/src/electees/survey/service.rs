use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::answers::{diff_answers, AnswerSummary};
use super::schema::SurveySchema;
use crate::electees::domain::{
    ElecteeInterviewSurvey, MemberId, NewSurveyPart, NewSurveyQuestion, PartId, QuestionId,
    SurveyDraft, SurveyPart, SurveyQuestion, Term,
};
use crate::electees::portal::PortalError;
use crate::electees::repository::ElecteeRepository;
use crate::electees::rows::{
    bind_rows, required_text, required_value, BatchSummary, Cleaned, FieldErrors, RowErrors,
    RowFields, RowInput, RowRules, NON_FIELD,
};

const MAX_TITLE_LEN: usize = 100;
const MAX_INSTRUCTIONS_LEN: usize = 4000;
const MAX_QUESTION_LEN: usize = 2000;

/// Which stage the term's survey has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SurveyStatus {
    pub survey_exists: bool,
    pub parts_exist: bool,
    pub questions_exist: bool,
    pub survey_has_questions: bool,
}

/// Metadata form for a term's survey.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyFields {
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub instructions: String,
}

impl From<&ElecteeInterviewSurvey> for SurveyFields {
    fn from(survey: &ElecteeInterviewSurvey) -> Self {
        Self {
            due_date: Some(survey.due_date),
            instructions: survey.instructions.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartFields {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub number: Option<u16>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub all_required: Option<bool>,
}

impl RowFields for PartFields {
    fn is_blank(&self) -> bool {
        self.title.trim().is_empty()
            && self.number.is_none()
            && self.instructions.trim().is_empty()
            && self.all_required.is_none()
    }
}

impl From<&SurveyPart> for PartFields {
    fn from(part: &SurveyPart) -> Self {
        Self {
            title: part.title.clone(),
            number: Some(part.number),
            instructions: part.instructions.clone(),
            all_required: part.all_required,
        }
    }
}

pub type PartRow = RowInput<PartId, PartFields>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFields {
    #[serde(default)]
    pub part: Option<PartId>,
    #[serde(default)]
    pub number: Option<u16>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub max_words: Option<u32>,
}

impl RowFields for QuestionFields {
    fn is_blank(&self) -> bool {
        self.part.is_none()
            && self.number.is_none()
            && self.text.trim().is_empty()
            && self.max_words.is_none()
    }
}

impl From<&SurveyQuestion> for QuestionFields {
    fn from(question: &SurveyQuestion) -> Self {
        Self {
            part: Some(question.part),
            number: Some(question.number),
            text: question.text.clone(),
            max_words: question.max_words,
        }
    }
}

pub type QuestionRow = RowInput<QuestionId, QuestionFields>;

/// A part together with the active questions that belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveySection {
    pub part: SurveyPart,
    pub questions: Vec<SurveyQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyPreview {
    pub survey: ElecteeInterviewSurvey,
    pub sections: Vec<SurveySection>,
}

/// Everything needed to render the completion form for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyCompletion {
    pub survey: ElecteeInterviewSurvey,
    pub sections: Vec<SurveySection>,
    pub schema: SurveySchema,
    pub initial: BTreeMap<String, String>,
    /// Questions in all-required parts that still have no answer.
    pub missing_required: Vec<QuestionId>,
}

/// Survey administration and completion over the shared repository.
pub struct SurveyService<R> {
    repository: Arc<R>,
}

impl<R> SurveyService<R>
where
    R: ElecteeRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn status(&self, term: &Term) -> Result<SurveyStatus, PortalError> {
        let survey = self.repository.survey_for_term(term.id)?;
        Ok(SurveyStatus {
            survey_exists: survey.is_some(),
            parts_exist: !self.repository.survey_parts()?.is_empty(),
            questions_exist: !self.repository.survey_questions()?.is_empty(),
            survey_has_questions: survey.is_some_and(|survey| !survey.questions.is_empty()),
        })
    }

    pub fn survey(&self, term: &Term) -> Result<Option<ElecteeInterviewSurvey>, PortalError> {
        Ok(self.repository.survey_for_term(term.id)?)
    }

    /// The term's survey; a missing survey is not-found and is never created here.
    pub fn require_survey(&self, term: &Term) -> Result<ElecteeInterviewSurvey, PortalError> {
        self.repository
            .survey_for_term(term.id)?
            .ok_or_else(|| PortalError::NotFound(format!("no electee survey exists for {term}")))
    }

    /// Create the term's survey or update its metadata.
    pub fn save_survey(
        &self,
        term: &Term,
        fields: &SurveyFields,
    ) -> Result<ElecteeInterviewSurvey, PortalError> {
        let mut errors = FieldErrors::new();
        let due_date = required_value(&mut errors, "due_date", fields.due_date);
        let instructions = fields.instructions.trim().to_string();
        if instructions.chars().count() > MAX_INSTRUCTIONS_LEN {
            errors.add(
                "instructions",
                format!("Ensure this value has at most {MAX_INSTRUCTIONS_LEN} characters."),
            );
        }
        let Some(due_date) = due_date else {
            return Err(errors.into());
        };
        errors.finish(())?;

        let survey = self.repository.save_survey(
            term.id,
            SurveyDraft {
                due_date,
                instructions,
            },
        )?;
        info!(term = %term.id, survey = %survey.id, "electee survey saved");
        Ok(survey)
    }

    pub fn parts(&self) -> Result<Vec<SurveyPart>, PortalError> {
        let mut parts = self.repository.survey_parts()?;
        parts.sort_by_key(|part| (part.number, part.id));
        Ok(parts)
    }

    pub fn edit_parts(&self, rows: &[PartRow]) -> Result<BatchSummary, PortalError> {
        let existing = self.repository.survey_parts()?;
        let batch = bind_rows(rows, &existing, RowRules::default(), |fields, current| {
            let mut errors = FieldErrors::new();
            let title = required_text(&mut errors, "title", &fields.title, MAX_TITLE_LEN);
            let number = required_value(&mut errors, "number", fields.number);
            let instructions = fields.instructions.trim().to_string();
            if instructions.chars().count() > MAX_INSTRUCTIONS_LEN {
                errors.add(
                    "instructions",
                    format!("Ensure this value has at most {MAX_INSTRUCTIONS_LEN} characters."),
                );
            }
            let Some(number) = number else {
                return Err(errors);
            };
            errors.finish(())?;

            Ok(match current {
                Some(part) => Cleaned::Update(SurveyPart {
                    id: part.id,
                    title,
                    number,
                    instructions,
                    all_required: fields.all_required,
                }),
                None => Cleaned::Create(NewSurveyPart {
                    title,
                    number,
                    instructions,
                    all_required: fields.all_required,
                }),
            })
        })?;

        let in_use: HashSet<PartId> = self
            .repository
            .survey_questions()?
            .iter()
            .map(|question| question.part)
            .collect();
        let mut errors = RowErrors::default();
        for (position, row) in rows.iter().enumerate() {
            if let (true, Some(id)) = (row.delete, row.id) {
                if in_use.contains(&id) {
                    errors.row(position).add(
                        NON_FIELD,
                        "This part still has questions. Move or remove them first.",
                    );
                }
            }
        }
        if !errors.is_empty() {
            return Err(PortalError::from(errors));
        }

        let summary = batch.summary();
        self.repository.apply_part_batch(batch)?;
        info!(?summary, "survey parts updated");
        Ok(summary)
    }

    pub fn questions(&self) -> Result<Vec<SurveyQuestion>, PortalError> {
        let parts = self.parts()?;
        let mut questions = self.repository.survey_questions()?;
        questions.sort_by_key(|question| {
            let part_order = parts.iter().position(|part| part.id == question.part);
            (part_order, question.number, question.id)
        });
        Ok(questions)
    }

    pub fn edit_questions(&self, rows: &[QuestionRow]) -> Result<BatchSummary, PortalError> {
        let parts: HashSet<PartId> = self
            .repository
            .survey_parts()?
            .iter()
            .map(|part| part.id)
            .collect();
        let existing = self.repository.survey_questions()?;
        let batch = bind_rows(rows, &existing, RowRules::default(), |fields, current| {
            let mut errors = FieldErrors::new();
            let part = required_value(&mut errors, "part", fields.part);
            if let Some(part) = part {
                if !parts.contains(&part) {
                    errors.add("part", format!("Survey part {part} does not exist."));
                }
            }
            let number = required_value(&mut errors, "number", fields.number);
            let text = required_text(&mut errors, "text", &fields.text, MAX_QUESTION_LEN);
            if fields.max_words == Some(0) {
                errors.add(
                    "max_words",
                    "Leave the word limit blank for unlimited answers.",
                );
            }
            let (Some(part), Some(number)) = (part, number) else {
                return Err(errors);
            };
            errors.finish(())?;

            Ok(match current {
                Some(question) => Cleaned::Update(SurveyQuestion {
                    id: question.id,
                    part,
                    number,
                    text,
                    max_words: fields.max_words,
                }),
                None => Cleaned::Create(NewSurveyQuestion {
                    part,
                    number,
                    text,
                    max_words: fields.max_words,
                }),
            })
        })?;

        let summary = batch.summary();
        self.repository.apply_question_batch(batch)?;
        info!(?summary, "survey questions updated");
        Ok(summary)
    }

    /// Replace the active question set of an existing survey.
    pub fn attach_questions(
        &self,
        term: &Term,
        selection: &[QuestionId],
    ) -> Result<ElecteeInterviewSurvey, PortalError> {
        let mut survey = self.require_survey(term)?;
        let catalog: HashSet<QuestionId> = self
            .repository
            .survey_questions()?
            .iter()
            .map(|question| question.id)
            .collect();

        let mut errors = FieldErrors::new();
        let mut chosen = Vec::with_capacity(selection.len());
        for question in selection {
            if !catalog.contains(question) {
                errors.add(
                    "questions",
                    format!("Select a valid choice. {question} is not one of the available choices."),
                );
            } else if !chosen.contains(question) {
                chosen.push(*question);
            }
        }
        errors.finish(())?;

        self.repository
            .set_survey_questions(survey.id, chosen.clone())?;
        info!(term = %term.id, count = chosen.len(), "survey questions attached");
        survey.questions = chosen;
        Ok(survey)
    }

    pub fn preview(&self, term: &Term) -> Result<SurveyPreview, PortalError> {
        let survey = self.require_survey(term)?;
        let sections = self.sections(&survey)?;
        Ok(SurveyPreview { survey, sections })
    }

    pub fn completion(
        &self,
        term: &Term,
        submitter: &MemberId,
    ) -> Result<SurveyCompletion, PortalError> {
        let survey = self.require_survey(term)?;
        let sections = self.sections(&survey)?;
        let questions = flatten(&sections);
        let ids: Vec<QuestionId> = questions.iter().map(|question| question.id).collect();
        let answers = self.repository.answers(term.id, submitter, &ids)?;
        let schema = SurveySchema::for_questions(&questions);
        let initial = schema.initial(&answers);
        let missing_required = sections
            .iter()
            .filter(|section| section.part.requires_all())
            .flat_map(|section| section.questions.iter())
            .filter(|question| !answers.iter().any(|answer| answer.question == question.id))
            .map(|question| question.id)
            .collect();

        Ok(SurveyCompletion {
            survey,
            sections,
            schema,
            initial,
            missing_required,
        })
    }

    /// Validate and persist a member's answers for the term's active questions.
    pub fn complete(
        &self,
        term: &Term,
        submitter: &MemberId,
        data: &HashMap<String, String>,
    ) -> Result<AnswerSummary, PortalError> {
        let survey = self.require_survey(term)?;
        let questions = flatten(&self.sections(&survey)?);
        let schema = SurveySchema::for_questions(&questions);
        let submitted = schema.validate(data)?;

        let ids: Vec<QuestionId> = questions.iter().map(|question| question.id).collect();
        let existing = self.repository.answers(term.id, submitter, &ids)?;
        let changes = diff_answers(&existing, &submitted);
        self.repository
            .apply_answer_changes(term.id, submitter, &changes)?;

        let summary = AnswerSummary::of(&changes);
        info!(term = %term.id, %submitter, ?summary, "electee survey answers saved");
        Ok(summary)
    }

    fn sections(&self, survey: &ElecteeInterviewSurvey) -> Result<Vec<SurveySection>, PortalError> {
        let active: HashSet<QuestionId> = survey.questions.iter().copied().collect();
        let mut questions: Vec<SurveyQuestion> = self
            .repository
            .survey_questions()?
            .into_iter()
            .filter(|question| active.contains(&question.id))
            .collect();
        questions.sort_by_key(|question| (question.number, question.id));

        Ok(self
            .parts()?
            .into_iter()
            .filter_map(|part| {
                let in_part: Vec<SurveyQuestion> = questions
                    .iter()
                    .filter(|question| question.part == part.id)
                    .cloned()
                    .collect();
                (!in_part.is_empty()).then_some(SurveySection {
                    part,
                    questions: in_part,
                })
            })
            .collect())
    }
}

fn flatten(sections: &[SurveySection]) -> Vec<SurveyQuestion> {
    sections
        .iter()
        .flat_map(|section| section.questions.iter().cloned())
        .collect()
}

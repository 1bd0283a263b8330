//! Interview survey: catalog management, per-term composition, preview and
//! answer capture.

mod answers;
mod schema;
mod service;

pub use answers::{diff_answers, AnswerChange, AnswerSummary};
pub use schema::{word_count, QuestionField, SurveySchema};
pub use service::{
    PartFields, PartRow, QuestionFields, QuestionRow, SurveyCompletion, SurveyFields,
    SurveyPreview, SurveySection, SurveyService, SurveyStatus,
};

use super::domain::{
    BackgroundDraft, BackgroundFormId, BackgroundInstitution, EducationalBackgroundForm,
    ElecteeGroup, ElecteeGroupEvent, ElecteeInterviewSurvey, ElecteeResource,
    ElecteeResourceType, GroupId, MemberId, MemberProfile, QuestionId, SurveyAnswer, SurveyDraft,
    SurveyId, SurveyPart, SurveyQuestion, Term, TermId,
};
use super::rows::RowBatch;
use super::survey::AnswerChange;

/// Storage abstraction over the portal's relational tables.
///
/// Every `apply_*` call is atomic: either the whole batch lands or nothing does.
pub trait ElecteeRepository: Send + Sync {
    fn groups_for_term(&self, term: TermId) -> Result<Vec<ElecteeGroup>, RepositoryError>;
    fn apply_group_batch(&self, batch: RowBatch<ElecteeGroup>) -> Result<(), RepositoryError>;
    /// Replace each listed group's member set with exactly the given members.
    fn replace_memberships(
        &self,
        assignments: &[(GroupId, Vec<MemberId>)],
    ) -> Result<(), RepositoryError>;

    /// All point events, manual and derived, for the term's groups.
    fn events_for_term(&self, term: TermId) -> Result<Vec<ElecteeGroupEvent>, RepositoryError>;
    /// Apply the batch and refresh each team's point total from its events
    /// in the same write. A total outside the `i32` range rejects the batch.
    fn apply_event_batch(&self, batch: RowBatch<ElecteeGroupEvent>)
        -> Result<(), RepositoryError>;

    fn resource_types(&self) -> Result<Vec<ElecteeResourceType>, RepositoryError>;
    fn resources_for_term(&self, term: TermId) -> Result<Vec<ElecteeResource>, RepositoryError>;
    fn apply_resource_batch(&self, batch: RowBatch<ElecteeResource>)
        -> Result<(), RepositoryError>;

    fn background_form(
        &self,
        member: &MemberId,
        term: TermId,
    ) -> Result<Option<EducationalBackgroundForm>, RepositoryError>;
    fn institutions(
        &self,
        form: BackgroundFormId,
    ) -> Result<Vec<BackgroundInstitution>, RepositoryError>;
    /// Upsert the (member, term) form and apply its institution rows together.
    fn save_background(
        &self,
        draft: BackgroundDraft,
        institutions: RowBatch<BackgroundInstitution>,
    ) -> Result<EducationalBackgroundForm, RepositoryError>;

    fn survey_for_term(
        &self,
        term: TermId,
    ) -> Result<Option<ElecteeInterviewSurvey>, RepositoryError>;
    /// Create the term's survey or update its metadata in place.
    fn save_survey(
        &self,
        term: TermId,
        draft: SurveyDraft,
    ) -> Result<ElecteeInterviewSurvey, RepositoryError>;
    fn set_survey_questions(
        &self,
        survey: SurveyId,
        questions: Vec<QuestionId>,
    ) -> Result<(), RepositoryError>;

    fn survey_parts(&self) -> Result<Vec<SurveyPart>, RepositoryError>;
    fn apply_part_batch(&self, batch: RowBatch<SurveyPart>) -> Result<(), RepositoryError>;
    fn survey_questions(&self) -> Result<Vec<SurveyQuestion>, RepositoryError>;
    /// Deleting a question also drops it from every survey and removes its answers.
    fn apply_question_batch(&self, batch: RowBatch<SurveyQuestion>)
        -> Result<(), RepositoryError>;

    fn answers(
        &self,
        term: TermId,
        submitter: &MemberId,
        questions: &[QuestionId],
    ) -> Result<Vec<SurveyAnswer>, RepositoryError>;
    fn apply_answer_changes(
        &self,
        term: TermId,
        submitter: &MemberId,
        changes: &[AnswerChange],
    ) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("point total for team {group} is out of range")]
    PointsOutOfRange { group: GroupId },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Academic calendar owned by the wider portal.
pub trait TermResolver: Send + Sync {
    fn current_term(&self) -> Result<Term, RepositoryError>;
    fn term(&self, id: TermId) -> Result<Option<Term>, RepositoryError>;
}

/// Permission engine consulted as a pure predicate.
pub trait PermissionOracle: Send + Sync {
    fn can_manage_electee_progress(&self, user: &MemberId) -> bool;
    fn can_complete_electee_survey(&self, user: &MemberId) -> bool;
}

/// Member lookups owned by the membership subsystem.
pub trait MemberDirectory: Send + Sync {
    fn member(&self, uniqname: &MemberId) -> Result<Option<MemberProfile>, RepositoryError>;
    /// Members who are electees during the given term.
    fn electees(&self, term: &Term) -> Result<Vec<MemberProfile>, RepositoryError>;
}

/// Blob storage for uploaded resource files.
pub trait ResourceStorage: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), RepositoryError>;
    fn remove(&self, key: &str) -> Result<(), RepositoryError>;
}

//! Mutex-guarded in-memory store used by the server binary, the demo and tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::domain::{
    AnswerId, BackgroundDraft, BackgroundFormId, BackgroundInstitution,
    EducationalBackgroundForm, ElecteeGroup, ElecteeGroupEvent, ElecteeInterviewSurvey,
    ElecteeResource, ElecteeResourceType, GroupEventId, GroupId, InstitutionId, MemberId, PartId,
    QuestionId, ResourceId, ResourceTypeId, SurveyAnswer, SurveyDraft, SurveyId, SurveyPart,
    SurveyQuestion, TermId,
};
use super::repository::{ElecteeRepository, RepositoryError};
use super::rows::{Record, RowBatch};
use super::survey::AnswerChange;

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    groups: BTreeMap<GroupId, ElecteeGroup>,
    events: BTreeMap<GroupEventId, ElecteeGroupEvent>,
    resource_types: BTreeMap<ResourceTypeId, ElecteeResourceType>,
    resources: BTreeMap<ResourceId, ElecteeResource>,
    forms: BTreeMap<BackgroundFormId, EducationalBackgroundForm>,
    institutions: BTreeMap<InstitutionId, BackgroundInstitution>,
    surveys: BTreeMap<SurveyId, ElecteeInterviewSurvey>,
    parts: BTreeMap<PartId, SurveyPart>,
    questions: BTreeMap<QuestionId, SurveyQuestion>,
    answers: BTreeMap<AnswerId, SurveyAnswer>,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Every write validates the whole batch before touching any table, so a
/// rejected batch leaves the store unchanged.
#[derive(Debug, Default)]
pub struct InMemoryElecteeRepository {
    tables: Mutex<Tables>,
}

impl InMemoryElecteeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("electee store lock poisoned".to_string()))
    }

    /// Resource types are catalog data maintained outside the portal's forms.
    pub fn insert_resource_type(
        &self,
        name: &str,
        is_packet: bool,
    ) -> Result<ElecteeResourceType, RepositoryError> {
        let mut tables = self.tables()?;
        if tables
            .resource_types
            .values()
            .any(|kind| kind.name.eq_ignore_ascii_case(name))
        {
            return Err(RepositoryError::Conflict);
        }
        let kind = ElecteeResourceType {
            id: ResourceTypeId(tables.next_id()),
            name: name.to_string(),
            is_packet,
        };
        tables.resource_types.insert(kind.id, kind.clone());
        Ok(kind)
    }
}

/// Fails unless every updated and deleted id is present in `table`.
fn ensure_targets<R: Record>(
    table: &BTreeMap<R::Id, R>,
    batch: &RowBatch<R>,
) -> Result<(), RepositoryError> {
    let known = batch
        .updated
        .iter()
        .map(R::id)
        .chain(batch.deleted.iter().copied())
        .all(|id| table.contains_key(&id));
    if known {
        Ok(())
    } else {
        Err(RepositoryError::NotFound)
    }
}

fn apply_updates<R: Record>(table: &mut BTreeMap<R::Id, R>, batch_updates: Vec<R>) {
    for record in batch_updates {
        table.insert(record.id(), record);
    }
}

impl ElecteeRepository for InMemoryElecteeRepository {
    fn groups_for_term(&self, term: TermId) -> Result<Vec<ElecteeGroup>, RepositoryError> {
        Ok(self
            .tables()?
            .groups
            .values()
            .filter(|group| group.term == term)
            .cloned()
            .collect())
    }

    fn apply_group_batch(&self, batch: RowBatch<ElecteeGroup>) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        ensure_targets(&tables.groups, &batch)?;

        let RowBatch {
            created,
            updated,
            deleted,
        } = batch;
        let removed: HashSet<GroupId> = deleted.into_iter().collect();
        tables.groups.retain(|id, _| !removed.contains(id));
        tables
            .events
            .retain(|_, event| !removed.contains(&event.electee_group));
        apply_updates(&mut tables.groups, updated);
        for draft in created {
            let id = GroupId(tables.next_id());
            tables.groups.insert(id, ElecteeGroup::from_draft(id, draft));
        }
        Ok(())
    }

    fn replace_memberships(
        &self,
        assignments: &[(GroupId, Vec<MemberId>)],
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !assignments
            .iter()
            .all(|(group, _)| tables.groups.contains_key(group))
        {
            return Err(RepositoryError::NotFound);
        }
        for (group, members) in assignments {
            if let Some(record) = tables.groups.get_mut(group) {
                record.members.clear();
                record.members.extend(members.iter().cloned());
            }
        }
        Ok(())
    }

    fn events_for_term(&self, term: TermId) -> Result<Vec<ElecteeGroupEvent>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .events
            .values()
            .filter(|event| {
                tables
                    .groups
                    .get(&event.electee_group)
                    .is_some_and(|group| group.term == term)
            })
            .cloned()
            .collect())
    }

    fn apply_event_batch(
        &self,
        batch: RowBatch<ElecteeGroupEvent>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        ensure_targets(&tables.events, &batch)?;
        let groups_exist = batch
            .created
            .iter()
            .map(|draft| draft.electee_group)
            .chain(batch.updated.iter().map(|event| event.electee_group))
            .all(|group| tables.groups.contains_key(&group));
        if !groups_exist {
            return Err(RepositoryError::NotFound);
        }
        let totals = projected_totals(&tables, &batch)?;

        for id in &batch.deleted {
            tables.events.remove(id);
        }
        apply_updates(&mut tables.events, batch.updated);
        for draft in batch.created {
            let id = GroupEventId(tables.next_id());
            tables.events.insert(
                id,
                ElecteeGroupEvent {
                    id,
                    electee_group: draft.electee_group,
                    description: draft.description,
                    points: draft.points,
                    related_event_id: draft.related_event_id,
                },
            );
        }
        for (group, points) in totals {
            if let Some(record) = tables.groups.get_mut(&group) {
                record.points = points;
            }
        }
        Ok(())
    }

    fn resource_types(&self) -> Result<Vec<ElecteeResourceType>, RepositoryError> {
        Ok(self.tables()?.resource_types.values().cloned().collect())
    }

    fn resources_for_term(&self, term: TermId) -> Result<Vec<ElecteeResource>, RepositoryError> {
        Ok(self
            .tables()?
            .resources
            .values()
            .filter(|resource| resource.term == term)
            .cloned()
            .collect())
    }

    fn apply_resource_batch(
        &self,
        batch: RowBatch<ElecteeResource>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        ensure_targets(&tables.resources, &batch)?;
        let types_exist = batch
            .created
            .iter()
            .map(|draft| draft.resource_type)
            .chain(batch.updated.iter().map(|resource| resource.resource_type))
            .all(|kind| tables.resource_types.contains_key(&kind));
        if !types_exist {
            return Err(RepositoryError::NotFound);
        }

        for id in &batch.deleted {
            tables.resources.remove(id);
        }
        apply_updates(&mut tables.resources, batch.updated);
        for draft in batch.created {
            let id = ResourceId(tables.next_id());
            tables.resources.insert(
                id,
                ElecteeResource {
                    id,
                    term: draft.term,
                    resource_type: draft.resource_type,
                    attachment: draft.attachment,
                },
            );
        }
        Ok(())
    }

    fn background_form(
        &self,
        member: &MemberId,
        term: TermId,
    ) -> Result<Option<EducationalBackgroundForm>, RepositoryError> {
        Ok(self
            .tables()?
            .forms
            .values()
            .find(|form| &form.member == member && form.term == term)
            .cloned())
    }

    fn institutions(
        &self,
        form: BackgroundFormId,
    ) -> Result<Vec<BackgroundInstitution>, RepositoryError> {
        Ok(self
            .tables()?
            .institutions
            .values()
            .filter(|institution| institution.form == form)
            .cloned()
            .collect())
    }

    fn save_background(
        &self,
        draft: BackgroundDraft,
        institutions: RowBatch<BackgroundInstitution>,
    ) -> Result<EducationalBackgroundForm, RepositoryError> {
        let mut tables = self.tables()?;
        let existing = tables
            .forms
            .values()
            .find(|form| form.member == draft.member && form.term == draft.term)
            .map(|form| form.id);

        let owned = |id: &InstitutionId| {
            existing.is_some_and(|form| {
                tables
                    .institutions
                    .get(id)
                    .is_some_and(|institution| institution.form == form)
            })
        };
        let targets_owned = institutions
            .updated
            .iter()
            .map(|institution| &institution.id)
            .chain(&institutions.deleted)
            .all(owned);
        if !targets_owned {
            return Err(RepositoryError::NotFound);
        }

        let id = match existing {
            Some(id) => id,
            None => BackgroundFormId(tables.next_id()),
        };
        let form = EducationalBackgroundForm {
            id,
            member: draft.member,
            term: draft.term,
            degree_type: draft.degree_type,
            concentration: draft.concentration,
        };
        tables.forms.insert(id, form.clone());

        for removed in &institutions.deleted {
            tables.institutions.remove(removed);
        }
        for institution in institutions.updated {
            tables.institutions.insert(
                institution.id,
                BackgroundInstitution {
                    form: id,
                    ..institution
                },
            );
        }
        for new in institutions.created {
            let institution_id = InstitutionId(tables.next_id());
            tables.institutions.insert(
                institution_id,
                BackgroundInstitution {
                    id: institution_id,
                    form: id,
                    name: new.name,
                    degree_type: new.degree_type,
                    major: new.major,
                    degree_start_date: new.degree_start_date,
                    degree_end_date: new.degree_end_date,
                },
            );
        }
        Ok(form)
    }

    fn survey_for_term(
        &self,
        term: TermId,
    ) -> Result<Option<ElecteeInterviewSurvey>, RepositoryError> {
        Ok(self
            .tables()?
            .surveys
            .values()
            .find(|survey| survey.term == term)
            .cloned())
    }

    fn save_survey(
        &self,
        term: TermId,
        draft: SurveyDraft,
    ) -> Result<ElecteeInterviewSurvey, RepositoryError> {
        let mut tables = self.tables()?;
        if let Some(survey) = tables.surveys.values_mut().find(|survey| survey.term == term) {
            survey.due_date = draft.due_date;
            survey.instructions = draft.instructions;
            return Ok(survey.clone());
        }

        let survey = ElecteeInterviewSurvey {
            id: SurveyId(tables.next_id()),
            term,
            due_date: draft.due_date,
            instructions: draft.instructions,
            questions: Vec::new(),
        };
        tables.surveys.insert(survey.id, survey.clone());
        Ok(survey)
    }

    fn set_survey_questions(
        &self,
        survey: SurveyId,
        questions: Vec<QuestionId>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !questions
            .iter()
            .all(|question| tables.questions.contains_key(question))
        {
            return Err(RepositoryError::NotFound);
        }
        let record = tables
            .surveys
            .get_mut(&survey)
            .ok_or(RepositoryError::NotFound)?;
        record.questions = questions;
        Ok(())
    }

    fn survey_parts(&self) -> Result<Vec<SurveyPart>, RepositoryError> {
        Ok(self.tables()?.parts.values().cloned().collect())
    }

    fn apply_part_batch(&self, batch: RowBatch<SurveyPart>) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        ensure_targets(&tables.parts, &batch)?;
        let referenced = tables
            .questions
            .values()
            .any(|question| batch.deleted.contains(&question.part));
        if referenced {
            return Err(RepositoryError::Conflict);
        }

        for id in &batch.deleted {
            tables.parts.remove(id);
        }
        apply_updates(&mut tables.parts, batch.updated);
        for draft in batch.created {
            let id = PartId(tables.next_id());
            tables.parts.insert(
                id,
                SurveyPart {
                    id,
                    title: draft.title,
                    number: draft.number,
                    instructions: draft.instructions,
                    all_required: draft.all_required,
                },
            );
        }
        Ok(())
    }

    fn survey_questions(&self) -> Result<Vec<SurveyQuestion>, RepositoryError> {
        Ok(self.tables()?.questions.values().cloned().collect())
    }

    fn apply_question_batch(
        &self,
        batch: RowBatch<SurveyQuestion>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        ensure_targets(&tables.questions, &batch)?;
        let parts_exist = batch
            .created
            .iter()
            .map(|draft| draft.part)
            .chain(batch.updated.iter().map(|question| question.part))
            .all(|part| tables.parts.contains_key(&part));
        if !parts_exist {
            return Err(RepositoryError::NotFound);
        }

        let removed: HashSet<QuestionId> = batch.deleted.iter().copied().collect();
        tables.questions.retain(|id, _| !removed.contains(id));
        tables
            .answers
            .retain(|_, answer| !removed.contains(&answer.question));
        for survey in tables.surveys.values_mut() {
            survey.questions.retain(|question| !removed.contains(question));
        }

        apply_updates(&mut tables.questions, batch.updated);
        for draft in batch.created {
            let id = QuestionId(tables.next_id());
            tables.questions.insert(
                id,
                SurveyQuestion {
                    id,
                    part: draft.part,
                    number: draft.number,
                    text: draft.text,
                    max_words: draft.max_words,
                },
            );
        }
        Ok(())
    }

    fn answers(
        &self,
        term: TermId,
        submitter: &MemberId,
        questions: &[QuestionId],
    ) -> Result<Vec<SurveyAnswer>, RepositoryError> {
        Ok(self
            .tables()?
            .answers
            .values()
            .filter(|answer| {
                answer.term == term
                    && &answer.submitter == submitter
                    && questions.contains(&answer.question)
            })
            .cloned()
            .collect())
    }

    fn apply_answer_changes(
        &self,
        term: TermId,
        submitter: &MemberId,
        changes: &[AnswerChange],
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let owns = |id: &AnswerId| {
            tables
                .answers
                .get(id)
                .is_some_and(|answer| answer.term == term && &answer.submitter == submitter)
        };
        let answered = |question: &QuestionId| {
            tables.answers.values().any(|answer| {
                answer.term == term && &answer.submitter == submitter && answer.question == *question
            })
        };
        for change in changes {
            match change {
                AnswerChange::Create { question, .. } if answered(question) => {
                    return Err(RepositoryError::Conflict)
                }
                AnswerChange::Create { question, .. } if !tables.questions.contains_key(question) => {
                    return Err(RepositoryError::NotFound)
                }
                AnswerChange::Update { id, .. } | AnswerChange::Delete { id } if !owns(id) => {
                    return Err(RepositoryError::NotFound)
                }
                _ => {}
            }
        }

        for change in changes {
            match change {
                AnswerChange::Create { question, answer } => {
                    let id = AnswerId(tables.next_id());
                    tables.answers.insert(
                        id,
                        SurveyAnswer {
                            id,
                            term,
                            submitter: submitter.clone(),
                            question: *question,
                            answer: answer.clone(),
                        },
                    );
                }
                AnswerChange::Update { id, answer } => {
                    if let Some(stored) = tables.answers.get_mut(id) {
                        stored.answer = answer.clone();
                    }
                }
                AnswerChange::Delete { id } => {
                    tables.answers.remove(id);
                }
            }
        }
        Ok(())
    }
}

/// Every team's point total as it will stand once `batch` is applied.
fn projected_totals(
    tables: &Tables,
    batch: &RowBatch<ElecteeGroupEvent>,
) -> Result<BTreeMap<GroupId, i32>, RepositoryError> {
    let replaced: HashSet<GroupEventId> = batch
        .deleted
        .iter()
        .copied()
        .chain(batch.updated.iter().map(|event| event.id))
        .collect();
    let kept = tables
        .events
        .values()
        .filter(|event| !replaced.contains(&event.id))
        .map(|event| (event.electee_group, event.points));
    let changed = batch
        .updated
        .iter()
        .map(|event| (event.electee_group, event.points))
        .chain(batch.created.iter().map(|draft| (draft.electee_group, draft.points)));

    let mut sums: BTreeMap<GroupId, i64> = tables.groups.keys().map(|group| (*group, 0)).collect();
    for (group, points) in kept.chain(changed) {
        if let Some(sum) = sums.get_mut(&group) {
            *sum += i64::from(points);
        }
    }
    sums.into_iter()
        .map(|(group, sum)| {
            i32::try_from(sum)
                .map(|total| (group, total))
                .map_err(|_| RepositoryError::PointsOutOfRange { group })
        })
        .collect()
}

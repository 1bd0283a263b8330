use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::rows::Record;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of an electee team.
    GroupId
);
record_id!(
    /// Identifier of a point adjustment row.
    GroupEventId
);
record_id!(ResourceTypeId);
record_id!(ResourceId);
record_id!(BackgroundFormId);
record_id!(InstitutionId);
record_id!(SurveyId);
record_id!(
    /// Identifier of a survey part in the global catalog.
    PartId
);
record_id!(
    /// Identifier of a survey question in the global catalog.
    QuestionId
);
record_id!(AnswerId);

/// Identifier of an academic term, owned by the term resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(pub u32);

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An academic period scoping teams, resources, surveys and background forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub label: String,
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// A member's uniqname. Always stored trimmed and lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MemberId(String);

impl MemberId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for MemberId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<MemberId> for String {
    fn from(value: MemberId) -> Self {
        value.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    Undergraduate,
    Graduate,
    Alumni,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Electee,
    Active,
}

/// Directory entry for a portal member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub uniqname: MemberId,
    pub first_name: String,
    pub last_name: String,
    pub standing: Standing,
    pub status: MemberStatus,
}

impl MemberProfile {
    pub fn is_electee(&self) -> bool {
        self.status == MemberStatus::Electee
    }
}

/// A team of electees for one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElecteeGroup {
    pub id: GroupId,
    pub term: TermId,
    pub group_name: String,
    pub leaders: Vec<MemberId>,
    pub officers: Vec<MemberId>,
    pub members: Vec<MemberId>,
    pub points: i32,
}

impl ElecteeGroup {
    /// Materialise a newly created team: no members and no points yet.
    pub fn from_draft(id: GroupId, draft: NewElecteeGroup) -> Self {
        Self {
            id,
            term: draft.term,
            group_name: draft.group_name,
            leaders: draft.leaders,
            officers: draft.officers,
            members: Vec::new(),
            points: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewElecteeGroup {
    pub term: TermId,
    pub group_name: String,
    pub leaders: Vec<MemberId>,
    pub officers: Vec<MemberId>,
}

impl Record for ElecteeGroup {
    type Id = GroupId;
    type Draft = NewElecteeGroup;

    fn id(&self) -> GroupId {
        self.id
    }
}

/// A point adjustment for a team. Rows linked to an organisational event are
/// derived from attendance and never edited by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElecteeGroupEvent {
    pub id: GroupEventId,
    pub electee_group: GroupId,
    pub description: String,
    pub points: i32,
    pub related_event_id: Option<u64>,
}

impl ElecteeGroupEvent {
    pub fn is_manual(&self) -> bool {
        self.related_event_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroupEvent {
    pub electee_group: GroupId,
    pub description: String,
    pub points: i32,
    pub related_event_id: Option<u64>,
}

impl Record for ElecteeGroupEvent {
    type Id = GroupEventId;
    type Draft = NewGroupEvent;

    fn id(&self) -> GroupEventId {
        self.id
    }
}

/// Category of onboarding material; packets are bundles of the individual parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElecteeResourceType {
    pub id: ResourceTypeId,
    pub name: String,
    pub is_packet: bool,
}

/// Stored file backing a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub storage_key: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElecteeResource {
    pub id: ResourceId,
    pub term: TermId,
    pub resource_type: ResourceTypeId,
    pub attachment: Attachment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewElecteeResource {
    pub term: TermId,
    pub resource_type: ResourceTypeId,
    pub attachment: Attachment,
}

impl Record for ElecteeResource {
    type Id = ResourceId;
    type Draft = NewElecteeResource;

    fn id(&self) -> ResourceId {
        self.id
    }
}

/// Graduate program the member is enrolled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraduateDegree {
    Masters,
    Meng,
    Phd,
    Other,
}

/// One graduate member's educational background for a term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationalBackgroundForm {
    pub id: BackgroundFormId,
    pub member: MemberId,
    pub term: TermId,
    pub degree_type: GraduateDegree,
    pub concentration: String,
}

/// Validated parent fields ready to be written for (member, term).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundDraft {
    pub member: MemberId,
    pub term: TermId,
    pub degree_type: GraduateDegree,
    pub concentration: String,
}

/// A prior degree listed on a background form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundInstitution {
    pub id: InstitutionId,
    pub form: BackgroundFormId,
    pub name: String,
    pub degree_type: String,
    pub major: String,
    pub degree_start_date: NaiveDate,
    pub degree_end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInstitution {
    pub name: String,
    pub degree_type: String,
    pub major: String,
    pub degree_start_date: NaiveDate,
    pub degree_end_date: NaiveDate,
}

impl Record for BackgroundInstitution {
    type Id = InstitutionId;
    type Draft = NewInstitution;

    fn id(&self) -> InstitutionId {
        self.id
    }
}

/// Per-term survey definition; `questions` lists the active catalog entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElecteeInterviewSurvey {
    pub id: SurveyId,
    pub term: TermId,
    pub due_date: NaiveDate,
    pub instructions: String,
    pub questions: Vec<QuestionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyDraft {
    pub due_date: NaiveDate,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyPart {
    pub id: PartId,
    pub title: String,
    pub number: u16,
    pub instructions: String,
    /// Blank means the part does not require every question.
    pub all_required: Option<bool>,
}

impl SurveyPart {
    pub fn requires_all(&self) -> bool {
        self.all_required.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSurveyPart {
    pub title: String,
    pub number: u16,
    pub instructions: String,
    pub all_required: Option<bool>,
}

impl Record for SurveyPart {
    type Id = PartId;
    type Draft = NewSurveyPart;

    fn id(&self) -> PartId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyQuestion {
    pub id: QuestionId,
    pub part: PartId,
    pub number: u16,
    pub text: String,
    /// Blank means unlimited.
    pub max_words: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSurveyQuestion {
    pub part: PartId,
    pub number: u16,
    pub text: String,
    pub max_words: Option<u32>,
}

impl Record for SurveyQuestion {
    type Id = QuestionId;
    type Draft = NewSurveyQuestion;

    fn id(&self) -> QuestionId {
        self.id
    }
}

/// A member's answer to one survey question in one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyAnswer {
    pub id: AnswerId,
    pub term: TermId,
    pub submitter: MemberId,
    pub question: QuestionId,
    pub answer: String,
}

//! Educational background forms for graduate electees.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    BackgroundDraft, BackgroundInstitution, EducationalBackgroundForm, GraduateDegree,
    InstitutionId, MemberId, NewInstitution, Term,
};
use super::portal::PortalError;
use super::repository::ElecteeRepository;
use super::rows::{
    bind_rows, required_text, required_value, Cleaned, FieldErrors, FormErrors, RowFields,
    RowInput, RowRules,
};

pub const PARENT_ERRORS_MESSAGE: &str =
    "There were errors in the submitted form. Please fix them and resubmit.";
pub const ROW_ERRORS_MESSAGE: &str =
    "Either there were errors in your prior degrees or you forgot to include one.";

const MAX_TEXT_LEN: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundFields {
    #[serde(default)]
    pub degree_type: Option<GraduateDegree>,
    #[serde(default)]
    pub concentration: String,
}

impl From<&EducationalBackgroundForm> for BackgroundFields {
    fn from(form: &EducationalBackgroundForm) -> Self {
        Self {
            degree_type: Some(form.degree_type),
            concentration: form.concentration.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub degree_type: String,
    #[serde(default)]
    pub major: String,
    #[serde(default)]
    pub degree_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub degree_end_date: Option<NaiveDate>,
}

impl RowFields for InstitutionFields {
    fn is_blank(&self) -> bool {
        self.name.trim().is_empty()
            && self.degree_type.trim().is_empty()
            && self.major.trim().is_empty()
            && self.degree_start_date.is_none()
            && self.degree_end_date.is_none()
    }
}

impl From<&BackgroundInstitution> for InstitutionFields {
    fn from(institution: &BackgroundInstitution) -> Self {
        Self {
            name: institution.name.clone(),
            degree_type: institution.degree_type.clone(),
            major: institution.major.clone(),
            degree_start_date: Some(institution.degree_start_date),
            degree_end_date: Some(institution.degree_end_date),
        }
    }
}

pub type InstitutionRow = RowInput<InstitutionId, InstitutionFields>;

/// The parent form and its prior-degree rows, submitted together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundSubmission {
    #[serde(default)]
    pub background: BackgroundFields,
    #[serde(default)]
    pub institute: Vec<InstitutionRow>,
}

/// What the background page starts from for a member and term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackgroundPage {
    pub form: Option<EducationalBackgroundForm>,
    #[serde(flatten)]
    pub submission: BackgroundSubmission,
}

/// Flash text for a rejected submission.
pub fn failure_message(errors: &FormErrors) -> &'static str {
    if errors.fields.is_empty() {
        ROW_ERRORS_MESSAGE
    } else {
        PARENT_ERRORS_MESSAGE
    }
}

pub struct BackgroundService<R> {
    repository: Arc<R>,
}

impl<R> BackgroundService<R>
where
    R: ElecteeRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// The member's saved form, or an empty one with a single blank degree row.
    pub fn load(&self, member: &MemberId, term: &Term) -> Result<BackgroundPage, PortalError> {
        let Some(form) = self.repository.background_form(member, term.id)? else {
            return Ok(BackgroundPage {
                form: None,
                submission: BackgroundSubmission {
                    background: BackgroundFields::default(),
                    institute: vec![InstitutionRow::added(InstitutionFields::default())],
                },
            });
        };

        let institute = self
            .repository
            .institutions(form.id)?
            .iter()
            .map(|institution| InstitutionRow::existing(institution.id, institution.into()))
            .collect();
        Ok(BackgroundPage {
            submission: BackgroundSubmission {
                background: (&form).into(),
                institute,
            },
            form: Some(form),
        })
    }

    /// Validate the parent form, then its degree rows, and save both together.
    pub fn submit(
        &self,
        member: &MemberId,
        term: &Term,
        submission: &BackgroundSubmission,
    ) -> Result<EducationalBackgroundForm, PortalError> {
        let fields = &submission.background;
        let mut errors = FieldErrors::new();
        let degree_type = required_value(&mut errors, "degree_type", fields.degree_type);
        let concentration =
            required_text(&mut errors, "concentration", &fields.concentration, MAX_TEXT_LEN);
        let Some(degree_type) = degree_type else {
            return Err(errors.into());
        };
        errors.finish(())?;

        let existing = match self.repository.background_form(member, term.id)? {
            Some(form) => self.repository.institutions(form.id)?,
            None => Vec::new(),
        };
        let institutions = bind_rows(
            &submission.institute,
            &existing,
            RowRules::first_row_required(),
            clean_institution,
        )?;

        let summary = institutions.summary();
        let form = self.repository.save_background(
            BackgroundDraft {
                member: member.clone(),
                term: term.id,
                degree_type,
                concentration,
            },
            institutions,
        )?;
        info!(term = %term.id, %member, ?summary, "educational background saved");
        Ok(form)
    }
}

fn clean_institution(
    fields: &InstitutionFields,
    current: Option<&BackgroundInstitution>,
) -> Result<Cleaned<BackgroundInstitution>, FieldErrors> {
    let mut errors = FieldErrors::new();
    let name = required_text(&mut errors, "name", &fields.name, MAX_TEXT_LEN);
    let degree_type = required_text(&mut errors, "degree_type", &fields.degree_type, MAX_TEXT_LEN);
    let major = required_text(&mut errors, "major", &fields.major, MAX_TEXT_LEN);
    let start = required_value(&mut errors, "degree_start_date", fields.degree_start_date);
    let end = required_value(&mut errors, "degree_end_date", fields.degree_end_date);
    let (Some(degree_start_date), Some(degree_end_date)) = (start, end) else {
        return Err(errors);
    };
    if degree_end_date < degree_start_date {
        errors.add(
            "degree_end_date",
            "The end date cannot be earlier than the start date.",
        );
    }
    errors.finish(())?;

    Ok(match current {
        Some(institution) => Cleaned::Update(BackgroundInstitution {
            name,
            degree_type,
            major,
            degree_start_date,
            degree_end_date,
            ..institution.clone()
        }),
        None => Cleaned::Create(NewInstitution {
            name,
            degree_type,
            major,
            degree_start_date,
            degree_end_date,
        }),
    })
}

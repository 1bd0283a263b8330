use std::sync::Arc;

use super::access::AccessGate;
use super::background::BackgroundService;
use super::domain::{Term, TermId};
use super::flash::FlashChannel;
use super::groups::GroupService;
use super::repository::{
    ElecteeRepository, MemberDirectory, PermissionOracle, RepositoryError, ResourceStorage,
    TermResolver,
};
use super::resources::ResourceService;
use super::rows::{FieldErrors, FormErrors, RowErrors};
use super::survey::SurveyService;

/// Error raised by the electee services.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("{0}")]
    NotFound(String),
    #[error("submission failed validation")]
    Invalid(FormErrors),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<FormErrors> for PortalError {
    fn from(value: FormErrors) -> Self {
        Self::Invalid(value)
    }
}

impl From<FieldErrors> for PortalError {
    fn from(value: FieldErrors) -> Self {
        Self::Invalid(value.into())
    }
}

impl From<RowErrors> for PortalError {
    fn from(value: RowErrors) -> Self {
        Self::Invalid(value.into())
    }
}

/// External collaborators the portal consumes but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub terms: Arc<dyn TermResolver>,
    pub permissions: Arc<dyn PermissionOracle>,
    pub directory: Arc<dyn MemberDirectory>,
    pub storage: Arc<dyn ResourceStorage>,
}

/// Every electee service wired to one repository, plus the capability gate
/// and flash channel the HTTP layer shares.
pub struct ElecteePortal<R> {
    pub groups: GroupService<R>,
    pub resources: ResourceService<R>,
    pub background: BackgroundService<R>,
    pub survey: SurveyService<R>,
    pub gate: AccessGate,
    pub flash: FlashChannel,
    terms: Arc<dyn TermResolver>,
}

impl<R> ElecteePortal<R>
where
    R: ElecteeRepository + 'static,
{
    pub fn new(repository: Arc<R>, collaborators: Collaborators) -> Self {
        let Collaborators {
            terms,
            permissions,
            directory,
            storage,
        } = collaborators;

        Self {
            groups: GroupService::new(repository.clone(), directory.clone()),
            resources: ResourceService::new(repository.clone(), storage),
            background: BackgroundService::new(repository.clone()),
            survey: SurveyService::new(repository),
            gate: AccessGate::new(permissions, directory),
            flash: FlashChannel::default(),
            terms,
        }
    }

    pub fn current_term(&self) -> Result<Term, PortalError> {
        Ok(self.terms.current_term()?)
    }

    /// Resolve a term by id; a miss is terminal for the request.
    pub fn term(&self, id: TermId) -> Result<Term, PortalError> {
        self.terms
            .term(id)?
            .ok_or_else(|| PortalError::NotFound(format!("term {id} does not exist")))
    }
}

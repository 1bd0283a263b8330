//! Electee progress tracking: teams and points, onboarding resources,
//! graduate background forms, and the interview survey.

pub mod access;
pub mod background;
pub mod domain;
pub mod flash;
pub mod groups;
pub mod memory;
pub mod page;
pub mod portal;
pub mod repository;
pub mod resources;
pub mod router;
pub mod rows;
pub mod survey;

#[cfg(test)]
mod tests;

pub use access::{Access, AccessGate, Capability, PermissionFlags, Viewer};
pub use background::{
    BackgroundFields, BackgroundPage, BackgroundService, BackgroundSubmission, InstitutionFields,
    InstitutionRow,
};
pub use flash::{Flash, FlashChannel, FlashKind};
pub use groups::{GroupFields, GroupRow, GroupService, MembershipOverview, PointsFields, PointsRow};
pub use memory::InMemoryElecteeRepository;
pub use page::RenderedPage;
pub use portal::{Collaborators, ElecteePortal, PortalError};
pub use repository::{
    ElecteeRepository, MemberDirectory, PermissionOracle, RepositoryError, ResourceStorage,
    TermResolver,
};
pub use resources::{ResourceFields, ResourceListing, ResourceRow, ResourceService, Upload};
pub use router::{electee_router, SESSION_HEADER, USER_HEADER};
pub use rows::{BatchSummary, FieldErrors, FormErrors, RowErrors, RowInput};
pub use survey::SurveyService;

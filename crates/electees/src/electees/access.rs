//! Capability checks run before every viewing or mutating operation.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use super::domain::{MemberId, Standing};
use super::repository::{MemberDirectory, PermissionOracle};

/// The caller as identified by the upstream authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub uniqname: Option<MemberId>,
    /// Key of the caller's flash slot.
    pub session: String,
}

impl Viewer {
    /// An unidentified caller without a session has no flash slot.
    pub fn anonymous() -> Self {
        Self {
            uniqname: None,
            session: String::new(),
        }
    }

    pub fn member(uniqname: impl Into<MemberId>) -> Self {
        let uniqname = uniqname.into();
        Self {
            session: uniqname.to_string(),
            uniqname: Some(uniqname),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ViewProgress,
    ManageProgress,
    CompleteSurvey,
    SubmitBackground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied(Capability),
}

impl Access {
    pub fn is_granted(self) -> bool {
        matches!(self, Access::Granted)
    }
}

/// Flags exposed to every page so the UI can hide unavailable actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PermissionFlags {
    pub can_create_groups: bool,
    pub can_edit_resources: bool,
    pub can_edit_surveys: bool,
    pub can_complete_surveys: bool,
}

pub struct AccessGate {
    permissions: Arc<dyn PermissionOracle>,
    directory: Arc<dyn MemberDirectory>,
}

impl AccessGate {
    pub fn new(permissions: Arc<dyn PermissionOracle>, directory: Arc<dyn MemberDirectory>) -> Self {
        Self {
            permissions,
            directory,
        }
    }

    pub fn check(&self, viewer: &Viewer, capability: Capability) -> Access {
        let granted = match (capability, viewer.uniqname.as_ref()) {
            (Capability::ViewProgress, _) => true,
            (_, None) => false,
            (Capability::ManageProgress, Some(user)) => {
                self.permissions.can_manage_electee_progress(user)
            }
            (Capability::CompleteSurvey, Some(user)) => {
                self.permissions.can_complete_electee_survey(user)
            }
            (Capability::SubmitBackground, Some(user)) => self.is_graduate_member(user),
        };

        if granted {
            Access::Granted
        } else {
            Access::Denied(capability)
        }
    }

    pub fn flags(&self, viewer: &Viewer) -> PermissionFlags {
        let manage = self.check(viewer, Capability::ManageProgress).is_granted();
        PermissionFlags {
            can_create_groups: manage,
            can_edit_resources: manage,
            can_edit_surveys: manage,
            can_complete_surveys: self.check(viewer, Capability::CompleteSurvey).is_granted(),
        }
    }

    fn is_graduate_member(&self, user: &MemberId) -> bool {
        match self.directory.member(user) {
            Ok(Some(profile)) => profile.standing == Standing::Graduate,
            Ok(None) => false,
            Err(err) => {
                warn!(%user, error = %err, "member directory lookup failed during access check");
                false
            }
        }
    }
}

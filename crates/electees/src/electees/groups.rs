//! Electee teams, their point adjustments, and team membership.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::domain::{
    ElecteeGroup, ElecteeGroupEvent, GroupEventId, GroupId, MemberId, MemberProfile,
    NewElecteeGroup, NewGroupEvent, Term,
};
use super::portal::PortalError;
use super::repository::{ElecteeRepository, MemberDirectory, RepositoryError};
use super::rows::{
    bind_rows, required_text, required_value, BatchSummary, Cleaned, FieldErrors, RowBatch,
    RowFields, RowInput, RowRules, NON_FIELD,
};

const MAX_GROUP_NAME_LEN: usize = 60;
const MAX_DESCRIPTION_LEN: usize = 255;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFields {
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub leaders: Vec<MemberId>,
    #[serde(default)]
    pub officers: Vec<MemberId>,
}

impl RowFields for GroupFields {
    fn is_blank(&self) -> bool {
        self.group_name.trim().is_empty() && self.leaders.is_empty() && self.officers.is_empty()
    }
}

impl From<&ElecteeGroup> for GroupFields {
    fn from(group: &ElecteeGroup) -> Self {
        Self {
            group_name: group.group_name.clone(),
            leaders: group.leaders.clone(),
            officers: group.officers.clone(),
        }
    }
}

pub type GroupRow = RowInput<GroupId, GroupFields>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsFields {
    #[serde(default)]
    pub electee_group: Option<GroupId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub points: Option<i32>,
}

impl RowFields for PointsFields {
    fn is_blank(&self) -> bool {
        self.electee_group.is_none() && self.description.trim().is_empty() && self.points.is_none()
    }
}

impl From<&ElecteeGroupEvent> for PointsFields {
    fn from(event: &ElecteeGroupEvent) -> Self {
        Self {
            electee_group: Some(event.electee_group),
            description: event.description.clone(),
            points: Some(event.points),
        }
    }
}

pub type PointsRow = RowInput<GroupEventId, PointsFields>;

/// Teams with their members plus the term's electees nobody has placed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipOverview {
    pub groups: Vec<ElecteeGroup>,
    pub unassigned_electees: Vec<MemberProfile>,
}

pub struct GroupService<R> {
    repository: Arc<R>,
    directory: Arc<dyn MemberDirectory>,
}

impl<R> GroupService<R>
where
    R: ElecteeRepository + 'static,
{
    pub fn new(repository: Arc<R>, directory: Arc<dyn MemberDirectory>) -> Self {
        Self {
            repository,
            directory,
        }
    }

    /// The term's teams, lowest point total first.
    pub fn groups(&self, term: &Term) -> Result<Vec<ElecteeGroup>, PortalError> {
        let mut groups = self.repository.groups_for_term(term.id)?;
        groups.sort_by_key(|group| (group.points, group.id));
        Ok(groups)
    }

    /// Create, rename, restaff or remove teams for the term.
    ///
    /// New teams always start in `term` with zero points and no members.
    pub fn edit_groups(&self, term: &Term, rows: &[GroupRow]) -> Result<BatchSummary, PortalError> {
        let existing = self.repository.groups_for_term(term.id)?;
        let known = self.known_members(
            rows.iter()
                .filter(|row| !row.delete)
                .flat_map(|row| row.fields.leaders.iter().chain(&row.fields.officers)),
        )?;

        let batch = bind_rows(rows, &existing, RowRules::default(), |fields, current| {
            let mut errors = FieldErrors::new();
            let group_name =
                required_text(&mut errors, "group_name", &fields.group_name, MAX_GROUP_NAME_LEN);
            let leaders = members_field(&mut errors, "leaders", &fields.leaders, &known);
            let officers = members_field(&mut errors, "officers", &fields.officers, &known);
            errors.finish(())?;

            Ok(match current {
                Some(group) => Cleaned::Update(ElecteeGroup {
                    group_name,
                    leaders,
                    officers,
                    ..group.clone()
                }),
                None => Cleaned::Create(NewElecteeGroup {
                    term: term.id,
                    group_name,
                    leaders,
                    officers,
                }),
            })
        })?;

        let summary = batch.summary();
        self.repository.apply_group_batch(batch)?;
        info!(term = %term.id, ?summary, "electee teams updated");
        Ok(summary)
    }

    /// Manually entered point adjustments for the term's teams.
    pub fn manual_events(&self, term: &Term) -> Result<Vec<ElecteeGroupEvent>, PortalError> {
        let mut events: Vec<ElecteeGroupEvent> = self
            .repository
            .events_for_term(term.id)?
            .into_iter()
            .filter(ElecteeGroupEvent::is_manual)
            .collect();
        events.sort_by_key(|event| event.id);
        Ok(events)
    }

    /// Edit manual point adjustments. Derived rows are outside the editable
    /// set, so submissions naming them are rejected.
    pub fn edit_points(&self, term: &Term, rows: &[PointsRow]) -> Result<BatchSummary, PortalError> {
        let groups: HashSet<GroupId> = self
            .repository
            .groups_for_term(term.id)?
            .iter()
            .map(|group| group.id)
            .collect();
        let existing = self.manual_events(term)?;

        let batch = bind_rows(rows, &existing, RowRules::default(), |fields, current| {
            let mut errors = FieldErrors::new();
            let electee_group = required_value(&mut errors, "electee_group", fields.electee_group);
            if let Some(group) = electee_group {
                if !groups.contains(&group) {
                    errors.add(
                        "electee_group",
                        format!("Team {group} is not an electee team this term."),
                    );
                }
            }
            let description = required_text(
                &mut errors,
                "description",
                &fields.description,
                MAX_DESCRIPTION_LEN,
            );
            let points = required_value(&mut errors, "points", fields.points);
            let (Some(electee_group), Some(points)) = (electee_group, points) else {
                return Err(errors);
            };
            errors.finish(())?;

            Ok(match current {
                Some(event) => Cleaned::Update(ElecteeGroupEvent {
                    electee_group,
                    description,
                    points,
                    ..event.clone()
                }),
                None => Cleaned::Create(NewGroupEvent {
                    electee_group,
                    description,
                    points,
                    related_event_id: None,
                }),
            })
        })?;

        let summary = batch.summary();
        self.apply_events(batch)?;
        info!(term = %term.id, ?summary, "electee team points updated");
        Ok(summary)
    }

    /// Record points earned through an organisational event.
    pub fn award_event_points(
        &self,
        term: &Term,
        group: GroupId,
        related_event_id: u64,
        points: i32,
        description: &str,
    ) -> Result<(), PortalError> {
        let in_term = self
            .repository
            .groups_for_term(term.id)?
            .iter()
            .any(|candidate| candidate.id == group);
        if !in_term {
            return Err(PortalError::NotFound(format!(
                "team {group} is not an electee team in {term}"
            )));
        }

        let mut batch = RowBatch::default();
        batch.created.push(NewGroupEvent {
            electee_group: group,
            description: description.to_string(),
            points,
            related_event_id: Some(related_event_id),
        });
        self.apply_events(batch)?;
        debug!(%group, related_event_id, points, "event points awarded");
        Ok(())
    }

    pub fn membership(&self, term: &Term) -> Result<MembershipOverview, PortalError> {
        let groups = self.groups(term)?;
        let placed: HashSet<&MemberId> = groups.iter().flat_map(|group| &group.members).collect();
        let mut unassigned_electees: Vec<MemberProfile> = self
            .directory
            .electees(term)?
            .into_iter()
            .filter(|member| !placed.contains(&member.uniqname))
            .collect();
        unassigned_electees.sort_by(|a, b| {
            (&a.last_name, &a.first_name, &a.uniqname).cmp(&(&b.last_name, &b.first_name, &b.uniqname))
        });

        Ok(MembershipOverview {
            groups,
            unassigned_electees,
        })
    }

    /// Replace team membership from the JSON mapping `{"<group id>": ["uniqname", ...]}`.
    ///
    /// Each listed team ends up with exactly the given members; teams not
    /// listed are untouched. Any unknown team or member rejects the whole
    /// submission.
    pub fn replace_memberships(&self, term: &Term, raw: &str) -> Result<usize, PortalError> {
        const FIELD: &str = "electee_groups";

        let mut errors = FieldErrors::new();
        let mapping: BTreeMap<String, Vec<MemberId>> = match serde_json::from_str(raw) {
            Ok(mapping) => mapping,
            Err(err) => {
                errors.add(FIELD, format!("Team assignments could not be read: {err}"));
                return Err(errors.into());
            }
        };

        let groups: HashSet<GroupId> = self
            .repository
            .groups_for_term(term.id)?
            .iter()
            .map(|group| group.id)
            .collect();
        let known = self.known_members(mapping.values().flatten())?;

        let mut assignments = Vec::with_capacity(mapping.len());
        for (raw_id, members) in &mapping {
            let group = match raw_id.trim().parse::<u64>().map(GroupId) {
                Ok(group) if groups.contains(&group) => group,
                _ => {
                    errors.add(
                        FIELD,
                        format!("Team {raw_id} is not an electee team this term."),
                    );
                    continue;
                }
            };
            let members = members_field(&mut errors, FIELD, members, &known);
            assignments.push((group, members));
        }
        errors.finish(())?;

        self.repository.replace_memberships(&assignments)?;
        info!(term = %term.id, teams = assignments.len(), "electee team membership replaced");
        Ok(assignments.len())
    }

    fn apply_events(&self, batch: RowBatch<ElecteeGroupEvent>) -> Result<(), PortalError> {
        match self.repository.apply_event_batch(batch) {
            Err(RepositoryError::PointsOutOfRange { group }) => {
                let mut errors = FieldErrors::new();
                errors.add(
                    NON_FIELD,
                    format!("Team {group} would end up with more points than can be recorded."),
                );
                Err(errors.into())
            }
            result => Ok(result?),
        }
    }

    fn known_members<'a>(
        &self,
        names: impl Iterator<Item = &'a MemberId>,
    ) -> Result<HashSet<MemberId>, PortalError> {
        let mut known = HashSet::new();
        for name in names {
            if known.contains(name) {
                continue;
            }
            if self.directory.member(name)?.is_some() {
                known.insert(name.clone());
            }
        }
        Ok(known)
    }
}

/// Deduplicated member list, flagging names the directory does not know.
fn members_field(
    errors: &mut FieldErrors,
    field: &str,
    members: &[MemberId],
    known: &HashSet<MemberId>,
) -> Vec<MemberId> {
    let mut cleaned: Vec<MemberId> = Vec::with_capacity(members.len());
    for member in members {
        if member.is_empty() || cleaned.contains(member) {
            continue;
        }
        if known.contains(member) {
            cleaned.push(member.clone());
        } else {
            errors.add(field, format!("{member} is not a member of the portal."));
        }
    }
    cleaned
}

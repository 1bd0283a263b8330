use electees::config::PortalConfig;
use electees::electees::domain::{MemberId, MemberProfile, MemberStatus, Standing, Term, TermId};
use electees::electees::{
    Collaborators, ElecteePortal, InMemoryElecteeRepository, MemberDirectory, PermissionOracle,
    PortalError, RepositoryError, ResourceStorage, TermResolver,
};
use electees::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Resource categories every fresh portal starts with.
pub(crate) const DEFAULT_RESOURCE_TYPES: [(&str, bool); 3] = [
    ("Electee Packet", true),
    ("Interview Guide", false),
    ("Service Hours Log", false),
];

const SAMPLE_ROSTER: &[(&str, &str, &str, Standing, MemberStatus)] = &[
    ("avp", "Avery", "Park", Standing::Graduate, MemberStatus::Active),
    ("jlee", "Jordan", "Lee", Standing::Undergraduate, MemberStatus::Active),
    ("mkim", "Morgan", "Kim", Standing::Undergraduate, MemberStatus::Electee),
    ("rdiaz", "Riley", "Diaz", Standing::Undergraduate, MemberStatus::Electee),
    ("spatel", "Sam", "Patel", Standing::Graduate, MemberStatus::Electee),
    ("tnguyen", "Taylor", "Nguyen", Standing::Undergraduate, MemberStatus::Electee),
];

/// Uniqnames granted management rights when no managers are configured.
pub(crate) const SAMPLE_MANAGERS: [&str; 1] = ["avp"];

#[derive(Debug, Deserialize)]
struct RosterRecord {
    uniqname: String,
    first_name: String,
    last_name: String,
    standing: Standing,
    status: MemberStatus,
}

/// Member directory backed by a roster export.
#[derive(Debug, Default, Clone)]
pub(crate) struct RosterDirectory {
    members: BTreeMap<MemberId, MemberProfile>,
}

impl RosterDirectory {
    pub(crate) fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut members = BTreeMap::new();
        for record in csv_reader.deserialize::<RosterRecord>() {
            let record = record?;
            let uniqname = MemberId::new(&record.uniqname);
            if uniqname.is_empty() {
                continue;
            }
            members.insert(
                uniqname.clone(),
                MemberProfile {
                    uniqname,
                    first_name: record.first_name,
                    last_name: record.last_name,
                    standing: record.standing,
                    status: record.status,
                },
            );
        }
        Ok(Self { members })
    }

    pub(crate) fn from_path(path: &Path) -> Result<Self, AppError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file).map_err(|err| AppError::Roster {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    pub(crate) fn sample() -> Self {
        let members = SAMPLE_ROSTER
            .iter()
            .map(|&(uniqname, first_name, last_name, standing, status)| {
                let uniqname = MemberId::new(uniqname);
                let profile = MemberProfile {
                    uniqname: uniqname.clone(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    standing,
                    status,
                };
                (uniqname, profile)
            })
            .collect();
        Self { members }
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }
}

impl MemberDirectory for RosterDirectory {
    fn member(&self, uniqname: &MemberId) -> Result<Option<MemberProfile>, RepositoryError> {
        Ok(self.members.get(uniqname).cloned())
    }

    fn electees(&self, _term: &Term) -> Result<Vec<MemberProfile>, RepositoryError> {
        Ok(self
            .members
            .values()
            .filter(|profile| profile.is_electee())
            .cloned()
            .collect())
    }
}

/// Managers come from configuration; any electee on the roster may take the survey.
pub(crate) struct RosterPermissions {
    managers: BTreeSet<MemberId>,
    directory: Arc<RosterDirectory>,
}

impl RosterPermissions {
    pub(crate) fn new<I, S>(managers: I, directory: Arc<RosterDirectory>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            managers: managers.into_iter().map(MemberId::new).collect(),
            directory,
        }
    }
}

impl PermissionOracle for RosterPermissions {
    fn can_manage_electee_progress(&self, user: &MemberId) -> bool {
        self.managers.contains(user)
    }

    fn can_complete_electee_survey(&self, user: &MemberId) -> bool {
        self.directory
            .members
            .get(user)
            .is_some_and(MemberProfile::is_electee)
    }
}

/// Calendar that only knows the configured current term.
pub(crate) struct FixedTermCalendar {
    current: Term,
}

impl FixedTermCalendar {
    pub(crate) fn new(id: u32, label: impl Into<String>) -> Self {
        Self {
            current: Term {
                id: TermId(id),
                label: label.into(),
            },
        }
    }
}

impl TermResolver for FixedTermCalendar {
    fn current_term(&self) -> Result<Term, RepositoryError> {
        Ok(self.current.clone())
    }

    fn term(&self, id: TermId) -> Result<Option<Term>, RepositoryError> {
        Ok((id == self.current.id).then(|| self.current.clone()))
    }
}

/// Keeps uploaded resource files in process memory.
#[derive(Default)]
pub(crate) struct InMemoryResourceStorage {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryResourceStorage {
    pub(crate) fn keys(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ResourceStorage for InMemoryResourceStorage {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), RepositoryError> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| RepositoryError::Unavailable("resource storage poisoned".to_string()))?;
        files.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), RepositoryError> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| RepositoryError::Unavailable("resource storage poisoned".to_string()))?;
        files.remove(key);
        Ok(())
    }
}

pub(crate) type Portal = ElecteePortal<InMemoryElecteeRepository>;

/// Wire the portal against the configured roster, managers and term.
pub(crate) fn build_portal(config: &PortalConfig) -> Result<(Arc<Portal>, Arc<InMemoryResourceStorage>), AppError> {
    let directory = match &config.roster_csv {
        Some(path) => RosterDirectory::from_path(path)?,
        None => RosterDirectory::sample(),
    };
    info!(members = directory.len(), "member roster loaded");
    let directory = Arc::new(directory);

    let permissions = if config.managers.is_empty() {
        RosterPermissions::new(SAMPLE_MANAGERS, directory.clone())
    } else {
        RosterPermissions::new(&config.managers, directory.clone())
    };

    let repository = Arc::new(InMemoryElecteeRepository::new());
    for (name, is_packet) in DEFAULT_RESOURCE_TYPES {
        repository
            .insert_resource_type(name, is_packet)
            .map_err(PortalError::from)?;
    }

    let storage = Arc::new(InMemoryResourceStorage::default());
    let portal = ElecteePortal::new(
        repository,
        Collaborators {
            terms: Arc::new(FixedTermCalendar::new(
                config.current_term_id,
                config.current_term_label.clone(),
            )),
            permissions: Arc::new(permissions),
            directory,
            storage: storage.clone(),
        },
    );
    Ok((Arc::new(portal), storage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_csv_normalises_uniqnames() {
        let csv = "uniqname,first_name,last_name,standing,status\n \
                   MKim ,Morgan,Kim,undergraduate,electee\n\
                   avp,Avery,Park,graduate,active\n";
        let directory = RosterDirectory::from_reader(csv.as_bytes()).expect("roster parses");

        let profile = directory
            .member(&MemberId::from("mkim"))
            .expect("lookup")
            .expect("member present");
        assert_eq!(profile.first_name, "Morgan");
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn roster_rejects_unknown_status() {
        let csv = "uniqname,first_name,last_name,standing,status\nx,X,Y,graduate,alumnus\n";
        assert!(RosterDirectory::from_reader(csv.as_bytes()).is_err());
    }

    #[test]
    fn only_roster_electees_may_complete_the_survey() {
        let directory = Arc::new(RosterDirectory::sample());
        let permissions = RosterPermissions::new(SAMPLE_MANAGERS, directory);

        assert!(permissions.can_complete_electee_survey(&MemberId::from("mkim")));
        assert!(!permissions.can_complete_electee_survey(&MemberId::from("avp")));
        assert!(permissions.can_manage_electee_progress(&MemberId::from("AVP")));
    }

    #[test]
    fn calendar_resolves_only_the_current_term() {
        let calendar = FixedTermCalendar::new(4, "Fall 2026");
        assert_eq!(calendar.current_term().expect("term").label, "Fall 2026");
        assert!(calendar.term(TermId(5)).expect("lookup").is_none());
    }

    #[test]
    fn build_portal_seeds_resource_types() {
        let config = PortalConfig {
            current_term_id: 4,
            current_term_label: "Fall 2026".to_string(),
            roster_csv: None,
            managers: BTreeSet::new(),
        };
        let (portal, storage) = build_portal(&config).expect("portal builds");

        let types = portal.resources.resource_types().expect("types");
        assert_eq!(types.len(), DEFAULT_RESOURCE_TYPES.len());
        assert!(types.iter().any(|kind| kind.is_packet));
        assert!(storage.keys().is_empty());
    }
}

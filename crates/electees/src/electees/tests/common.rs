use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use serde_json::Value;

use crate::electees::domain::{MemberId, MemberProfile, MemberStatus, Standing, Term, TermId};
use crate::electees::memory::InMemoryElecteeRepository;
use crate::electees::page::RenderedPage;
use crate::electees::portal::{Collaborators, ElecteePortal};
use crate::electees::repository::{
    MemberDirectory, PermissionOracle, RepositoryError, ResourceStorage, TermResolver,
};
use crate::electees::router::{SESSION_HEADER, USER_HEADER};

pub(super) const MANAGER: &str = "dana";
pub(super) const UNDERGRAD: &str = "alice";
pub(super) const GRADUATE: &str = "carol";
pub(super) const OUTSIDER: &str = "erin";

pub(super) fn term() -> Term {
    Term {
        id: TermId(7),
        label: "Fall 2026".to_string(),
    }
}

pub(super) fn other_term() -> Term {
    Term {
        id: TermId(8),
        label: "Winter 2027".to_string(),
    }
}

pub(super) fn member(uniqname: &str) -> MemberId {
    MemberId::from(uniqname)
}

fn profile(
    uniqname: &str,
    first_name: &str,
    last_name: &str,
    standing: Standing,
    status: MemberStatus,
) -> MemberProfile {
    MemberProfile {
        uniqname: member(uniqname),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        standing,
        status,
    }
}

pub(super) struct FixedTerms {
    terms: Vec<Term>,
}

impl TermResolver for FixedTerms {
    fn current_term(&self) -> Result<Term, RepositoryError> {
        self.terms.first().cloned().ok_or(RepositoryError::NotFound)
    }

    fn term(&self, id: TermId) -> Result<Option<Term>, RepositoryError> {
        Ok(self.terms.iter().find(|term| term.id == id).cloned())
    }
}

pub(super) struct StaticPermissions {
    managers: HashSet<MemberId>,
    survey_takers: HashSet<MemberId>,
}

impl PermissionOracle for StaticPermissions {
    fn can_manage_electee_progress(&self, user: &MemberId) -> bool {
        self.managers.contains(user)
    }

    fn can_complete_electee_survey(&self, user: &MemberId) -> bool {
        self.survey_takers.contains(user)
    }
}

pub(super) struct StaticDirectory {
    members: Vec<MemberProfile>,
}

impl MemberDirectory for StaticDirectory {
    fn member(&self, uniqname: &MemberId) -> Result<Option<MemberProfile>, RepositoryError> {
        Ok(self
            .members
            .iter()
            .find(|profile| &profile.uniqname == uniqname)
            .cloned())
    }

    fn electees(&self, _term: &Term) -> Result<Vec<MemberProfile>, RepositoryError> {
        Ok(self
            .members
            .iter()
            .filter(|profile| profile.is_electee())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryStorage {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub(super) fn keys(&self) -> Vec<String> {
        self.files
            .lock()
            .expect("storage mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl ResourceStorage for MemoryStorage {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), RepositoryError> {
        self.files
            .lock()
            .expect("storage mutex poisoned")
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), RepositoryError> {
        self.files
            .lock()
            .expect("storage mutex poisoned")
            .remove(key);
        Ok(())
    }
}

pub(super) struct Fixture {
    pub(super) portal: Arc<ElecteePortal<InMemoryElecteeRepository>>,
    pub(super) repository: Arc<InMemoryElecteeRepository>,
    pub(super) storage: Arc<MemoryStorage>,
}

pub(super) fn fixture() -> Fixture {
    let repository = Arc::new(InMemoryElecteeRepository::new());
    let storage = Arc::new(MemoryStorage::default());
    let directory = StaticDirectory {
        members: vec![
            profile("alice", "Alice", "Adams", Standing::Undergraduate, MemberStatus::Electee),
            profile("bob", "Bob", "Baker", Standing::Undergraduate, MemberStatus::Electee),
            profile("carol", "Carol", "Chen", Standing::Graduate, MemberStatus::Electee),
            profile("dana", "Dana", "Diaz", Standing::Graduate, MemberStatus::Active),
            profile("erin", "Erin", "Evans", Standing::Undergraduate, MemberStatus::Active),
        ],
    };
    let permissions = StaticPermissions {
        managers: [member(MANAGER)].into_iter().collect(),
        survey_takers: ["alice", "bob", "carol", "dana"]
            .into_iter()
            .map(member)
            .collect(),
    };
    let collaborators = Collaborators {
        terms: Arc::new(FixedTerms {
            terms: vec![term(), other_term()],
        }),
        permissions: Arc::new(permissions),
        directory: Arc::new(directory),
        storage: storage.clone(),
    };
    let portal = Arc::new(ElecteePortal::new(repository.clone(), collaborators));
    Fixture {
        portal,
        repository,
        storage,
    }
}

pub(super) fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    with_user(Request::get(uri), user)
        .body(Body::empty())
        .expect("request builds")
}

pub(super) fn post_json(uri: &str, user: Option<&str>, payload: &Value) -> Request<Body> {
    with_user(Request::post(uri), user)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

pub(super) fn post_form(uri: &str, user: Option<&str>, body: &str) -> Request<Body> {
    with_user(Request::post(uri), user)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

pub(super) fn with_user(
    builder: axum::http::request::Builder,
    user: Option<&str>,
) -> axum::http::request::Builder {
    match user {
        Some(user) => builder
            .header(USER_HEADER, user)
            .header(SESSION_HEADER, format!("session-{user}")),
        None => builder,
    }
}

pub(super) async fn read_page(response: Response) -> RenderedPage {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("rendered page json")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("redirect location")
}

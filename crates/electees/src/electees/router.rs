use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, JsonRejection},
        FromRequestParts, Multipart, Path, State,
    },
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use super::access::{Access, Capability, Viewer};
use super::background::{failure_message, BackgroundSubmission};
use super::domain::{MemberId, QuestionId, ResourceId, ResourceTypeId, Term, TermId};
use super::groups::{GroupRow, PointsRow};
use super::page::{RenderedPage, FORMSET_TEMPLATE, FORM_TEMPLATE};
use super::portal::{ElecteePortal, PortalError};
use super::repository::ElecteeRepository;
use super::resources::{ResourceFields, ResourceRow, Upload};
use super::rows::{FieldErrors, NON_FIELD};
use super::survey::{PartRow, QuestionRow, SurveyFields};
use crate::error::AppError;

pub const OVERVIEW_PATH: &str = "/electees/";
pub const MANAGE_SURVEY_PATH: &str = "/electees/survey";
pub const MEMBERSHIP_PATH: &str = "/electees/groups/membership";

/// Header carrying the uniqname established by the authentication proxy.
pub const USER_HEADER: &str = "x-portal-user";
/// Header keying the caller's flash slot.
pub const SESSION_HEADER: &str = "x-portal-session";

const INVALID_FORM: &str = "Form is invalid. Please correct the noted errors.";
const ELECTEES_BASE: &str = "electees/base_electees.html";

type Portal<R> = Arc<ElecteePortal<R>>;

/// Router exposing every electee page under `/electees`.
pub fn electee_router<R>(portal: Portal<R>) -> Router
where
    R: ElecteeRepository + 'static,
{
    Router::new()
        .route("/electees", get(view_groups::<R>))
        .route(OVERVIEW_PATH, get(view_groups::<R>))
        .route(
            "/electees/groups/edit",
            get(edit_groups_page::<R>).post(edit_groups::<R>),
        )
        .route(
            MEMBERSHIP_PATH,
            get(membership_page::<R>).post(edit_membership::<R>),
        )
        .route(
            "/electees/groups/points",
            get(points_page::<R>).post(edit_points::<R>),
        )
        .route(
            "/electees/background",
            get(background_page::<R>).post(submit_background::<R>),
        )
        .route(
            "/electees/resources",
            get(resources_page::<R>).post(edit_resources::<R>),
        )
        .route(MANAGE_SURVEY_PATH, get(manage_survey::<R>))
        .route("/electees/survey/edit", get(edit_survey_current::<R>))
        .route(
            "/electees/survey/edit/:term_id",
            get(edit_survey_page::<R>).post(edit_survey::<R>),
        )
        .route(
            "/electees/survey/parts",
            get(parts_page::<R>).post(edit_parts::<R>),
        )
        .route(
            "/electees/survey/questions",
            get(questions_page::<R>).post(edit_questions::<R>),
        )
        .route(
            "/electees/survey/questions/add",
            get(add_questions_current::<R>),
        )
        .route(
            "/electees/survey/questions/add/:term_id",
            get(add_questions_page::<R>).post(add_questions::<R>),
        )
        .route("/electees/survey/preview", get(preview_current::<R>))
        .route("/electees/survey/preview/:term_id", get(preview::<R>))
        .route("/electees/survey/complete", get(complete_current::<R>))
        .route(
            "/electees/survey/complete/:term_id",
            get(complete_page::<R>).post(complete_survey::<R>),
        )
        .with_state(portal)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(viewer_from_headers(&parts.headers))
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub(crate) fn viewer_from_headers(headers: &HeaderMap) -> Viewer {
    let mut viewer = match header_value(headers, USER_HEADER) {
        Some(user) => Viewer::member(user),
        None => Viewer::anonymous(),
    };
    if let Some(session) = header_value(headers, SESSION_HEADER) {
        viewer.session = session.to_string();
    }
    viewer
}

fn respond(handler: impl FnOnce() -> Result<Response, PortalError>) -> Response {
    handler().unwrap_or_else(failure)
}

fn failure(err: PortalError) -> Response {
    if let PortalError::Repository(source) = &err {
        error!(error = %source, "electee request failed");
    }
    AppError::from(err).into_response()
}

/// `None` when the viewer holds the capability, otherwise the redirect that
/// reports the denial.
fn authorize<R>(
    portal: &ElecteePortal<R>,
    viewer: &Viewer,
    capability: Capability,
    action: &str,
) -> Option<Response> {
    match portal.gate.check(viewer, capability) {
        Access::Granted => None,
        Access::Denied(_) => {
            info!(user = ?viewer.uniqname, ?capability, "electee action denied");
            portal
                .flash
                .error(&viewer.session, format!("You are not authorized to {action}."));
            Some(Redirect::to(OVERVIEW_PATH).into_response())
        }
    }
}

/// Like [`authorize`], for actions performed on the caller's own behalf.
fn authorize_member<R>(
    portal: &ElecteePortal<R>,
    viewer: &Viewer,
    capability: Capability,
    action: &str,
) -> Result<MemberId, Response> {
    if let Some(denied) = authorize(portal, viewer, capability, action) {
        return Err(denied);
    }
    viewer
        .uniqname
        .clone()
        .ok_or_else(|| Redirect::to(OVERVIEW_PATH).into_response())
}

fn saved<R>(portal: &ElecteePortal<R>, viewer: &Viewer, message: &str, to: &str) -> Response {
    portal.flash.success(&viewer.session, message);
    Redirect::to(to).into_response()
}

/// Run `action` on a body that could be read. An unreadable body fails
/// validation like any other bad input, so it is redisplayed rather than
/// answered with a bare rejection.
fn with_body<T, E, O>(
    body: &Result<T, E>,
    action: impl FnOnce(&T) -> Result<O, PortalError>,
) -> Result<O, PortalError>
where
    E: fmt::Display,
{
    match body {
        Ok(value) => action(value),
        Err(rejection) => {
            let mut errors = FieldErrors::new();
            errors.add(NON_FIELD, format!("The submission could not be read: {rejection}"));
            Err(errors.into())
        }
    }
}

fn formset_page(prefix: &str, form_title: String, submit_name: &str, help_text: &str) -> RenderedPage {
    RenderedPage::new(FORMSET_TEMPLATE)
        .with("prefix", prefix)
        .with("form_title", form_title)
        .with("submit_name", submit_name)
        .with("help_text", help_text)
        .with("has_files", false)
        .with("can_add_row", true)
        .with("base", ELECTEES_BASE)
}

fn survey_back_button() -> serde_json::Value {
    json!({ "link": MANAGE_SURVEY_PATH, "text": "To Survey Manager" })
}

async fn view_groups<R>(State(portal): State<Portal<R>>, viewer: Viewer) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ViewProgress, "view electee teams") {
        return denied;
    }
    respond(|| {
        let term = portal.current_term()?;
        let listing = portal.resources.listing(&term)?;
        Ok(RenderedPage::new("electees/view_electee_groups.html")
            .with("term", &term)
            .with("groups", portal.groups.groups(&term)?)
            .with("packets", listing.packets)
            .with("resources", listing.resources)
            .with("permissions", portal.gate.flags(&viewer))
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

fn groups_formset<R>(portal: &ElecteePortal<R>, viewer: &Viewer) -> RenderedPage {
    formset_page(
        "groups",
        "Update/Add/Remove Electee Teams".to_string(),
        "Update Electee Teams",
        "Create the electee teams for this semester, and specify the leaders and officers. You can also remove or edit here.",
    )
    .with("subsubnav", "groups")
    .with("permissions", portal.gate.flags(viewer))
}

async fn edit_groups_page<R>(State(portal): State<Portal<R>>, viewer: Viewer) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit electee teams") {
        return denied;
    }
    respond(|| {
        let term = portal.current_term()?;
        let rows: Vec<GroupRow> = portal
            .groups
            .groups(&term)?
            .iter()
            .map(|group| GroupRow::existing(group.id, group.into()))
            .collect();
        Ok(groups_formset(&portal, &viewer)
            .with("term", &term)
            .with("rows", rows)
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

async fn edit_groups<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    body: Result<Json<Vec<GroupRow>>, JsonRejection>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit electee teams") {
        return denied;
    }
    let rows = body.map(|Json(rows)| rows);
    respond(|| {
        let term = portal.current_term()?;
        match with_body(&rows, |rows| portal.groups.edit_groups(&term, rows)) {
            Ok(_) => Ok(saved(&portal, &viewer, "Electee teams successfully updated.", OVERVIEW_PATH)),
            Err(PortalError::Invalid(errors)) => Ok(groups_formset(&portal, &viewer)
                .with("term", &term)
                .rejected(&errors, rows.as_ref().ok(), INVALID_FORM)),
            Err(err) => Err(err),
        }
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct MembershipForm {
    #[serde(default)]
    electee_groups: String,
}

fn membership_view<R>(
    portal: &ElecteePortal<R>,
    viewer: &Viewer,
    term: &Term,
) -> Result<RenderedPage, PortalError>
where
    R: ElecteeRepository + 'static,
{
    let overview = portal.groups.membership(term)?;
    Ok(RenderedPage::new("electees/edit_electee_group_membership.html")
        .with("term", term)
        .with("electee_groups", overview.groups)
        .with("unassigned_electees", overview.unassigned_electees)
        .with("subsubnav", "members")
        .with("permissions", portal.gate.flags(viewer)))
}

async fn membership_page<R>(State(portal): State<Portal<R>>, viewer: Viewer) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit electee teams") {
        return denied;
    }
    respond(|| {
        let term = portal.current_term()?;
        Ok(membership_view(&portal, &viewer, &term)?
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

async fn edit_membership<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    body: Result<Form<MembershipForm>, FormRejection>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit electee teams") {
        return denied;
    }
    let form = body.map(|Form(form)| form);
    respond(|| {
        let term = portal.current_term()?;
        match with_body(&form, |form| portal.groups.replace_memberships(&term, &form.electee_groups)) {
            Ok(_) => Ok(saved(&portal, &viewer, "Your changes have been saved.", MEMBERSHIP_PATH)),
            Err(PortalError::Invalid(errors)) => Ok(membership_view(&portal, &viewer, &term)?
                .rejected(
                    &errors,
                    form.as_ref().ok(),
                    "Team membership was not saved. Please correct the noted errors.",
                )),
            Err(err) => Err(err),
        }
    })
}

fn points_formset<R>(
    portal: &ElecteePortal<R>,
    viewer: &Viewer,
    term: &Term,
) -> Result<RenderedPage, PortalError>
where
    R: ElecteeRepository + 'static,
{
    Ok(formset_page(
        "group_points",
        "Update/Add/Remove Electee Team Points".to_string(),
        "Update Electee Team Points",
        "Track the electee team points. Points from participation at service or social events are tabulated automatically and are not listed here.",
    )
    .with("subsubnav", "points")
    .with("term", term)
    .with("electee_groups", portal.groups.groups(term)?)
    .with("permissions", portal.gate.flags(viewer)))
}

async fn points_page<R>(State(portal): State<Portal<R>>, viewer: Viewer) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit electee team points") {
        return denied;
    }
    respond(|| {
        let term = portal.current_term()?;
        let rows: Vec<PointsRow> = portal
            .groups
            .manual_events(&term)?
            .iter()
            .map(|event| PointsRow::existing(event.id, event.into()))
            .collect();
        Ok(points_formset(&portal, &viewer, &term)?
            .with("rows", rows)
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

async fn edit_points<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    body: Result<Json<Vec<PointsRow>>, JsonRejection>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit electee team points") {
        return denied;
    }
    let rows = body.map(|Json(rows)| rows);
    respond(|| {
        let term = portal.current_term()?;
        match with_body(&rows, |rows| portal.groups.edit_points(&term, rows)) {
            Ok(_) => Ok(saved(
                &portal,
                &viewer,
                "Electee team points updated successfully.",
                OVERVIEW_PATH,
            )),
            Err(PortalError::Invalid(errors)) => Ok(points_formset(&portal, &viewer, &term)?
                .rejected(&errors, rows.as_ref().ok(), INVALID_FORM)),
            Err(err) => Err(err),
        }
    })
}

const BACKGROUND_ACTION: &str = "submit an educational background form";

fn background_view<R>(portal: &ElecteePortal<R>, viewer: &Viewer, term: &Term) -> RenderedPage {
    RenderedPage::new("electees/submit_education_form.html")
        .with("term", term)
        .with("prefix", "institute")
        .with("dp_ids_dyn", ["degree_start_date", "degree_end_date"])
        .with("permissions", portal.gate.flags(viewer))
}

async fn background_page<R>(State(portal): State<Portal<R>>, viewer: Viewer) -> Response
where
    R: ElecteeRepository + 'static,
{
    let member = match authorize_member(&portal, &viewer, Capability::SubmitBackground, BACKGROUND_ACTION) {
        Ok(member) => member,
        Err(denied) => return denied,
    };
    respond(|| {
        let term = portal.current_term()?;
        let loaded = portal.background.load(&member, &term)?;
        Ok(background_view(&portal, &viewer, &term)
            .with("form", loaded.form)
            .with("background", loaded.submission.background)
            .with("institute", loaded.submission.institute)
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

async fn submit_background<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    body: Result<Json<BackgroundSubmission>, JsonRejection>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    let member = match authorize_member(&portal, &viewer, Capability::SubmitBackground, BACKGROUND_ACTION) {
        Ok(member) => member,
        Err(denied) => return denied,
    };
    let submission = body.map(|Json(submission)| submission);
    respond(|| {
        let term = portal.current_term()?;
        match with_body(&submission, |submission| portal.background.submit(&member, &term, submission)) {
            Ok(_) => Ok(saved(
                &portal,
                &viewer,
                "Background form submitted successfully.",
                OVERVIEW_PATH,
            )),
            Err(PortalError::Invalid(errors)) => Ok(background_view(&portal, &viewer, &term)
                .rejected(&errors, submission.as_ref().ok(), failure_message(&errors))),
            Err(err) => Err(err),
        }
    })
}

fn resources_formset<R>(
    portal: &ElecteePortal<R>,
    viewer: &Viewer,
    term: &Term,
) -> Result<RenderedPage, PortalError>
where
    R: ElecteeRepository + 'static,
{
    Ok(formset_page(
        "resources",
        format!("Update/Add/Remove Electee Resources for {term}"),
        "Update Electee Resources",
        "These are the full packets and their constituent parts. If you need a part that isn't listed here, contact the web chair.",
    )
    .with("has_files", true)
    .with("term", term)
    .with("resource_types", portal.resources.resource_types()?)
    .with("permissions", portal.gate.flags(viewer)))
}

async fn resources_page<R>(State(portal): State<Portal<R>>, viewer: Viewer) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit electee resources") {
        return denied;
    }
    respond(|| {
        let term = portal.current_term()?;
        let resources = portal.resources.resources(&term)?;
        let rows: Vec<ResourceRow> = resources
            .iter()
            .map(|resource| ResourceRow::existing(resource.id, resource.into()))
            .collect();
        Ok(resources_formset(&portal, &viewer, &term)?
            .with("rows", rows)
            .with("attachments", resources.iter().map(|resource| &resource.attachment).collect::<Vec<_>>())
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

async fn edit_resources<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    body: Result<Multipart, MultipartRejection>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit electee resources") {
        return denied;
    }
    let rows = match body {
        Ok(mut multipart) => resource_rows(&mut multipart).await.map_err(|err| {
            warn!(error = %err, "rejected malformed resource upload");
            err.to_string()
        }),
        Err(rejection) => Err(rejection.to_string()),
    };
    respond(|| {
        let term = portal.current_term()?;
        match with_body(&rows, |rows| portal.resources.edit(&term, rows)) {
            Ok(_) => Ok(saved(
                &portal,
                &viewer,
                "Electee resources updated successfully.",
                OVERVIEW_PATH,
            )),
            Err(PortalError::Invalid(errors)) => Ok(resources_formset(&portal, &viewer, &term)?
                .rejected(&errors, rows.as_ref().ok(), INVALID_FORM)),
            Err(err) => Err(err),
        }
    })
}

#[derive(Debug, thiserror::Error)]
enum UploadError {
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("field `{name}` has an invalid value")]
    InvalidValue { name: String },
}

/// Collect `resources-{n}-{field}` multipart fields into rows ordered by `n`.
async fn resource_rows(multipart: &mut Multipart) -> Result<Vec<ResourceRow>, UploadError> {
    let mut rows: BTreeMap<usize, ResourceRow> = BTreeMap::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let Some((index, key)) = name
            .strip_prefix("resources-")
            .and_then(|rest| rest.split_once('-'))
            .and_then(|(index, key)| Some((index.parse::<usize>().ok()?, key.to_string())))
        else {
            continue;
        };
        let row = rows
            .entry(index)
            .or_insert_with(|| ResourceRow::added(ResourceFields::default()));

        match key.as_str() {
            "attachment" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                if !file_name.is_empty() || !bytes.is_empty() {
                    row.fields.upload = Some(Upload::new(file_name, bytes.to_vec()));
                }
            }
            "id" => {
                let value = field.text().await?;
                let value = value.trim();
                if !value.is_empty() {
                    let id = value
                        .parse::<u64>()
                        .map_err(|_| UploadError::InvalidValue { name: name.clone() })?;
                    row.id = Some(ResourceId(id));
                }
            }
            "delete" | "DELETE" => {
                let value = field.text().await?;
                row.delete = matches!(value.trim(), "on" | "true" | "1");
            }
            "resource_type" => {
                let value = field.text().await?;
                row.fields.resource_type = value.trim().parse::<u64>().ok().map(ResourceTypeId);
            }
            _ => {}
        }
    }

    Ok(rows.into_values().collect())
}

async fn manage_survey<R>(State(portal): State<Portal<R>>, viewer: Viewer) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit the electee survey") {
        return denied;
    }
    respond(|| {
        let term = portal.current_term()?;
        let status = portal.survey.status(&term)?;
        Ok(RenderedPage::new("electees/manage_survey.html")
            .with("term", &term)
            .with("survey_exists", status.survey_exists)
            .with("parts_exist", status.parts_exist)
            .with("questions_exist", status.questions_exist)
            .with("survey_has_questions", status.survey_has_questions)
            .with("permissions", portal.gate.flags(&viewer))
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

/// Redirect a current-term convenience route to its term-scoped variant.
fn to_current_term<R>(portal: &ElecteePortal<R>, prefix: &str) -> Response
where
    R: ElecteeRepository + 'static,
{
    respond(|| {
        let term = portal.current_term()?;
        Ok(Redirect::to(&format!("{prefix}/{}", term.id)).into_response())
    })
}

async fn edit_survey_current<R>(State(portal): State<Portal<R>>) -> Response
where
    R: ElecteeRepository + 'static,
{
    to_current_term(&portal, "/electees/survey/edit")
}

fn survey_form<R>(
    portal: &ElecteePortal<R>,
    viewer: &Viewer,
    term: &Term,
) -> Result<(RenderedPage, SurveyFields), PortalError>
where
    R: ElecteeRepository + 'static,
{
    let survey = portal.survey.survey(term)?;
    let verb = if survey.is_some() { "Update" } else { "Add" };
    let page = RenderedPage::new(FORM_TEMPLATE)
        .with("term", term)
        .with("form_title", format!("{verb} Electee Interview Survey for {term}"))
        .with("submit_name", "Update Electee Survey")
        .with(
            "help_text",
            "This is the survey that groups the questions for a particular term.",
        )
        .with("back_button", survey_back_button())
        .with("base", ELECTEES_BASE)
        .with("permissions", portal.gate.flags(viewer));
    let fields = survey.as_ref().map(SurveyFields::from).unwrap_or_default();
    Ok((page, fields))
}

async fn edit_survey_page<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    Path(term_id): Path<u32>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit the electee survey") {
        return denied;
    }
    respond(|| {
        let term = portal.term(TermId(term_id))?;
        let (page, fields) = survey_form(&portal, &viewer, &term)?;
        Ok(page
            .with("form", fields)
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

async fn edit_survey<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    Path(term_id): Path<u32>,
    body: Result<Json<SurveyFields>, JsonRejection>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit the electee survey") {
        return denied;
    }
    let fields = body.map(|Json(fields)| fields);
    respond(|| {
        let term = portal.term(TermId(term_id))?;
        match with_body(&fields, |fields| portal.survey.save_survey(&term, fields)) {
            Ok(_) => Ok(saved(
                &portal,
                &viewer,
                "Electee interview survey updated successfully.",
                MANAGE_SURVEY_PATH,
            )),
            Err(PortalError::Invalid(errors)) => {
                let (page, _) = survey_form(&portal, &viewer, &term)?;
                Ok(page.rejected(&errors, fields.as_ref().ok(), INVALID_FORM))
            }
            Err(err) => Err(err),
        }
    })
}

fn parts_formset<R>(portal: &ElecteePortal<R>, viewer: &Viewer) -> RenderedPage {
    formset_page(
        "parts",
        "Update Electee Interview Survey Parts".to_string(),
        "Update Electee Survey Parts",
        "Add or edit the parts of the survey. Only parts with questions in a given survey are shown in that survey. Leave the all-required field blank unless every question in the part must be answered.",
    )
    .with("back_button", survey_back_button())
    .with("permissions", portal.gate.flags(viewer))
}

async fn parts_page<R>(State(portal): State<Portal<R>>, viewer: Viewer) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit the electee survey") {
        return denied;
    }
    respond(|| {
        let rows: Vec<PartRow> = portal
            .survey
            .parts()?
            .iter()
            .map(|part| PartRow::existing(part.id, part.into()))
            .collect();
        Ok(parts_formset(&portal, &viewer)
            .with("rows", rows)
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

async fn edit_parts<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    body: Result<Json<Vec<PartRow>>, JsonRejection>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit the electee survey") {
        return denied;
    }
    let rows = body.map(|Json(rows)| rows);
    respond(|| match with_body(&rows, |rows| portal.survey.edit_parts(rows)) {
        Ok(_) => Ok(saved(
            &portal,
            &viewer,
            "Electee interview survey parts updated successfully.",
            MANAGE_SURVEY_PATH,
        )),
        Err(PortalError::Invalid(errors)) => {
            Ok(parts_formset(&portal, &viewer).rejected(&errors, rows.as_ref().ok(), INVALID_FORM))
        }
        Err(err) => Err(err),
    })
}

fn questions_formset<R>(
    portal: &ElecteePortal<R>,
    viewer: &Viewer,
) -> Result<RenderedPage, PortalError>
where
    R: ElecteeRepository + 'static,
{
    Ok(formset_page(
        "questions",
        "Update Electee Interview Survey Questions".to_string(),
        "Update Electee Survey Questions",
        "Add or edit the survey questions. Questions are only displayed once they are added to a term's survey. Leave the word limit blank for unlimited answers.",
    )
    .with("parts", portal.survey.parts()?)
    .with("back_button", survey_back_button())
    .with("permissions", portal.gate.flags(viewer)))
}

async fn questions_page<R>(State(portal): State<Portal<R>>, viewer: Viewer) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit the electee survey") {
        return denied;
    }
    respond(|| {
        let rows: Vec<QuestionRow> = portal
            .survey
            .questions()?
            .iter()
            .map(|question| QuestionRow::existing(question.id, question.into()))
            .collect();
        Ok(questions_formset(&portal, &viewer)?
            .with("rows", rows)
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

async fn edit_questions<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    body: Result<Json<Vec<QuestionRow>>, JsonRejection>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit the electee survey") {
        return denied;
    }
    let rows = body.map(|Json(rows)| rows);
    respond(|| match with_body(&rows, |rows| portal.survey.edit_questions(rows)) {
        Ok(_) => Ok(saved(
            &portal,
            &viewer,
            "Electee interview survey questions updated successfully.",
            MANAGE_SURVEY_PATH,
        )),
        Err(PortalError::Invalid(errors)) => Ok(questions_formset(&portal, &viewer)?
            .rejected(&errors, rows.as_ref().ok(), INVALID_FORM)),
        Err(err) => Err(err),
    })
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QuestionSelection {
    #[serde(default)]
    questions: Vec<QuestionId>,
}

async fn add_questions_current<R>(State(portal): State<Portal<R>>) -> Response
where
    R: ElecteeRepository + 'static,
{
    to_current_term(&portal, "/electees/survey/questions/add")
}

fn add_questions_form<R>(
    portal: &ElecteePortal<R>,
    viewer: &Viewer,
    term: &Term,
) -> Result<(RenderedPage, QuestionSelection), PortalError>
where
    R: ElecteeRepository + 'static,
{
    let survey = portal.survey.require_survey(term)?;
    let verb = if survey.questions.is_empty() { "Add" } else { "Update" };
    let page = RenderedPage::new(FORM_TEMPLATE)
        .with("term", term)
        .with("form_title", format!("{verb} Electee Survey Questions for {term}"))
        .with("submit_name", "Update Electee Survey Questions")
        .with("help_text", "Add questions for the particular term's survey.")
        .with("choices", portal.survey.questions()?)
        .with("back_button", survey_back_button())
        .with("base", ELECTEES_BASE)
        .with("permissions", portal.gate.flags(viewer));
    Ok((
        page,
        QuestionSelection {
            questions: survey.questions,
        },
    ))
}

async fn add_questions_page<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    Path(term_id): Path<u32>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit the electee survey") {
        return denied;
    }
    respond(|| {
        let term = portal.term(TermId(term_id))?;
        let (page, selection) = add_questions_form(&portal, &viewer, &term)?;
        Ok(page
            .with("form", selection)
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

async fn add_questions<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    Path(term_id): Path<u32>,
    body: Result<Json<QuestionSelection>, JsonRejection>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "edit the electee survey") {
        return denied;
    }
    let selection = body.map(|Json(selection)| selection);
    respond(|| {
        let term = portal.term(TermId(term_id))?;
        match with_body(&selection, |selection| {
            portal.survey.attach_questions(&term, &selection.questions)
        }) {
            Ok(_) => Ok(saved(
                &portal,
                &viewer,
                "Electee survey questions updated successfully.",
                MANAGE_SURVEY_PATH,
            )),
            Err(PortalError::Invalid(errors)) => {
                let (page, _) = add_questions_form(&portal, &viewer, &term)?;
                Ok(page.rejected(&errors, selection.as_ref().ok(), INVALID_FORM))
            }
            Err(err) => Err(err),
        }
    })
}

async fn preview_current<R>(State(portal): State<Portal<R>>) -> Response
where
    R: ElecteeRepository + 'static,
{
    to_current_term(&portal, "/electees/survey/preview")
}

async fn preview<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    Path(term_id): Path<u32>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    if let Some(denied) = authorize(&portal, &viewer, Capability::ManageProgress, "preview the electee survey") {
        return denied;
    }
    respond(|| {
        let term = portal.term(TermId(term_id))?;
        let preview = portal.survey.preview(&term)?;
        Ok(RenderedPage::new("electees/preview_survey.html")
            .with("term", &term)
            .with("survey", preview.survey)
            .with("sections", preview.sections)
            .with("permissions", portal.gate.flags(&viewer))
            .into_response())
    })
}

async fn complete_current<R>(State(portal): State<Portal<R>>) -> Response
where
    R: ElecteeRepository + 'static,
{
    to_current_term(&portal, "/electees/survey/complete")
}

const COMPLETE_ACTION: &str = "complete the electee survey";

fn completion_view<R>(
    portal: &ElecteePortal<R>,
    viewer: &Viewer,
    term: &Term,
    member: &MemberId,
) -> Result<RenderedPage, PortalError>
where
    R: ElecteeRepository + 'static,
{
    let completion = portal.survey.completion(term, member)?;
    Ok(RenderedPage::new("electees/complete_survey.html")
        .with("term", term)
        .with("survey", completion.survey)
        .with("sections", completion.sections)
        .with("fields", completion.schema)
        .with("initial", completion.initial)
        .with("missing_required", completion.missing_required)
        .with("permissions", portal.gate.flags(viewer)))
}

async fn complete_page<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    Path(term_id): Path<u32>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    let member = match authorize_member(&portal, &viewer, Capability::CompleteSurvey, COMPLETE_ACTION) {
        Ok(member) => member,
        Err(denied) => return denied,
    };
    respond(|| {
        let term = portal.term(TermId(term_id))?;
        Ok(completion_view(&portal, &viewer, &term, &member)?
            .message(portal.flash.take(&viewer.session))
            .into_response())
    })
}

async fn complete_survey<R>(
    State(portal): State<Portal<R>>,
    viewer: Viewer,
    Path(term_id): Path<u32>,
    body: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response
where
    R: ElecteeRepository + 'static,
{
    let member = match authorize_member(&portal, &viewer, Capability::CompleteSurvey, COMPLETE_ACTION) {
        Ok(member) => member,
        Err(denied) => return denied,
    };
    let data = body.map(|Form(data)| data);
    respond(|| {
        let term = portal.term(TermId(term_id))?;
        match with_body(&data, |data| portal.survey.complete(&term, &member, data)) {
            Ok(_) => Ok(saved(
                &portal,
                &viewer,
                "Electee survey updated successfully.",
                OVERVIEW_PATH,
            )),
            Err(PortalError::Invalid(errors)) => Ok(completion_view(&portal, &viewer, &term, &member)?
                .rejected(&errors, data.as_ref().ok(), INVALID_FORM)),
            Err(err) => Err(err),
        }
    })
}

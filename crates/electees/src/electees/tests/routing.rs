use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;

use crate::electees::background::ROW_ERRORS_MESSAGE;
use crate::electees::domain::{QuestionId, ResourceTypeId};
use crate::electees::flash::{Flash, FlashKind};
use crate::electees::groups::{GroupFields, GroupRow};
use crate::electees::repository::ElecteeRepository;
use crate::electees::rows::NON_FIELD;
use crate::electees::router::{electee_router, SESSION_HEADER, USER_HEADER};
use crate::electees::survey::{PartFields, PartRow, QuestionFields, QuestionRow, SurveyFields};

const BOUNDARY: &str = "electee-boundary";

fn router(fixture: &Fixture) -> Router {
    electee_router(fixture.portal.clone())
}

fn multipart(uri: &str, user: Option<&str>, resource_type: ResourceTypeId, file_name: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"resources-0-resource_type\"\r\n\r\n\
         {resource_type}\r\n\
         --{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"resources-0-attachment\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/pdf\r\n\r\n\
         %PDF-1.4 packet\r\n\
         --{BOUNDARY}--\r\n"
    );
    with_user(Request::post(uri), user)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request builds")
}

fn raw_post(uri: &str, user: Option<&str>, content_type: &str, body: &str) -> Request<Body> {
    with_user(Request::post(uri), user)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

/// Replay the caller's identity headers on a follow-up overview request.
fn overview_as(request: &Request<Body>) -> Request<Body> {
    let mut follow_up = Request::get("/electees/");
    for name in [USER_HEADER, SESSION_HEADER] {
        if let Some(value) = request.headers().get(name) {
            follow_up = follow_up.header(name, value.clone());
        }
    }
    follow_up.body(Body::empty()).expect("request builds")
}

/// One survey with a single active question; returns the question.
fn seed_survey(fixture: &Fixture) -> QuestionId {
    let service = &fixture.portal.survey;
    service
        .edit_parts(&[PartRow::added(PartFields {
            title: "About you".to_string(),
            number: Some(1),
            instructions: String::new(),
            all_required: None,
        })])
        .expect("part");
    let part = service.parts().expect("parts")[0].id;
    service
        .edit_questions(&[QuestionRow::added(QuestionFields {
            part: Some(part),
            number: Some(1),
            text: "Why HKN?".to_string(),
            max_words: Some(50),
        })])
        .expect("question");
    let question = service.questions().expect("questions")[0].id;
    service
        .save_survey(
            &term(),
            &SurveyFields {
                due_date: NaiveDate::from_ymd_opt(2026, 11, 20),
                instructions: String::new(),
            },
        )
        .expect("survey");
    service.attach_questions(&term(), &[question]).expect("attach");
    question
}

#[tokio::test]
async fn unauthorized_mutations_redirect_with_a_flash_and_change_nothing() {
    let fixture = fixture();
    let router = router(&fixture);

    let attempts: Vec<(Request<Body>, &str)> = vec![
        (
            post_json("/electees/groups/edit", Some(OUTSIDER), &json!([{ "group_name": "Rogue" }])),
            "edit electee teams",
        ),
        (
            post_form("/electees/groups/membership", Some(OUTSIDER), "electee_groups=%7B%7D"),
            "edit electee teams",
        ),
        (
            post_json(
                "/electees/groups/points",
                Some(OUTSIDER),
                &json!([{ "electee_group": 1, "description": "x", "points": 9 }]),
            ),
            "edit electee team points",
        ),
        (
            post_json(
                "/electees/background",
                Some(OUTSIDER),
                &json!({ "background": { "degree_type": "phd", "concentration": "AI" } }),
            ),
            "submit an educational background form",
        ),
        (
            multipart("/electees/resources", Some(OUTSIDER), ResourceTypeId(1), "x.pdf"),
            "edit electee resources",
        ),
        (
            post_json(
                "/electees/survey/edit/7",
                Some(OUTSIDER),
                &json!({ "due_date": "2026-11-20", "instructions": "" }),
            ),
            "edit the electee survey",
        ),
        (
            post_json(
                "/electees/survey/parts",
                Some(OUTSIDER),
                &json!([{ "title": "Rogue", "number": 1 }]),
            ),
            "edit the electee survey",
        ),
        (
            post_json(
                "/electees/survey/questions",
                Some(OUTSIDER),
                &json!([{ "part": 1, "number": 1, "text": "?" }]),
            ),
            "edit the electee survey",
        ),
        (
            post_json("/electees/survey/questions/add/7", Some(OUTSIDER), &json!({ "questions": [] })),
            "edit the electee survey",
        ),
        (
            post_form("/electees/survey/complete/7", Some(OUTSIDER), "question-1=hi"),
            "complete the electee survey",
        ),
        (
            Request::post("/electees/groups/edit")
                .header(SESSION_HEADER, "guest-session")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!([{ "group_name": "Anon" }]).to_string()))
                .expect("request builds"),
            "edit electee teams",
        ),
        (
            raw_post("/electees/groups/edit", Some(OUTSIDER), "application/json", "not json"),
            "edit electee teams",
        ),
        (
            raw_post("/electees/groups/points", Some(OUTSIDER), "text/plain", "points=9"),
            "edit electee team points",
        ),
        (
            raw_post("/electees/groups/membership", Some(OUTSIDER), "application/json", "{}"),
            "edit electee teams",
        ),
        (
            raw_post("/electees/resources", Some(OUTSIDER), "multipart/form-data", "garbage"),
            "edit electee resources",
        ),
        (
            raw_post("/electees/survey/parts", Some(OUTSIDER), "application/json", "{\"title\": 1}"),
            "edit the electee survey",
        ),
        (
            raw_post("/electees/background", Some(OUTSIDER), "application/json", "["),
            "submit an educational background form",
        ),
        (
            raw_post("/electees/survey/complete/7", Some(OUTSIDER), "text/plain", "question-1=hi"),
            "complete the electee survey",
        ),
    ];

    for (request, action) in attempts {
        let uri = request.uri().to_string();
        let follow_up = overview_as(&request);
        let response = router.clone().oneshot(request).await.expect("route executes");
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&response), "/electees/", "{uri}");

        let overview = router
            .clone()
            .oneshot(follow_up)
            .await
            .expect("overview renders");
        let page = read_page(overview).await;
        assert_eq!(
            page.message,
            Some(Flash::error(format!("You are not authorized to {action}."))),
            "{uri}"
        );
    }

    let repository = &fixture.repository;
    assert!(repository.groups_for_term(term().id).expect("groups").is_empty());
    assert!(repository.events_for_term(term().id).expect("events").is_empty());
    assert!(repository.resources_for_term(term().id).expect("resources").is_empty());
    assert!(repository.survey_for_term(term().id).expect("survey").is_none());
    assert!(repository.survey_parts().expect("parts").is_empty());
    assert!(repository.survey_questions().expect("questions").is_empty());
    assert!(repository
        .background_form(&member(OUTSIDER), term().id)
        .expect("form")
        .is_none());
    assert!(fixture.storage.keys().is_empty());
}

#[tokio::test]
async fn overview_reports_permissions_and_clears_the_flash() {
    let fixture = fixture();
    let router = router(&fixture);
    fixture
        .portal
        .groups
        .edit_groups(
            &term(),
            &[GroupRow::added(GroupFields {
                group_name: "Blue".to_string(),
                leaders: vec![member(MANAGER)],
                officers: Vec::new(),
            })],
        )
        .expect("team");
    fixture.portal.flash.success(&format!("session-{MANAGER}"), "Saved");

    let first = read_page(
        router
            .clone()
            .oneshot(get("/electees/", Some(MANAGER)))
            .await
            .expect("overview"),
    )
    .await;
    assert_eq!(first.template, "electees/view_electee_groups.html");
    assert_eq!(first.context["permissions"]["can_create_groups"], true);
    assert_eq!(first.context["groups"][0]["group_name"], "Blue");
    assert_eq!(first.message.map(|flash| flash.kind), Some(FlashKind::Success));

    let second = read_page(
        router
            .oneshot(get("/electees", Some(MANAGER)))
            .await
            .expect("overview"),
    )
    .await;
    assert!(second.message.is_none());
}

#[tokio::test]
async fn membership_form_sets_exact_members() {
    let fixture = fixture();
    fixture
        .portal
        .groups
        .edit_groups(
            &term(),
            &[GroupRow::added(GroupFields {
                group_name: "Blue".to_string(),
                leaders: Vec::new(),
                officers: Vec::new(),
            })],
        )
        .expect("team");
    let group = fixture.portal.groups.groups(&term()).expect("groups")[0].id;

    let body = format!("electee_groups=%7B%22{group}%22%3A%5B%22alice%22%2C%22bob%22%5D%7D");
    let response = router(&fixture)
        .oneshot(post_form("/electees/groups/membership", Some(MANAGER), &body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/electees/groups/membership");
    let members = fixture.portal.groups.groups(&term()).expect("groups")[0]
        .members
        .clone();
    assert_eq!(members, vec![member("alice"), member("bob")]);
}

#[tokio::test]
async fn invalid_rows_are_redisplayed_with_errors_and_input() {
    let fixture = fixture();

    let response = router(&fixture)
        .oneshot(post_json(
            "/electees/groups/edit",
            Some(MANAGER),
            &json!([{ "group_name": "", "leaders": ["ghost"] }]),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let page = read_page(response).await;
    assert_eq!(page.template, "generic_formset.html");
    let row_errors = &page.context["errors"]["rows"]["rows"]["0"];
    assert!(row_errors.get("group_name").is_some());
    assert!(row_errors.get("leaders").is_some());
    assert_eq!(page.context["input"][0]["leaders"][0], "ghost");
    assert_eq!(page.message.map(|flash| flash.kind), Some(FlashKind::Error));
    assert!(fixture.portal.groups.groups(&term()).expect("groups").is_empty());
}

#[tokio::test]
async fn survey_pages_without_a_survey_are_not_found() {
    let fixture = fixture();
    let router = router(&fixture);

    for request in [
        get("/electees/survey/preview/7", Some(MANAGER)),
        get("/electees/survey/questions/add/7", Some(MANAGER)),
        post_json("/electees/survey/questions/add/7", Some(MANAGER), &json!({ "questions": [] })),
        get("/electees/survey/complete/7", Some(UNDERGRAD)),
        get("/electees/survey/edit/99", Some(MANAGER)),
    ] {
        let uri = request.uri().to_string();
        let response = router.clone().oneshot(request).await.expect("route executes");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        let payload = read_json_body(response).await;
        assert!(payload.get("error").is_some(), "{uri}");
    }
    assert!(fixture.portal.survey.survey(&term()).expect("survey").is_none());
}

#[tokio::test]
async fn current_term_routes_redirect_to_the_term() {
    let fixture = fixture();
    let router = router(&fixture);

    for (from, to) in [
        ("/electees/survey/edit", "/electees/survey/edit/7"),
        ("/electees/survey/questions/add", "/electees/survey/questions/add/7"),
        ("/electees/survey/preview", "/electees/survey/preview/7"),
        ("/electees/survey/complete", "/electees/survey/complete/7"),
    ] {
        let response = router
            .clone()
            .oneshot(get(from, Some(MANAGER)))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{from}");
        assert_eq!(location(&response), to);
    }
}

#[tokio::test]
async fn survey_answers_follow_the_submission_lifecycle() {
    let fixture = fixture();
    let question = seed_survey(&fixture);
    let router = router(&fixture);
    let field = format!("question-{question}");
    let stored = || {
        fixture
            .repository
            .answers(term().id, &member(UNDERGRAD), &[question])
            .expect("answers")
    };

    let page = read_page(
        router
            .clone()
            .oneshot(get("/electees/survey/complete/7", Some(UNDERGRAD)))
            .await
            .expect("completion page"),
    )
    .await;
    assert_eq!(page.context["fields"]["fields"][0]["name"], field.as_str());

    let response = router
        .clone()
        .oneshot(post_form(
            "/electees/survey/complete/7",
            Some(UNDERGRAD),
            &format!("{field}=To+serve+others"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/electees/");
    assert_eq!(stored().len(), 1);
    assert_eq!(stored()[0].answer, "To serve others");

    router
        .clone()
        .oneshot(post_form(
            "/electees/survey/complete/7",
            Some(UNDERGRAD),
            &format!("{field}=To+learn"),
        ))
        .await
        .expect("route executes");
    assert_eq!(stored().len(), 1);
    assert_eq!(stored()[0].answer, "To learn");

    router
        .oneshot(post_form("/electees/survey/complete/7", Some(UNDERGRAD), &format!("{field}=")))
        .await
        .expect("route executes");
    assert!(stored().is_empty());
}

#[tokio::test]
async fn preview_renders_the_active_questions() {
    let fixture = fixture();
    let question = seed_survey(&fixture);

    let response = router(&fixture)
        .oneshot(get("/electees/survey/preview/7", Some(MANAGER)))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let page = read_page(response).await;
    assert_eq!(page.template, "electees/preview_survey.html");
    assert_eq!(page.context["sections"][0]["questions"][0]["id"], question.0);
}

#[tokio::test]
async fn background_form_is_for_graduate_members_only() {
    let fixture = fixture();
    let router = router(&fixture);

    let denied = router
        .clone()
        .oneshot(get("/electees/background", Some(UNDERGRAD)))
        .await
        .expect("route executes");
    assert_eq!(denied.status(), StatusCode::SEE_OTHER);

    let page = read_page(
        router
            .clone()
            .oneshot(get("/electees/background", Some(GRADUATE)))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(page.template, "electees/submit_education_form.html");
    assert_eq!(page.context["institute"].as_array().map(Vec::len), Some(1));

    let rejected = router
        .oneshot(post_json(
            "/electees/background",
            Some(GRADUATE),
            &json!({
                "background": { "degree_type": "masters", "concentration": "Controls" },
                "institute": []
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let page = read_page(rejected).await;
    assert_eq!(page.message, Some(Flash::error(ROW_ERRORS_MESSAGE)));
}

#[tokio::test]
async fn resources_accept_multipart_uploads() {
    let fixture = fixture();
    let packet = fixture
        .repository
        .insert_resource_type("Electee Packet", true)
        .expect("resource type");

    let response = router(&fixture)
        .oneshot(multipart("/electees/resources", Some(MANAGER), packet.id, "packet.pdf"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let resources = fixture.portal.resources.resources(&term()).expect("resources");
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].attachment.file_name, "packet.pdf");
    assert_eq!(resources[0].attachment.content_type, "application/pdf");
    assert_eq!(fixture.storage.keys(), vec![resources[0].attachment.storage_key.clone()]);
}

#[tokio::test]
async fn unreadable_bodies_from_managers_are_redisplayed_with_an_error() {
    let fixture = fixture();
    let router = router(&fixture);

    let attempts = vec![
        raw_post("/electees/groups/edit", Some(MANAGER), "application/json", "not json"),
        raw_post("/electees/groups/points", Some(MANAGER), "text/plain", "points=9"),
        raw_post(
            "/electees/groups/points",
            Some(MANAGER),
            "application/json",
            "[{\"electee_group\": \"one\"}]",
        ),
        raw_post("/electees/resources", Some(MANAGER), "multipart/form-data", "garbage"),
        raw_post("/electees/survey/parts", Some(MANAGER), "application/json", "{"),
    ];

    for request in attempts {
        let uri = request.uri().to_string();
        let response = router.clone().oneshot(request).await.expect("route executes");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");

        let page = read_page(response).await;
        assert_eq!(page.message.map(|flash| flash.kind), Some(FlashKind::Error), "{uri}");
        let reason = page.context["errors"]["fields"][NON_FIELD][0]
            .as_str()
            .unwrap_or_default();
        assert!(reason.starts_with("The submission could not be read"), "{uri}: {reason}");
        assert!(page.context["input"].is_null(), "{uri}");
    }

    assert!(fixture.repository.groups_for_term(term().id).expect("groups").is_empty());
    assert!(fixture.repository.survey_parts().expect("parts").is_empty());
    assert!(fixture.storage.keys().is_empty());
}

#[tokio::test]
async fn sessionless_anonymous_callers_do_not_share_a_flash() {
    let fixture = fixture();
    let router = router(&fixture);

    let denied = router
        .clone()
        .oneshot(post_json("/electees/groups/edit", None, &json!([{ "group_name": "Anon" }])))
        .await
        .expect("route executes");
    assert_eq!(denied.status(), StatusCode::SEE_OTHER);

    let stranger = read_page(
        router
            .clone()
            .oneshot(get("/electees/", None))
            .await
            .expect("overview renders"),
    )
    .await;
    assert!(stranger.message.is_none());

    let guest = Request::post("/electees/groups/edit")
        .header(SESSION_HEADER, "guest-a")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!([]).to_string()))
        .expect("request builds");
    router.clone().oneshot(guest).await.expect("route executes");

    let other_guest = Request::get("/electees/")
        .header(SESSION_HEADER, "guest-b")
        .body(Body::empty())
        .expect("request builds");
    let other = read_page(router.oneshot(other_guest).await.expect("overview renders")).await;
    assert!(other.message.is_none());
}

//! JSON stand-in for template rendering. The HTML layer lives outside this
//! crate and consumes the template name plus a flat context.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::flash::Flash;
use super::rows::FormErrors;

pub const FORMSET_TEMPLATE: &str = "generic_formset.html";
pub const FORM_TEMPLATE: &str = "generic_form.html";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPage {
    pub template: String,
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Flash>,
}

impl RenderedPage {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
            context: Map::new(),
            message: None,
        }
    }

    /// Add a context value. A value that cannot be serialised renders as null.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or_else(|err| {
            warn!(%key, error = %err, "page context value failed to serialise");
            Value::Null
        });
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn message(mut self, message: Option<Flash>) -> Self {
        self.message = message;
        self
    }

    /// Redisplay a rejected submission: the errors, the caller's input and an
    /// error message, with a 422 status.
    pub fn rejected(self, errors: &FormErrors, input: impl Serialize, message: &str) -> Response {
        let page = self
            .with("errors", errors)
            .with("input", input)
            .message(Some(Flash::error(message)));
        (StatusCode::UNPROCESSABLE_ENTITY, Json(page)).into_response()
    }
}

impl IntoResponse for RenderedPage {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::electees::rows::FieldErrors;

    #[test]
    fn context_keeps_insertion_values() {
        let page = RenderedPage::new(FORM_TEMPLATE)
            .with("submit_name", "Update Electee Survey")
            .with("count", 3);

        assert_eq!(page.context["submit_name"], "Update Electee Survey");
        assert_eq!(page.context["count"], 3);
        assert!(page.message.is_none());
    }

    #[tokio::test]
    async fn rejected_pages_carry_errors_and_status() {
        let mut fields = FieldErrors::new();
        fields.add("due_date", "This field is required.");

        let response = RenderedPage::new(FORM_TEMPLATE).rejected(
            &FormErrors::from(fields),
            serde_json::json!({ "instructions": "hi" }),
            "Form is invalid. Please correct the noted errors.",
        );

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = axum::body::to_bytes(response.into_body(), 4096)
            .await
            .expect("read body");
        let page: RenderedPage = serde_json::from_slice(&body).expect("page json");
        assert_eq!(page.context["errors"]["fields"]["due_date"][0], "This field is required.");
        assert_eq!(page.context["input"]["instructions"], "hi");
        assert_eq!(page.message, Some(Flash::error("Form is invalid. Please correct the noted errors.")));
    }
}

//! Authorization endpoint handlers.
//!
//! ```text
//! GET /oauth2/authorize?response_type=code&client_id=...
//!   │
//!   ├─► invalid, no trusted redirect → local error page
//!   ├─► invalid → redirect with error / error_description / state
//!   └─► valid → context stored → redirect to interaction_url?context=<handle>
//!
//! GET /oauth2/authorize/resume?context=<handle>        (authenticated user)
//!   ├─► consent screen needed → JSON consent prompt
//!   └─► answered silently → redirect with the authorization response
//!
//! POST /oauth2/authorize/decision                      (authenticated user)
//!   context=<handle>&action=accept|decline&remember=on
//!   └─► redirect with the authorization response or access_denied
//! ```

use axum::{
    Extension, Form, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::AuthState;
use super::pages::render_error_page;
use crate::error::AuthorizationRejection;
use crate::oauth::authorize::AuthorizationRequest;
use crate::oauth::context::{AuthorizationContext, ContextHandle};
use crate::oauth::service::{AuthenticatedUser, ConsentAnswer, ResumeOutcome};
use crate::oauth::validator::RejectedRequest;

/// Query of the resume endpoint.
#[derive(Debug, Deserialize)]
pub struct ResumeQuery {
    pub context: String,
}

/// Form posted by the consent screen.
#[derive(Debug, Deserialize)]
pub struct DecisionForm {
    pub context: String,
    /// `accept` or `decline`.
    pub action: String,
    /// Checkbox value; any of `on`, `true`, `1` stores the answer.
    #[serde(default)]
    pub remember: Option<String>,
}

/// What the consent screen needs to render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentPrompt {
    pub context: String,
    pub client_id: String,
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_logo: Option<String>,
    pub scopes: Vec<String>,
    pub audience: Vec<String>,
}

impl From<&AuthorizationContext> for ConsentPrompt {
    fn from(context: &AuthorizationContext) -> Self {
        Self {
            context: context.handle.to_string(),
            client_id: context.client_id.clone(),
            client_name: context.client_name.clone(),
            client_logo: context.client_logo.clone(),
            scopes: context.effective_scope_names(),
            audience: context.additional_audience.clone(),
        }
    }
}

/// Starts an authorization request.
pub async fn authorize_handler(
    State(state): State<AuthState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let request = AuthorizationRequest::from_pairs(params);
    match state
        .authorization
        .begin(&request, OffsetDateTime::now_utc())
        .await
    {
        Ok(context) => {
            debug!(
                client_id = %context.client_id,
                flow = %context.flow,
                "Authorization request accepted"
            );
            let location = interaction_location(
                &state.config.authorize.interaction_url,
                &context.handle,
            );
            Redirect::to(&location).into_response()
        }
        Err(rejected) => rejection_response(rejected),
    }
}

/// Continues an authorization request once the user has authenticated.
pub async fn resume_handler(
    State(state): State<AuthState>,
    user: Option<Extension<AuthenticatedUser>>,
    Query(query): Query<ResumeQuery>,
) -> Response {
    let Some(Extension(user)) = user else {
        return unauthenticated();
    };
    let Ok(handle) = query.context.parse::<ContextHandle>() else {
        return unknown_context();
    };

    match state
        .authorization
        .resume(&handle, &user, OffsetDateTime::now_utc())
        .await
    {
        Ok(ResumeOutcome::ConsentRequired(context)) => {
            Json(ConsentPrompt::from(context.as_ref())).into_response()
        }
        Ok(ResumeOutcome::Redirect(url)) => Redirect::to(&url).into_response(),
        Err(rejected) => rejection_response(rejected),
    }
}

/// Applies the user's consent decision.
pub async fn decision_handler(
    State(state): State<AuthState>,
    user: Option<Extension<AuthenticatedUser>>,
    Form(form): Form<DecisionForm>,
) -> Response {
    let Some(Extension(user)) = user else {
        return unauthenticated();
    };
    let Ok(handle) = form.context.parse::<ContextHandle>() else {
        return unknown_context();
    };
    let accept = match form.action.as_str() {
        "accept" => true,
        "decline" => false,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Html(render_error_page("invalid_request", "Invalid action")),
            )
                .into_response();
        }
    };
    let answer = ConsentAnswer {
        accept,
        remember: matches!(form.remember.as_deref(), Some("on" | "true" | "1")),
    };

    match state
        .authorization
        .finish(&handle, &user, answer, OffsetDateTime::now_utc())
        .await
    {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(rejected) => rejection_response(rejected),
    }
}

fn interaction_location(interaction_url: &str, handle: &ContextHandle) -> String {
    let separator = if interaction_url.contains('?') { '&' } else { '?' };
    format!("{interaction_url}{separator}context={handle}")
}

/// Delivers a rejection through the redirect URI when one is trusted,
/// otherwise renders it locally.
fn rejection_response(rejected: RejectedRequest) -> Response {
    let RejectedRequest { rejection, redirect } = rejected;
    warn!(
        error = rejection.oauth_error_code(),
        description = rejection.description(),
        redirected = redirect.is_some(),
        "Authorization request rejected"
    );

    if let Some(target) = redirect.filter(|_| rejection.is_redirectable()) {
        match target.error_url(&rejection) {
            Ok(url) => return Redirect::to(&url).into_response(),
            Err(err) => warn!(error = %err, "Failed to build error redirect"),
        }
    }

    let status = match rejection {
        AuthorizationRejection::Server { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Html(render_error_page(
            rejection.oauth_error_code(),
            rejection.description(),
        )),
    )
        .into_response()
}

fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Html(render_error_page(
            "login_required",
            "The user is not authenticated",
        )),
    )
        .into_response()
}

fn unknown_context() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Html(render_error_page(
            "invalid_request",
            "unknown or expired authorization request",
        )),
    )
        .into_response()
}

//! Information endpoints used by the wall frontend

use axum::{extract::State, routing::get, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use glacier_core::models::Principal;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::http::{AppError, AppResult, AppState};

/// Cookie carrying the wall's principal
pub const WALL_ID_COOKIE: &str = "wallId";

const WALL_ID_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

pub fn create_info_router() -> Router<AppState> {
    Router::new()
        .route("/rest/wall-id", get(wall_id))
        .route("/rest/mastodon-handle", get(mastodon_handle))
        .route("/rest/operator", get(operator))
        .route("/rest/subscriptions", get(subscriptions))
}

/// Non-empty wall id from the request cookies.
pub fn wall_id_from(jar: &CookieJar) -> Option<String> {
    jar.get(WALL_ID_COOKIE)
        .map(|cookie| cookie.value().trim().to_string())
        .filter(|id| !id.is_empty())
}

#[derive(Debug, Serialize)]
pub struct WallId {
    pub id: String,
}

/// Return the caller's wall id, issuing a fresh one when the cookie is absent.
pub async fn wall_id(jar: CookieJar) -> AppResult<(CookieJar, Json<WallId>)> {
    if let Some(id) = wall_id_from(&jar) {
        debug!(wall_id = %id, "Existing wall id");
        return Ok((jar, Json(WallId { id })));
    }

    let id = Uuid::new_v4().to_string();
    let cookie = Cookie::parse(format!(
        "{WALL_ID_COOKIE}={id}; Path=/; Max-Age={WALL_ID_MAX_AGE_SECS}"
    ))
    .map_err(|e| AppError::internal_server_error(format!("Failed to build cookie: {e}")))?;

    info!(wall_id = %id, "Issued new wall id");
    Ok((jar.add(cookie), Json(WallId { id })))
}

#[derive(Debug, Serialize)]
pub struct Handle {
    pub name: String,
}

pub async fn mastodon_handle(State(state): State<AppState>) -> Json<Handle> {
    Json(Handle {
        name: state.instance.handle.clone(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceOperator {
    pub domain: String,
    pub operator_name: String,
    pub operator_street_and_number: String,
    pub operator_zipcode: String,
    pub operator_city: String,
    pub operator_country: String,
    pub operator_phone: String,
    pub operator_mail: String,
    pub operator_website: String,
}

pub async fn operator(State(state): State<AppState>) -> Json<InstanceOperator> {
    let instance = &state.instance;
    let operator = &instance.operator;
    Json(InstanceOperator {
        domain: instance.domain.clone(),
        operator_name: operator.name.clone(),
        operator_street_and_number: operator.street_and_number.clone(),
        operator_zipcode: operator.zipcode.clone(),
        operator_city: operator.city.clone(),
        operator_country: operator.country.clone(),
        operator_phone: operator.phone.clone(),
        operator_mail: operator.mail.clone(),
        operator_website: operator.website.clone(),
    })
}

/// Hashtags the caller's wall is subscribed to.
pub async fn subscriptions(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Json<Vec<String>>> {
    let id = wall_id_from(&jar).ok_or_else(|| AppError::bad_request("Missing wallId cookie"))?;
    let principal = Principal::new(id)?;

    let hashtags = state
        .registry
        .hashtags(principal.as_str())
        .into_iter()
        .map(|hashtag| hashtag.to_string())
        .collect();
    Ok(Json(hashtags))
}

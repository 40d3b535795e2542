use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use super::dto::{ContactRequest, ContactResponse, MessageQuery, OverviewResponse};
use crate::{auth::AuthUser, error::AppError, state::AppState, store::Document};

pub fn contact_routes() -> Router<AppState> {
    Router::new().route("/api/contact", post(submit_contact))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/overview", get(overview))
        .route("/admin/messages", get(list_messages))
        .route("/admin/messages/:id/read", post(mark_read))
}

#[instrument(skip(state, payload))]
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> Result<Json<ContactResponse>, AppError> {
    let receipt = state.contact.submit(payload).await?;
    Ok(Json(receipt.into()))
}

#[instrument(skip_all)]
pub async fn overview(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<OverviewResponse>, AppError> {
    let metrics = state.contact.stats().await?;
    Ok(Json(OverviewResponse {
        user: user.into(),
        metrics,
    }))
}

#[instrument(skip(state, _user))]
pub async fn list_messages(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(q): Query<MessageQuery>,
) -> Result<Json<Vec<Document>>, AppError> {
    let messages = state.contact.list_messages(Some(q.limit)).await?;
    Ok(Json(messages))
}

#[instrument(skip(state, _user))]
pub async fn mark_read(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    match state.contact.mark_read(&id).await? {
        Some(doc) => Ok(Json(doc)),
        None => {
            warn!(%id, "message not found");
            Err(AppError::NotFound("Message not found".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState};

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn admin_token(app: &Router) -> String {
        let (_, body) = call(
            app.clone(),
            post_json(
                "/auth/register",
                json!({"email": "admin@example.com", "password": "password123"}),
            ),
        )
        .await;
        body["access_token"].as_str().unwrap().to_string()
    }

    fn contact_body() -> Value {
        json!({"name": "Ana", "email": "ana@example.com", "message": "Hi!"})
    }

    #[tokio::test]
    async fn contact_is_queued_without_relay() {
        let app = build_app(AppState::fake());
        let (status, body) = call(app, post_json("/api/contact", contact_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "queued");
        assert_eq!(body["stored"], true);
        assert!(body["message_id"].is_string());
        assert!(body["note"].is_string());
    }

    #[tokio::test]
    async fn contact_validation_is_bad_request() {
        let app = build_app(AppState::fake());
        let (status, _) = call(
            app,
            post_json("/api/contact", json!({"name": "", "email": "x@y.z", "message": "m"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_reads_and_marks_messages() {
        let app = build_app(AppState::fake());
        let token = admin_token(&app).await;
        let (_, first) = call(app.clone(), post_json("/api/contact", contact_body())).await;
        call(app.clone(), post_json("/api/contact", contact_body())).await;

        let (status, list) = call(app.clone(), authed("GET", "/admin/messages?limit=1", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["name"], "Ana");

        let id = first["message_id"].as_str().unwrap();
        let (status, doc) = call(
            app.clone(),
            authed("POST", &format!("/admin/messages/{id}/read"), &token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["read"], true);

        let (status, overview) = call(app.clone(), authed("GET", "/admin/overview", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(overview["user"]["email"], "admin@example.com");
        assert_eq!(overview["metrics"]["messages"], 2);
        assert_eq!(overview["metrics"]["unread"], 1);

        let (status, _) = call(app, authed("POST", "/admin/messages/missing/read", &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let app = build_app(AppState::fake());
        let (status, _) = call(
            app,
            Request::get("/admin/overview").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

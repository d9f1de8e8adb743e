//! # Skills API
//!
//! Per-conversation skill progress and its computed layout.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use skilltree_core::layout::{LayoutDiagnostics, PositionedNode};
use skilltree_core::service::{ProgressSource, ReconciledProgress};
use skilltree_core::state::ProgressRecord;

use super::{ApiError, ErrorResponse};
use crate::auth::AuthUser;
use crate::AppState;

const READ_FAILED: &str = "Error retrieving skill progress";
const WRITE_FAILED: &str = "Error updating skill progress";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct ProgressQuery {
    /// Conversation the progress belongs to
    #[serde(rename = "conversationId")]
    conversation_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateProgressRequest {
    conversation_id: Option<String>,
    /// Flat node list; replaces whatever was stored. Stored as sent, only
    /// `position` keys are dropped.
    #[schema(value_type = Option<Vec<Object>>)]
    skill_tree_data: Option<Value>,
}

/// A stored or synthesized progress record
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressResponse {
    conversation_id: String,
    user: String,
    #[schema(value_type = Vec<Object>)]
    skill_tree_data: Value,
    #[schema(value_type = String, format = DateTime)]
    last_updated: DateTime<Utc>,
    /// `database_record` or `backend_default_template`; absent on writes
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    source: Option<ProgressSource>,
}

impl From<ProgressRecord> for ProgressResponse {
    fn from(record: ProgressRecord) -> Self {
        Self {
            conversation_id: record.conversation_id,
            user: record.user,
            skill_tree_data: record.skill_tree_data,
            last_updated: record.last_updated,
            source: None,
        }
    }
}

impl From<ReconciledProgress> for ProgressResponse {
    fn from(progress: ReconciledProgress) -> Self {
        Self {
            source: Some(progress.source),
            ..progress.record.into()
        }
    }
}

/// Positioned tree ready for drawing
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LayoutResponse {
    conversation_id: String,
    #[schema(value_type = String)]
    source: ProgressSource,
    root_id: Option<String>,
    #[schema(value_type = Vec<Object>)]
    nodes: Vec<PositionedNode>,
    #[schema(value_type = Object)]
    diagnostics: LayoutDiagnostics,
}

pub fn skill_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_progress).post(update_progress))
        .route("/layout", get(get_layout))
}

/// Get skill progress for a conversation
#[utoipa::path(
    get,
    path = "/api/skills",
    tag = "skills",
    params(ProgressQuery),
    responses(
        (status = 200, description = "Stored progress or the default tree", body = ProgressResponse),
        (status = 400, description = "conversationId missing", body = ErrorResponse),
        (status = 401, description = "No authenticated user", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn get_progress(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let progress = state
        .service
        .get_progress(&user, query.conversation_id.as_deref())
        .map_err(|e| ApiError::from_progress(e, READ_FAILED))?;

    Ok(Json(progress.into()))
}

/// Save skill progress for a conversation
#[utoipa::path(
    post,
    path = "/api/skills",
    tag = "skills",
    request_body = UpdateProgressRequest,
    responses(
        (status = 200, description = "Progress saved", body = ProgressResponse),
        (status = 400, description = "conversationId or skillTreeData missing", body = ErrorResponse),
        (status = 401, description = "No authenticated user", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn update_progress(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<UpdateProgressRequest>, JsonRejection>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        tracing::debug!(user = %user, "Rejected skill progress body: {}", rejection.body_text());
        ApiError::BadRequest(rejection.body_text())
    })?;

    let record = state
        .service
        .update_progress(&user, req.conversation_id.as_deref(), req.skill_tree_data)
        .map_err(|e| ApiError::from_progress(e, WRITE_FAILED))?;

    Ok(Json(record.into()))
}

/// Get the positioned skill tree for a conversation
#[utoipa::path(
    get,
    path = "/api/skills/layout",
    tag = "skills",
    params(ProgressQuery),
    responses(
        (status = 200, description = "Positioned nodes in pre-order from the root", body = LayoutResponse),
        (status = 400, description = "conversationId missing", body = ErrorResponse),
        (status = 401, description = "No authenticated user", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn get_layout(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<LayoutResponse>, ApiError> {
    let progress = state
        .service
        .get_progress(&user, query.conversation_id.as_deref())
        .map_err(|e| ApiError::from_progress(e, READ_FAILED))?;

    let layout = state
        .layout
        .layout_tree(&progress.record.skill_tree_data, &state.root_id);

    if !layout.diagnostics.is_clean() {
        tracing::warn!(
            user = %user,
            conversation_id = %progress.record.conversation_id,
            dropped = layout.diagnostics.dropped_count(),
            unreachable = ?layout.diagnostics.unreachable,
            "Skill tree has nodes or edges that cannot be drawn"
        );
    }

    Ok(Json(LayoutResponse {
        root_id: layout.root().map(|n| n.id.clone()),
        conversation_id: progress.record.conversation_id,
        source: progress.source,
        nodes: layout.nodes,
        diagnostics: layout.diagnostics,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtValidator;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use skilltree_core::layout::LayoutEngine;
    use skilltree_core::service::ReconciliationService;
    use skilltree_core::skills::DefinitionStore;
    use skilltree_core::state::{InMemoryProgressRepository, ProgressRepository};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> (AppState, Arc<InMemoryProgressRepository>) {
        let repo = Arc::new(InMemoryProgressRepository::new());
        let state = AppState {
            service: ReconciliationService::new(
                repo.clone(),
                DefinitionStore::builtin().unwrap(),
            ),
            layout: LayoutEngine::default(),
            root_id: Arc::from("orientasi"),
            jwt: JwtValidator::new_dev(),
        };
        (state, repo)
    }

    fn bearer(state: &AppState, user: &str) -> String {
        format!("Bearer {}", state.jwt.generate_token(user).unwrap())
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let response = crate::app(state.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post(auth: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/skills")
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn small_tree() -> Value {
        json!([
            { "id": "root", "name": "Root", "unlocked": true, "children": ["a", "b"], "icon": "flag" },
            { "id": "a", "name": "A", "unlocked": false, "children": [], "icon": "zap" },
            { "id": "b", "name": "B", "unlocked": false, "children": [], "icon": "brain" }
        ])
    }

    #[tokio::test]
    async fn test_get_requires_auth() {
        let (state, _) = test_state();
        let (status, body) = send(&state, get("/api/skills?conversationId=c1", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Unauthorized");

        let (status, _) = send(
            &state,
            get("/api/skills?conversationId=c1", Some("Bearer not-a-jwt")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_requires_conversation_id() {
        let (state, _) = test_state();
        let auth = bearer(&state, "user-1");
        let (status, body) = send(&state, get("/api/skills", Some(&auth))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "conversationId is required");
    }

    #[tokio::test]
    async fn test_get_serves_default_template() {
        let (state, repo) = test_state();
        let auth = bearer(&state, "user-1");
        let (status, body) = send(&state, get("/api/skills?conversationId=c1", Some(&auth))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "backend_default_template");
        assert_eq!(body["conversationId"], "c1");
        assert_eq!(body["user"], "user-1");
        assert_eq!(body["skillTreeData"].as_array().unwrap().len(), 18);
        assert_eq!(body["skillTreeData"][0]["id"], "orientasi");
        assert!(body["lastUpdated"].is_string());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_post_then_get_round_trip() {
        let (state, _) = test_state();
        let auth = bearer(&state, "user-1");

        let (status, saved) = send(
            &state,
            post(&auth, json!({ "conversationId": "c1", "skillTreeData": small_tree() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["skillTreeData"], small_tree());
        assert!(saved.get("source").is_none());

        let (status, body) = send(&state, get("/api/skills?conversationId=c1", Some(&auth))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "database_record");
        assert_eq!(body["skillTreeData"], small_tree());

        let other = bearer(&state, "user-2");
        let (_, body) = send(&state, get("/api/skills?conversationId=c1", Some(&other))).await;
        assert_eq!(body["source"], "backend_default_template");
    }

    #[tokio::test]
    async fn test_sparse_tree_round_trips_unchanged() {
        let (state, _) = test_state();
        let auth = bearer(&state, "user-1");
        let tree = json!([
            { "id": "root", "children": ["a"] },
            { "id": "a", "description": "extra" }
        ]);
        let mut submitted = tree.clone();
        submitted[1]["position"] = json!({ "x": 1.0, "y": 2.0 });

        let (status, _) = send(
            &state,
            post(&auth, json!({ "conversationId": "c1", "skillTreeData": submitted })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&state, get("/api/skills?conversationId=c1", Some(&auth))).await;
        assert_eq!(body["source"], "database_record");
        assert_eq!(body["skillTreeData"], tree);
    }

    #[tokio::test]
    async fn test_malformed_trees_are_accepted() {
        let (state, repo) = test_state();
        let auth = bearer(&state, "user-1");
        let trees = [
            json!([{ "name": "no id" }]),
            json!([{ "id": "a", "name": null }]),
            json!([{ "id": "a", "children": "b" }]),
            json!([{ "id": 7 }]),
            json!({ "not": "a list" }),
        ];

        for (i, tree) in trees.iter().enumerate() {
            let conversation = format!("m{}", i);
            let (status, body) = send(
                &state,
                post(&auth, json!({ "conversationId": conversation.as_str(), "skillTreeData": tree })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{}", tree);
            assert_eq!(&body["skillTreeData"], tree);
            assert_eq!(
                &repo.find("user-1", &conversation).unwrap().unwrap().skill_tree_data,
                tree
            );
        }

        let (status, body) = send(
            &state,
            get("/api/skills/layout?conversationId=m4", Some(&auth)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["nodes"].as_array().unwrap().is_empty());
        assert!(body["rootId"].is_null());
    }

    #[tokio::test]
    async fn test_post_missing_fields() {
        let (state, repo) = test_state();
        let auth = bearer(&state, "user-1");

        let (status, body) = send(&state, post(&auth, json!({ "conversationId": "c1" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "skillTreeData is required");

        let (status, body) = send(
            &state,
            post(&auth, json!({ "conversationId": "c1", "skillTreeData": null })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "skillTreeData is required");

        let (status, body) = send(&state, post(&auth, json!({ "skillTreeData": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "conversationId is required");

        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_post_malformed_body() {
        let (state, repo) = test_state();
        let auth = bearer(&state, "user-1");
        let req = Request::builder()
            .method("POST")
            .uri("/api/skills")
            .header(header::AUTHORIZATION, &auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_post_requires_auth_before_validation() {
        let (state, _) = test_state();
        let req = Request::builder()
            .method("POST")
            .uri("/api/skills")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_tree_is_accepted_but_reads_as_default() {
        let (state, repo) = test_state();
        let auth = bearer(&state, "user-1");

        let (status, _) = send(
            &state,
            post(&auth, json!({ "conversationId": "c1", "skillTreeData": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(repo.find("user-1", "c1").unwrap().is_some());

        let (_, body) = send(&state, get("/api/skills?conversationId=c1", Some(&auth))).await;
        assert_eq!(body["source"], "backend_default_template");
    }

    #[tokio::test]
    async fn test_layout_of_default_tree() {
        let (state, _) = test_state();
        let auth = bearer(&state, "user-1");
        let (status, body) = send(
            &state,
            get("/api/skills/layout?conversationId=c1", Some(&auth)),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rootId"], "orientasi");
        assert_eq!(body["source"], "backend_default_template");
        let nodes = body["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 18);
        assert_eq!(nodes[0]["position"]["x"], 385.0);
        assert_eq!(nodes[0]["position"]["y"], 1260.0);
        assert!(body["diagnostics"]["unreachable"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_layout_of_malformed_tree() {
        let (state, _) = test_state();
        let auth = bearer(&state, "user-1");
        let tree = json!([
            { "id": "top", "name": "Top", "children": ["mid", "ghost"] },
            { "id": "mid", "name": "Mid", "children": ["top"] },
            { "id": "island", "name": "Island", "children": [] }
        ]);
        send(&state, post(&auth, json!({ "conversationId": "c9", "skillTreeData": tree }))).await;

        let (status, body) = send(
            &state,
            get("/api/skills/layout?conversationId=c9", Some(&auth)),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "database_record");
        assert_eq!(body["rootId"], "top");
        let ids: Vec<&str> = body["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["top", "mid"]);
        assert_eq!(body["diagnostics"]["unreachable"], json!(["island"]));
        assert_eq!(body["diagnostics"]["dangling"][0]["child"], "ghost");
        assert_eq!(body["diagnostics"]["repeated"][0]["child"], "top");
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let (state, _) = test_state();
        let (status, body) = send(&state, get("/api/openapi.json", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/skills"].is_object());
        assert!(body["paths"]["/api/skills/layout"].is_object());
    }
}

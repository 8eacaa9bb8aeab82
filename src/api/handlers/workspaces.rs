//! Workspace and membership endpoints.
//!
//! Workspaces are the collaboration boundary. Every workspace has exactly one
//! OWNER membership, created with the workspace in one transaction. Updates
//! and deletes are owner-only; member add/remove requires an owner or admin
//! membership, and the owner can never be removed. Listings are paginated
//! with a true total count; a caller with the global admin role sees every
//! workspace.

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use utoipa::{IntoParams, ToSchema};

use super::auth::principal::{require_auth, require_role};
use super::auth::state::AuthState;
use super::auth::types::UserRole;
use crate::error::Error;

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 10;

const ONLY_OWNERS: &str = "Only owners can make changes";
const ONLY_MANAGERS: &str = "Only owners and admins can manage members";

/// Roles the workspace listing route declares; checked by the role guard.
const LIST_ROLES: &[UserRole] = &[UserRole::Admin, UserRole::User];

/// Role scoping a user's privileges within one workspace, distinct from the
/// global user role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    Owner,
    Admin,
    Member,
}

impl WorkspaceRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// Owner or admin membership may manage members.
fn can_manage_members(role: Option<WorkspaceRole>) -> bool {
    matches!(role, Some(WorkspaceRole::Owner | WorkspaceRole::Admin))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// 1-indexed page, defaults to 1.
    pub page: Option<i64>,
    /// Page size, defaults to 10.
    pub limit: Option<i64>,
}

/// Clamped pagination window: `offset = (page - 1) * limit`.
#[derive(Debug, Clone, Copy)]
struct PageWindow {
    page: i64,
    limit: i64,
}

impl PageWindow {
    fn new(params: &PaginationParams) -> Self {
        Self {
            page: params.page.unwrap_or(DEFAULT_PAGE).max(1),
            limit: params.limit.unwrap_or(DEFAULT_LIMIT).max(1),
        }
    }

    fn offset(self) -> i64 {
        (self.page - 1) * self.limit
    }

    fn total_pages(self, total_count: i64) -> i64 {
        (total_count + self.limit - 1) / self.limit
    }

    fn wrap(self, data: Vec<WorkspaceResponse>, total_count: i64) -> PaginatedWorkspaces {
        let total_pages = self.total_pages(total_count);
        PaginatedWorkspaces {
            has_more: self.page < total_pages,
            total_pages,
            current_page: self.page,
            data,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkspaceResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedWorkspaces {
    pub data: Vec<WorkspaceResponse>,
    pub has_more: bool,
    pub total_pages: i64,
    pub current_page: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateWorkspaceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkspaceMemberResponse {
    pub user_id: i64,
    pub role: WorkspaceRole,
    pub email: String,
    pub username: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberActionRequest {
    pub workspace_id: i64,
    pub member_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddMemberResponse {
    pub member_id: i64,
    pub status: String,
}

#[utoipa::path(
    get,
    path = "/v1/workspaces",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated workspaces", body = PaginatedWorkspaces),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "User is not activated")
    ),
    tag = "workspaces"
)]
pub async fn list_workspaces(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let principal = match require_role(&headers, &pool, &auth_state, LIST_ROLES).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let window = PageWindow::new(&params);

    // Global admins see every workspace; everyone else sees the ones they
    // belong to, whatever their membership role.
    let result = if principal.role == UserRole::Admin {
        fetch_all_workspaces(&pool, window).await
    } else {
        let roles = [
            WorkspaceRole::Owner,
            WorkspaceRole::Admin,
            WorkspaceRole::Member,
        ];
        fetch_workspaces_by_roles(&pool, principal.user_id, &roles, window).await
    };

    match result {
        Ok(paginated) => (StatusCode::OK, Json(paginated)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/workspaces/mine",
    params(PaginationParams),
    responses(
        (status = 200, description = "Workspaces the caller owns", body = PaginatedWorkspaces),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    tag = "workspaces"
)]
pub async fn list_my_workspaces(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let window = PageWindow::new(&params);
    match fetch_workspaces_by_roles(&pool, principal.user_id, &[WorkspaceRole::Owner], window).await
    {
        Ok(paginated) => (StatusCode::OK, Json(paginated)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/workspaces/member",
    params(PaginationParams),
    responses(
        (status = 200, description = "Workspaces where the caller is a non-owner member", body = PaginatedWorkspaces),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    tag = "workspaces"
)]
pub async fn list_member_workspaces(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let window = PageWindow::new(&params);
    let roles = [WorkspaceRole::Admin, WorkspaceRole::Member];
    match fetch_workspaces_by_roles(&pool, principal.user_id, &roles, window).await {
        Ok(paginated) => (StatusCode::OK, Json(paginated)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/workspaces",
    request_body = CreateWorkspaceRequest,
    responses(
        (status = 201, description = "Workspace created, caller is owner", body = WorkspaceResponse),
        (status = 400, description = "Invalid input", body = String),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    tag = "workspaces"
)]
pub async fn create_workspace(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateWorkspaceRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let request: CreateWorkspaceRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let name = request.name.trim();
    if name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Workspace name is required".to_string()).into_response();
    }
    let description = request.description.unwrap_or_default();

    match insert_workspace_with_owner(&pool, principal.user_id, name, &description).await {
        Ok(workspace) => (StatusCode::CREATED, Json(workspace)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/workspaces/{id}",
    request_body = UpdateWorkspaceRequest,
    params(("id" = i64, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Workspace updated", body = WorkspaceResponse),
        (status = 400, description = "Invalid input", body = String),
        (status = 401, description = "Only owners can make changes", body = String),
        (status = 404, description = "Workspace not found", body = String)
    ),
    tag = "workspaces"
)]
pub async fn update_workspace(
    Path(workspace_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateWorkspaceRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let request: UpdateWorkspaceRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let description = request.description.as_deref();

    if name.is_none() && description.is_none() {
        return (StatusCode::BAD_REQUEST, "No updates provided".to_string()).into_response();
    }

    // Ownership is checked before any write; a non-owner never mutates state.
    match membership_role(&pool, workspace_id, principal.user_id).await {
        Ok(Some(WorkspaceRole::Owner)) => {}
        Ok(_) => return Error::Unauthorized(ONLY_OWNERS).into_response(),
        Err(err) => return err.into_response(),
    }

    match update_workspace_record(&pool, workspace_id, name, description).await {
        Ok(workspace) => (StatusCode::OK, Json(workspace)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/workspaces/{id}",
    params(("id" = i64, Path, description = "Workspace id")),
    responses(
        (status = 204, description = "Workspace deleted, memberships cascade"),
        (status = 401, description = "Only owners can make changes", body = String)
    ),
    tag = "workspaces"
)]
pub async fn delete_workspace(
    Path(workspace_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match membership_role(&pool, workspace_id, principal.user_id).await {
        Ok(Some(WorkspaceRole::Owner)) => {}
        Ok(_) => return Error::Unauthorized(ONLY_OWNERS).into_response(),
        Err(err) => return err.into_response(),
    }

    match delete_workspace_record(&pool, workspace_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/workspaces/{id}/members",
    params(("id" = i64, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Workspace members", body = [WorkspaceMemberResponse]),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Workspace not found", body = String)
    ),
    tag = "workspaces"
)]
pub async fn list_members(
    Path(workspace_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(err) = require_auth(&headers, &pool, &auth_state).await {
        return err.into_response();
    }

    match workspace_exists(&pool, workspace_id).await {
        Ok(true) => {}
        Ok(false) => return Error::NotFound("Workspace not found").into_response(),
        Err(err) => return err.into_response(),
    }

    match fetch_members(&pool, workspace_id).await {
        Ok(members) => (StatusCode::OK, Json(members)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/workspaces/members/add",
    request_body = MemberActionRequest,
    responses(
        (status = 200, description = "Member added (idempotent)", body = AddMemberResponse),
        (status = 401, description = "Only owners and admins can manage members", body = String),
        (status = 404, description = "User doesn't exist", body = String)
    ),
    tag = "workspaces"
)]
pub async fn add_member(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MemberActionRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let request: MemberActionRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match membership_role(&pool, request.workspace_id, principal.user_id).await {
        Ok(role) if can_manage_members(role) => {}
        Ok(_) => return Error::Unauthorized(ONLY_MANAGERS).into_response(),
        Err(err) => return err.into_response(),
    }

    match user_exists(&pool, request.member_id).await {
        Ok(true) => {}
        Ok(false) => return Error::NotFound("User doesn't exist").into_response(),
        Err(err) => return err.into_response(),
    }

    // Second add of the same member reports "already added" and changes
    // nothing; the membership row count stays the same.
    match insert_member(&pool, request.workspace_id, request.member_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(AddMemberResponse {
                member_id: request.member_id,
                status: "Member added".to_string(),
            }),
        )
            .into_response(),
        Ok(false) => (
            StatusCode::OK,
            Json(AddMemberResponse {
                member_id: request.member_id,
                status: "Member already added".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/workspaces/members/remove",
    request_body = MemberActionRequest,
    responses(
        (status = 204, description = "Member removed"),
        (status = 401, description = "Owner cannot be removed, or caller lacks privilege", body = String),
        (status = 404, description = "Member not found", body = String)
    ),
    tag = "workspaces"
)]
pub async fn remove_member(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MemberActionRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let request: MemberActionRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match membership_role(&pool, request.workspace_id, principal.user_id).await {
        Ok(role) if can_manage_members(role) => {}
        Ok(_) => return Error::Unauthorized(ONLY_MANAGERS).into_response(),
        Err(err) => return err.into_response(),
    }

    match membership_role(&pool, request.workspace_id, request.member_id).await {
        Ok(None) => return Error::NotFound("Member not found").into_response(),
        Ok(Some(WorkspaceRole::Owner)) => {
            return Error::Unauthorized("Workspace owners cannot be removed").into_response();
        }
        Ok(Some(_)) => {}
        Err(err) => return err.into_response(),
    }

    match delete_member(&pool, request.workspace_id, request.member_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

// Qualified so the membership join does not make created_at ambiguous.
const WORKSPACE_COLUMNS: &str = r#"
    workspaces.id, workspaces.name, workspaces.description,
    to_char(workspaces.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
"#;

fn workspace_from_row(row: &sqlx::postgres::PgRow) -> WorkspaceResponse {
    WorkspaceResponse {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

async fn fetch_all_workspaces(
    pool: &PgPool,
    window: PageWindow,
) -> Result<PaginatedWorkspaces, Error> {
    let query = format!(
        "SELECT {WORKSPACE_COLUMNS} FROM workspaces ORDER BY workspaces.created_at DESC, workspaces.id DESC OFFSET $1 LIMIT $2"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(window.offset())
        .bind(window.limit)
        .fetch_all(pool)
        .instrument(span)
        .await?;

    let count_query = "SELECT COUNT(*) AS total FROM workspaces";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = count_query
    );
    let total: i64 = sqlx::query(count_query)
        .fetch_one(pool)
        .instrument(span)
        .await?
        .get("total");

    Ok(window.wrap(rows.iter().map(workspace_from_row).collect(), total))
}

async fn fetch_workspaces_by_roles(
    pool: &PgPool,
    user_id: i64,
    roles: &[WorkspaceRole],
    window: PageWindow,
) -> Result<PaginatedWorkspaces, Error> {
    let role_names: Vec<String> = roles.iter().map(|role| role.as_str().to_string()).collect();

    let query = format!(
        r"
        SELECT {WORKSPACE_COLUMNS}
        FROM workspaces
        JOIN workspace_members m ON m.workspace_id = workspaces.id
        WHERE m.user_id = $1 AND m.role = ANY($2)
        ORDER BY workspaces.created_at DESC, workspaces.id DESC
        OFFSET $3 LIMIT $4
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(user_id)
        .bind(&role_names)
        .bind(window.offset())
        .bind(window.limit)
        .fetch_all(pool)
        .instrument(span)
        .await?;

    // The total runs over the same predicate without the page bounds, so
    // total_pages/has_more reflect all matching rows, not just this page.
    let count_query = r"
        SELECT COUNT(*) AS total
        FROM workspace_members m
        WHERE m.user_id = $1 AND m.role = ANY($2)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = count_query
    );
    let total: i64 = sqlx::query(count_query)
        .bind(user_id)
        .bind(&role_names)
        .fetch_one(pool)
        .instrument(span)
        .await?
        .get("total");

    Ok(window.wrap(rows.iter().map(workspace_from_row).collect(), total))
}

/// Create the workspace and its OWNER membership in one transaction: both
/// rows or neither.
async fn insert_workspace_with_owner(
    pool: &PgPool,
    user_id: i64,
    name: &str,
    description: &str,
) -> Result<WorkspaceResponse, Error> {
    let mut tx = pool.begin().await?;

    let query = format!(
        "INSERT INTO workspaces (name, description) VALUES ($1, $2) RETURNING {WORKSPACE_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(name)
        .bind(description)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await?;

    let workspace = workspace_from_row(&row);

    let query = "INSERT INTO workspace_members (workspace_id, user_id, role) VALUES ($1, $2, $3)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(workspace.id)
        .bind(user_id)
        .bind(WorkspaceRole::Owner.as_str())
        .execute(&mut *tx)
        .instrument(span)
        .await?;

    tx.commit().await?;

    Ok(workspace)
}

async fn update_workspace_record(
    pool: &PgPool,
    workspace_id: i64,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<WorkspaceResponse, Error> {
    let query = format!(
        r"
        UPDATE workspaces
        SET name = COALESCE($2, name),
            description = COALESCE($3, description)
        WHERE id = $1
        RETURNING {WORKSPACE_COLUMNS}
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(workspace_id)
        .bind(name)
        .bind(description)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    row.as_ref()
        .map(workspace_from_row)
        .ok_or(Error::NotFound("Workspace not found"))
}

async fn delete_workspace_record(pool: &PgPool, workspace_id: i64) -> Result<(), Error> {
    let query = "DELETE FROM workspaces WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(workspace_id)
        .execute(pool)
        .instrument(span)
        .await?;
    Ok(())
}

async fn workspace_exists(pool: &PgPool, workspace_id: i64) -> Result<bool, Error> {
    let query = "SELECT EXISTS(SELECT 1 FROM workspaces WHERE id = $1) AS exists";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(workspace_id)
        .fetch_one(pool)
        .instrument(span)
        .await?;
    Ok(row.get("exists"))
}

async fn user_exists(pool: &PgPool, user_id: i64) -> Result<bool, Error> {
    let query = "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1) AS exists";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_one(pool)
        .instrument(span)
        .await?;
    Ok(row.get("exists"))
}

/// The caller's membership role in a workspace, if any. Read-only lookup.
async fn membership_role(
    pool: &PgPool,
    workspace_id: i64,
    user_id: i64,
) -> Result<Option<WorkspaceRole>, Error> {
    let query = "SELECT role FROM workspace_members WHERE workspace_id = $1 AND user_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    Ok(row.and_then(|row| {
        let role: String = row.get("role");
        WorkspaceRole::parse(&role)
    }))
}

async fn fetch_members(
    pool: &PgPool,
    workspace_id: i64,
) -> Result<Vec<WorkspaceMemberResponse>, Error> {
    let query = r"
        SELECT m.user_id, m.role, u.email, u.username
        FROM workspace_members m
        JOIN users u ON u.id = m.user_id
        WHERE m.workspace_id = $1
        ORDER BY m.created_at ASC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(workspace_id)
        .fetch_all(pool)
        .instrument(span)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let role: String = row.get("role");
            WorkspaceRole::parse(&role).map(|role| WorkspaceMemberResponse {
                user_id: row.get("user_id"),
                role,
                email: row.get("email"),
                username: row.get("username"),
            })
        })
        .collect())
}

/// Insert a MEMBER-role membership. Returns `false` when the row already
/// existed; the conflict target makes concurrent double-adds idempotent.
async fn insert_member(pool: &PgPool, workspace_id: i64, user_id: i64) -> Result<bool, Error> {
    let query = r"
        INSERT INTO workspace_members (workspace_id, user_id, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (workspace_id, user_id) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(workspace_id)
        .bind(user_id)
        .bind(WorkspaceRole::Member.as_str())
        .execute(pool)
        .instrument(span)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn delete_member(pool: &PgPool, workspace_id: i64, user_id: i64) -> Result<(), Error> {
    let query = "DELETE FROM workspace_members WHERE workspace_id = $1 AND user_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(workspace_id)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(page: i64, limit: i64) -> PageWindow {
        PageWindow::new(&PaginationParams {
            page: Some(page),
            limit: Some(limit),
        })
    }

    #[test]
    fn defaults_apply_when_params_absent() {
        let window = PageWindow::new(&PaginationParams {
            page: None,
            limit: None,
        });
        assert_eq!(window.page, 1);
        assert_eq!(window.limit, 10);
        assert_eq!(window.offset(), 0);
    }

    #[test]
    fn offset_is_page_minus_one_times_limit() {
        assert_eq!(window(1, 10).offset(), 0);
        assert_eq!(window(3, 10).offset(), 20);
        assert_eq!(window(2, 25).offset(), 25);
    }

    #[test]
    fn page_and_limit_are_clamped_to_one() {
        let window = window(0, -5);
        assert_eq!(window.page, 1);
        assert_eq!(window.limit, 1);
    }

    #[test]
    fn total_pages_is_ceiling_division() {
        assert_eq!(window(1, 10).total_pages(0), 0);
        assert_eq!(window(1, 10).total_pages(3), 1);
        assert_eq!(window(1, 10).total_pages(10), 1);
        assert_eq!(window(1, 10).total_pages(11), 2);
    }

    #[test]
    fn three_owned_workspaces_fit_on_one_page() {
        // Non-admin caller with 3 owned workspaces, page=1, limit=10.
        let paginated = window(1, 10).wrap(Vec::new(), 3);
        assert_eq!(paginated.current_page, 1);
        assert_eq!(paginated.total_pages, 1);
        assert!(!paginated.has_more);
    }

    #[test]
    fn has_more_reflects_unbounded_total() {
        let paginated = window(1, 10).wrap(Vec::new(), 25);
        assert_eq!(paginated.total_pages, 3);
        assert!(paginated.has_more);

        let last = window(3, 10).wrap(Vec::new(), 25);
        assert!(!last.has_more);
    }

    #[test]
    fn workspace_role_round_trips_through_storage_form() {
        for role in [
            WorkspaceRole::Owner,
            WorkspaceRole::Admin,
            WorkspaceRole::Member,
        ] {
            assert_eq!(WorkspaceRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(WorkspaceRole::parse("reader"), None);
    }

    #[test]
    fn only_owner_and_admin_manage_members() {
        assert!(can_manage_members(Some(WorkspaceRole::Owner)));
        assert!(can_manage_members(Some(WorkspaceRole::Admin)));
        assert!(!can_manage_members(Some(WorkspaceRole::Member)));
        assert!(!can_manage_members(None));
    }
}

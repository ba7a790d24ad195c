//! Script generation, debugging, modification and version endpoints.

use actix_web::{HttpResponse, delete, get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::{optional, required};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Script, ScriptVersion};
use crate::services::coding;
use crate::services::diff::{self, DiffLine};
use crate::services::LlmClient;

/// Request to generate a new script.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateScriptRequest {
    /// Target language, e.g. "python"
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub requirements: String,
}

/// A freshly generated script and its first version.
#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateScriptResponse {
    pub success: bool,
    pub script: Script,
    pub version: ScriptVersion,
}

/// Request to debug a script.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DebugScriptRequest {
    /// Stored script to version the fix against
    pub script_id: Option<i32>,
    #[serde(default)]
    pub script_content: String,
    pub error_log: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DebugScriptResponse {
    pub success: bool,
    pub analysis: String,
    pub fixed_code: String,
    pub diff_html: String,
    pub no_changes: bool,
    /// Version created by the fix; null when no script was referenced or
    /// the code is unchanged
    pub new_version: Option<ScriptVersion>,
}

/// Request to modify a script.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ModifyScriptRequest {
    pub script_id: Option<i32>,
    #[serde(default)]
    pub script_content: String,
    #[serde(default)]
    pub modification_request: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModifyScriptResponse {
    pub success: bool,
    pub modified_code: String,
    pub explanation: String,
    pub diff_html: String,
    pub no_changes: bool,
    pub new_version: Option<ScriptVersion>,
}

/// Two texts to compare.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TextPairRequest {
    #[serde(default)]
    pub original_content: String,
    #[serde(default)]
    pub new_content: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiffCheckResponse {
    pub success: bool,
    pub diff_html: String,
    pub no_changes: bool,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExplainChangesResponse {
    pub success: bool,
    pub explanation: String,
    pub diff_html: String,
    pub no_changes: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompareVersionsRequest {
    pub script_id: i32,
    pub from_version: i32,
    pub to_version: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompareVersionsResponse {
    pub success: bool,
    pub diff_html: String,
    pub no_changes: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScriptListResponse {
    pub success: bool,
    pub scripts: Vec<Script>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScriptResponse {
    pub success: bool,
    pub script: Script,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionListResponse {
    pub success: bool,
    pub versions: Vec<ScriptVersion>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteScriptResponse {
    pub success: bool,
    pub deleted_id: i32,
}

/// Generate a script from requirements.
///
/// Stores the script together with version 1.
#[utoipa::path(
    post,
    path = "/api/coding/generate",
    tag = "Coding",
    request_body = GenerateScriptRequest,
    responses(
        (status = 201, description = "Script generated", body = GenerateScriptResponse),
        (status = 400, description = "Missing language or requirements", body = crate::error::ErrorResponse),
        (status = 504, description = "Provider timed out", body = crate::error::ErrorResponse)
    )
)]
#[post("/coding/generate")]
pub async fn generate_script(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    body: web::Json<GenerateScriptRequest>,
) -> AppResult<HttpResponse> {
    let language = required("language", &body.language)?.trim();
    let requirements = required("requirements", &body.requirements)?;

    let applied = coding::generate_script(&pool, &llm, language, requirements).await?;

    Ok(HttpResponse::Created().json(GenerateScriptResponse {
        success: true,
        script: applied.script.into(),
        version: applied.version.into(),
    }))
}

/// Analyse and fix a script.
///
/// With `script_id`, a changed fix is stored as the next version of that script.
#[utoipa::path(
    post,
    path = "/api/coding/debug",
    tag = "Coding",
    request_body = DebugScriptRequest,
    responses(
        (status = 200, description = "Analysis and fixed code", body = DebugScriptResponse),
        (status = 400, description = "Missing script content", body = crate::error::ErrorResponse),
        (status = 404, description = "Script not found", body = crate::error::ErrorResponse)
    )
)]
#[post("/coding/debug")]
pub async fn debug_script(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    body: web::Json<DebugScriptRequest>,
) -> AppResult<HttpResponse> {
    let content = required("script_content", &body.script_content)?;

    let outcome = coding::debug_script(
        &pool,
        &llm,
        body.script_id,
        content,
        optional(&body.error_log),
    )
    .await?;

    Ok(HttpResponse::Ok().json(DebugScriptResponse {
        success: true,
        diff_html: outcome.diff.render_html(),
        no_changes: outcome.diff.no_changes,
        analysis: outcome.explanation,
        fixed_code: outcome.code,
        new_version: outcome.applied.map(|a| a.version.into()),
    }))
}

/// Modify a script according to a free-text request.
#[utoipa::path(
    post,
    path = "/api/coding/modify",
    tag = "Coding",
    request_body = ModifyScriptRequest,
    responses(
        (status = 200, description = "Modified code", body = ModifyScriptResponse),
        (status = 400, description = "Missing script content or request", body = crate::error::ErrorResponse),
        (status = 404, description = "Script not found", body = crate::error::ErrorResponse)
    )
)]
#[post("/coding/modify")]
pub async fn modify_script(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    body: web::Json<ModifyScriptRequest>,
) -> AppResult<HttpResponse> {
    let content = required("script_content", &body.script_content)?;
    let request = required("modification_request", &body.modification_request)?;

    let outcome = coding::modify_script(&pool, &llm, body.script_id, content, request).await?;

    Ok(HttpResponse::Ok().json(ModifyScriptResponse {
        success: true,
        diff_html: outcome.diff.render_html(),
        no_changes: outcome.diff.no_changes,
        modified_code: outcome.code,
        explanation: outcome.explanation,
        new_version: outcome.applied.map(|a| a.version.into()),
    }))
}

/// Diff two texts line by line.
#[utoipa::path(
    post,
    path = "/api/coding/diffcheck",
    tag = "Coding",
    request_body = TextPairRequest,
    responses(
        (status = 200, description = "Line diff", body = DiffCheckResponse)
    )
)]
#[post("/coding/diffcheck")]
pub async fn diff_check(body: web::Json<TextPairRequest>) -> AppResult<HttpResponse> {
    let line_diff = diff::diff(&body.original_content, &body.new_content);

    Ok(HttpResponse::Ok().json(DiffCheckResponse {
        success: true,
        diff_html: line_diff.render_html(),
        no_changes: line_diff.no_changes,
        lines: line_diff.lines,
    }))
}

/// Explain the differences between two texts.
#[utoipa::path(
    post,
    path = "/api/coding/explain-changes",
    tag = "Coding",
    request_body = TextPairRequest,
    responses(
        (status = 200, description = "Explanation and diff", body = ExplainChangesResponse)
    )
)]
#[post("/coding/explain-changes")]
pub async fn explain_changes(
    llm: web::Data<LlmClient>,
    body: web::Json<TextPairRequest>,
) -> AppResult<HttpResponse> {
    let (explanation, line_diff) =
        coding::explain_changes(&llm, &body.original_content, &body.new_content).await?;

    Ok(HttpResponse::Ok().json(ExplainChangesResponse {
        success: true,
        explanation,
        diff_html: line_diff.render_html(),
        no_changes: line_diff.no_changes,
    }))
}

/// Diff two stored versions of a script.
#[utoipa::path(
    post,
    path = "/api/coding/compare-versions",
    tag = "Coding",
    request_body = CompareVersionsRequest,
    responses(
        (status = 200, description = "Version diff", body = CompareVersionsResponse),
        (status = 404, description = "Script or version not found", body = crate::error::ErrorResponse)
    )
)]
#[post("/coding/compare-versions")]
pub async fn compare_versions(
    pool: web::Data<DbPool>,
    body: web::Json<CompareVersionsRequest>,
) -> AppResult<HttpResponse> {
    let line_diff =
        coding::compare_versions(&pool, body.script_id, body.from_version, body.to_version).await?;

    Ok(HttpResponse::Ok().json(CompareVersionsResponse {
        success: true,
        diff_html: line_diff.render_html(),
        no_changes: line_diff.no_changes,
    }))
}

/// List all scripts, most recently updated first.
#[utoipa::path(
    get,
    path = "/api/coding/scripts",
    tag = "Coding",
    responses(
        (status = 200, description = "Scripts", body = ScriptListResponse)
    )
)]
#[get("/coding/scripts")]
pub async fn list_scripts(pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let scripts = pool.list_scripts().await?;

    Ok(HttpResponse::Ok().json(ScriptListResponse {
        success: true,
        scripts: scripts.into_iter().map(Script::from).collect(),
    }))
}

/// Get one script.
#[utoipa::path(
    get,
    path = "/api/coding/scripts/{id}",
    tag = "Coding",
    params(("id" = i32, Path, description = "Script ID")),
    responses(
        (status = 200, description = "Script", body = ScriptResponse),
        (status = 404, description = "Script not found", body = crate::error::ErrorResponse)
    )
)]
#[get("/coding/scripts/{id}")]
pub async fn get_script(pool: web::Data<DbPool>, path: web::Path<i32>) -> AppResult<HttpResponse> {
    let script = pool.require_script(path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(ScriptResponse {
        success: true,
        script: script.into(),
    }))
}

/// Delete a script with its versions, test cases and results.
#[utoipa::path(
    delete,
    path = "/api/coding/scripts/{id}",
    tag = "Coding",
    params(("id" = i32, Path, description = "Script ID")),
    responses(
        (status = 200, description = "Script deleted", body = DeleteScriptResponse),
        (status = 404, description = "Script not found", body = crate::error::ErrorResponse)
    )
)]
#[delete("/coding/scripts/{id}")]
pub async fn delete_script(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let script_id = path.into_inner();

    if !pool.delete_script(script_id).await? {
        return Err(AppError::NotFound(format!("Script {}", script_id)));
    }

    Ok(HttpResponse::Ok().json(DeleteScriptResponse {
        success: true,
        deleted_id: script_id,
    }))
}

/// List the versions of a script, oldest first.
#[utoipa::path(
    get,
    path = "/api/coding/scripts/{id}/versions",
    tag = "Coding",
    params(("id" = i32, Path, description = "Script ID")),
    responses(
        (status = 200, description = "Versions", body = VersionListResponse),
        (status = 404, description = "Script not found", body = crate::error::ErrorResponse)
    )
)]
#[get("/coding/scripts/{id}/versions")]
pub async fn list_versions(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let script = pool.require_script(path.into_inner()).await?;
    let versions = pool.list_versions(script.id).await?;

    Ok(HttpResponse::Ok().json(VersionListResponse {
        success: true,
        versions: versions.into_iter().map(ScriptVersion::from).collect(),
    }))
}

/// Configure coding routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(generate_script)
        .service(debug_script)
        .service(modify_script)
        .service(diff_check)
        .service(explain_changes)
        .service(compare_versions)
        .service(list_scripts)
        .service(get_script)
        .service(delete_script)
        .service(list_versions);
}

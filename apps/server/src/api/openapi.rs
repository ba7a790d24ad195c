//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::config::SESSION_HEADER;
use crate::{api, error, models, services};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "TARA Assistant Server",
        version = "0.1.0",
        description = "LLM-assisted script generation, test generation and execution, TARA chat and FA diagram transcription"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Coding endpoints
        api::coding::generate_script,
        api::coding::debug_script,
        api::coding::modify_script,
        api::coding::diff_check,
        api::coding::explain_changes,
        api::coding::compare_versions,
        api::coding::list_scripts,
        api::coding::get_script,
        api::coding::delete_script,
        api::coding::list_versions,
        // Testing endpoints
        api::testing::generate_tests,
        api::testing::execute_tests,
        api::testing::improve_tests,
        api::testing::list_test_cases,
        api::testing::get_test_case,
        api::testing::list_test_results,
        // Chat endpoints
        api::chat::start_session,
        api::chat::send_message,
        api::chat::history,
        api::chat::clear_history,
        api::chat::ecu_explanation,
        api::chat::damage_scenario,
        api::chat::threat_scenario,
        api::chat::attack_pattern,
        // FA transcriber endpoints
        api::fa_transcriber::transcribe,
        api::fa_transcriber::get_transcription,
        api::fa_transcriber::list_image_transcriptions,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            api::StreamQuery,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Coding
            models::Script,
            models::ScriptVersion,
            services::diff::DiffTag,
            services::diff::DiffLine,
            api::coding::GenerateScriptRequest,
            api::coding::GenerateScriptResponse,
            api::coding::DebugScriptRequest,
            api::coding::DebugScriptResponse,
            api::coding::ModifyScriptRequest,
            api::coding::ModifyScriptResponse,
            api::coding::TextPairRequest,
            api::coding::DiffCheckResponse,
            api::coding::ExplainChangesResponse,
            api::coding::CompareVersionsRequest,
            api::coding::CompareVersionsResponse,
            api::coding::ScriptListResponse,
            api::coding::ScriptResponse,
            api::coding::VersionListResponse,
            api::coding::DeleteScriptResponse,
            // Testing
            models::TestCase,
            models::TestResult,
            models::TestStatus,
            api::testing::GenerateTestsRequest,
            api::testing::TestCaseResponse,
            api::testing::ExecuteTestsRequest,
            api::testing::TestResultResponse,
            api::testing::ImproveTestsRequest,
            api::testing::TestCaseListResponse,
            api::testing::TestCaseDetailResponse,
            api::testing::TestResultListResponse,
            // Chat
            models::ChatRole,
            models::ChatMessage,
            api::chat::SendMessageRequest,
            api::chat::SendMessageResponse,
            api::chat::SessionResponse,
            api::chat::HistoryResponse,
            api::chat::ClearHistoryResponse,
            api::chat::EcuExplanationRequest,
            api::chat::DamageScenarioRequest,
            api::chat::ThreatScenarioRequest,
            api::chat::AttackPatternRequest,
            // FA transcriber
            models::TranscriptionItem,
            models::TranscriptionSummary,
            models::Transcription,
            api::fa_transcriber::UploadDiagramForm,
            api::fa_transcriber::TranscribeResponse,
            api::fa_transcriber::TranscriptionResponse,
            api::fa_transcriber::TranscriptionListResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Coding", description = "Script generation, debugging, modification and versions"),
        (name = "Testing", description = "Test generation, execution and improvement"),
        (name = "Chat", description = "TARA chat assistant"),
        (name = "FA Transcriber", description = "Functional architecture diagram transcription")
    ),
    modifiers(&SessionAddon)
)]
pub struct ApiDoc;

/// Add the chat session header as a security scheme.
struct SessionAddon;

impl utoipa::Modify for SessionAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new(SESSION_HEADER),
                    ),
                ),
            );
        }
    }
}

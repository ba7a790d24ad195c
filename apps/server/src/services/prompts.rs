//! Prompt templates for every LLM-backed operation.
//!
//! Each builder returns a `Prompt` (system + user text) together with the
//! sampling options the operation uses. Templates are plain functions of their
//! inputs so identical requests always produce identical prompts.

use crate::services::llm::CompletionOptions;

/// Marker the debug prompt asks the model to put before the corrected code.
pub const FIXED_CODE_MARKER: &str = "### FIXED CODE ###";
/// Marker the modify prompt asks the model to put before the modified code.
pub const MODIFIED_CODE_MARKER: &str = "### MODIFIED CODE ###";
/// Module name the generated tests import the script under test from.
pub const SCRIPT_MODULE: &str = "script_to_test";

pub const CODE_OPTIONS: CompletionOptions = CompletionOptions::new(0.7, 2048);
pub const TEST_OPTIONS: CompletionOptions = CompletionOptions::new(0.5, 2048);
pub const CHAT_OPTIONS: CompletionOptions = CompletionOptions::new(0.7, 1500);
pub const TRANSCRIBE_OPTIONS: CompletionOptions = CompletionOptions::new(0.3, 2500);

/// A system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn generate_script(language: &str, requirements: &str) -> Prompt {
    Prompt {
        system: format!(
            "You are an expert programmer specializing in {language} for automotive \
             cybersecurity applications. Generate a complete, well-commented and functional \
             script based ONLY on the user's requirements. Output ONLY the raw code for the \
             script, without any introduction, explanation or surrounding text."
        ),
        user: format!("Language: {language}\nRequirements: {requirements}"),
    }
}

pub fn debug_script(script: &str, error_log: Option<&str>) -> Prompt {
    let mut user = format!("Script to debug:\n```\n{script}\n```");
    if let Some(log) = error_log.filter(|l| !l.trim().is_empty()) {
        user.push_str(&format!("\n\nObserved error output:\n```\n{log}\n```"));
    }

    Prompt {
        system: format!(
            "You are an expert code debugger. Analyze the script, identify bugs, security \
             vulnerabilities and other issues. First write a concise analysis of the problems \
             found. Then write a line containing exactly `{FIXED_CODE_MARKER}` followed by the \
             complete corrected script as raw code. Do not add anything after the code."
        ),
        user,
    }
}

pub fn modify_script(script: &str, modification_request: &str) -> Prompt {
    Prompt {
        system: format!(
            "You are an expert programmer. Modify the script based ONLY on the user's \
             instructions. First write a short explanation of what you changed. Then write a \
             line containing exactly `{MODIFIED_CODE_MARKER}` followed by the complete modified \
             script as raw code. Do not add anything after the code."
        ),
        user: format!(
            "Script to modify:\n```\n{script}\n```\n\nModification instructions: {modification_request}"
        ),
    }
}

pub fn explain_changes(original: &str, modified: &str) -> Prompt {
    Prompt {
        system: "You are an expert code reviewer. Explain the differences between the original \
                 and the modified script: what changed, why it likely changed, and any impact on \
                 behaviour or security. Be concise and use a bulleted list."
            .to_string(),
        user: format!(
            "Original script:\n```\n{original}\n```\n\nModified script:\n```\n{modified}\n```"
        ),
    }
}

/// Test framework suggested to the model for a language.
fn test_framework(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "python" => "pytest",
        "c++" | "cpp" => "Google Test or Catch2",
        "javascript" | "typescript" => "Jest or Mocha",
        "rust" => "the built-in #[test] harness",
        _ => "a standard testing framework",
    }
}

pub fn generate_tests(script: &str, language: &str, requirements: Option<&str>) -> Prompt {
    let requirements = requirements
        .filter(|r| !r.trim().is_empty())
        .unwrap_or("Generate standard unit tests.");
    let framework = test_framework(language);

    let mut system = format!(
        "You are an expert software tester specializing in writing test cases for {language} \
         code in automotive and cybersecurity contexts. Generate comprehensive test cases using \
         {framework} for the script. Cover edge cases, common vulnerabilities where applicable, \
         and standard functionality. Output ONLY the raw test code, without any introduction, \
         explanation or surrounding text."
    );
    if language.eq_ignore_ascii_case("python") {
        system.push_str(&format!(
            " The script is saved as `{SCRIPT_MODULE}.py` next to the tests; import what you \
             need from the `{SCRIPT_MODULE}` module."
        ));
    }

    Prompt {
        system,
        user: format!(
            "Script ({language}):\n```\n{script}\n```\n\nGenerate test cases for this script with \
             these requirements: {requirements}"
        ),
    }
}

pub fn improve_tests(script: &str, tests: &str, language: &str, test_output: &str) -> Prompt {
    let framework = test_framework(language);

    Prompt {
        system: format!(
            "You are an expert software tester. Improve the {language} test suite so that it is \
             correct for the script, fixing tests that fail because of mistakes in the tests \
             themselves and adding missing coverage. Keep using {framework}. Output ONLY the \
             complete raw test code."
        ),
        user: format!(
            "Script:\n```\n{script}\n```\n\nCurrent tests:\n```\n{tests}\n```\n\nLast test run \
             output:\n```\n{test_output}\n```"
        ),
    }
}

/// System prompt for FA diagram transcription.
pub const TRANSCRIBE_SYSTEM: &str = "You are an expert in functional architecture (FA) diagram \
analysis for automotive systems. Extract the information from a car architecture diagram that \
shows ECUs and their communications. Follow these instructions precisely:

1. Identify the Sheet Name at the top-left corner of the diagram.
2. Identify all rectangular boxes; these are ECUs and act as Start and End ECUs along the \
direction of communication.
3. Identify any rhombus shapes; these are relay ECUs.
4. Find all messages inside blue dashed boundaries near the communication lines between ECUs.
5. Locate any red dashed lines that enclose ECUs or messages, with their identifiers.
6. For each message determine the exact message content, the Start ECU and End ECU at the \
endpoints of the communication, the Sending ECU and Receiving ECU nearest to the message, and \
any Dashed Line identifier associated with it.
7. For multiple messages between the same ECUs, emit one row per message.

Respond with a JSON array only. Each object must have exactly these keys: \"Sheet Name\", \
\"Message\", \"Start ECU\", \"End ECU\", \"Sending ECU\", \"Receiving ECU\", \"Dashed Line\". \
Do not include any text outside the JSON array.";

/// Text part sent alongside the diagram image.
pub const TRANSCRIBE_INSTRUCTION: &str =
    "Analyze this functional architecture diagram and extract the information as instructed.";

/// Base system prompt for the TARA chat.
pub const CHAT_SYSTEM: &str = "You are TARA Assistant, an expert in automotive cybersecurity, \
ECUs (Electronic Control Units), Threat Analysis and Risk Assessment (TARA) per ISO/SAE 21434, \
STRIDE and related security concepts. Be helpful, accurate and concise.";

/// Focus of a chat turn; selects an addendum to the system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    #[default]
    General,
    Ecu,
    Damage,
    Threat,
    Attack,
}

impl QueryType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "general" => Some(Self::General),
            "ecu" => Some(Self::Ecu),
            "damage" => Some(Self::Damage),
            "threat" => Some(Self::Threat),
            "attack" => Some(Self::Attack),
            _ => None,
        }
    }

    fn addendum(&self) -> Option<&'static str> {
        match self {
            Self::General => None,
            Self::Ecu => Some(
                "Focus on ECU function, typical interfaces (CAN, LIN, FlexRay, Automotive \
                 Ethernet), the assets an ECU holds and its attack surface.",
            ),
            Self::Damage => Some(
                "Focus on damage scenarios: describe the adverse consequence for road users, \
                 rate safety, financial, operational and privacy impact, and tie each scenario \
                 to the violated confidentiality, integrity or availability property.",
            ),
            Self::Threat => Some(
                "Focus on threat scenarios structured by STRIDE: name the threatened asset, \
                 the attacker's capability and the entry point, and reference the damage \
                 scenario the threat leads to.",
            ),
            Self::Attack => Some(
                "Focus on attack paths: list the concrete attack steps from entry point to \
                 target, rate attack feasibility (elapsed time, expertise, knowledge, window of \
                 opportunity, equipment) and suggest mitigations.",
            ),
        }
    }
}

/// Chat system prompt for a query type.
pub fn chat_system(query_type: QueryType) -> String {
    match query_type.addendum() {
        Some(addendum) => format!("{CHAT_SYSTEM}\n\n{addendum}"),
        None => CHAT_SYSTEM.to_string(),
    }
}

pub fn ecu_explanation(ecu_type: &str) -> String {
    format!(
        "Explain the {ecu_type} ECU: its purpose in the vehicle, the networks and interfaces it \
         uses, the security-relevant assets it handles and the main cybersecurity risks for it."
    )
}

pub fn damage_scenario(component: &str, cia_aspect: &str) -> String {
    format!(
        "Generate damage scenarios for the component \"{component}\" where its {cia_aspect} is \
         compromised. For each scenario give a title, a description, and the impact rating for \
         safety, financial, operational and privacy."
    )
}

pub fn threat_scenario(component: &str, stride_aspect: &str) -> String {
    format!(
        "Generate threat scenarios for the component \"{component}\" in the STRIDE category \
         {stride_aspect}. For each scenario give the threatened asset, the attack vector, the \
         preconditions, and the resulting damage."
    )
}

pub fn attack_pattern(dataflow_description: &str) -> String {
    format!(
        "Given this data flow:\n{dataflow_description}\n\nDescribe the attack patterns that \
         apply to it. For each pattern list the attack steps, rate the attack feasibility and \
         propose mitigations."
    )
}

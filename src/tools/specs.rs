// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SPECS DAS FERRAMENTAS (JSON SCHEMA)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::ModelVariant;
use crate::quick::MAX_URLS;

/// Descrição de uma ferramenta para o agente.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    /// Nome usado em `invoke`
    pub name: &'static str,
    /// Descrição para o modelo
    pub description: &'static str,
    /// JSON Schema dos argumentos
    pub parameters: Value,
}

fn model_schema() -> Value {
    let names: Vec<&str> = ModelVariant::ALL.iter().map(|m| m.as_str()).collect();
    json!({
        "type": "string",
        "enum": names,
        "description": "Model variant (defaults to the configured one)"
    })
}

fn language_schema() -> Value {
    json!({
        "type": "string",
        "description": "Response language as a locale tag, e.g. \"en\" or \"ja\""
    })
}

fn research_properties() -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    props.insert(
        "query".into(),
        json!({"type": "string", "description": "Research question"}),
    );
    props.insert(
        "format_instructions".into(),
        json!({"type": "string", "description": "Free-form guidance for the report format"}),
    );
    props.insert("language".into(), language_schema());
    props
}

fn object(properties: serde_json::Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn interaction_id_schema() -> Value {
    let mut props = serde_json::Map::new();
    props.insert(
        "interaction_id".into(),
        json!({"type": "string", "description": "Id returned when the research was started"}),
    );
    object(props, &["interaction_id"])
}

fn quick_schema(with_urls: bool, urls_required: bool) -> Value {
    let mut props = serde_json::Map::new();
    props.insert(
        "query".into(),
        json!({"type": "string", "description": "Question or analysis instruction"}),
    );
    if with_urls {
        props.insert(
            "urls".into(),
            json!({
                "type": "array",
                "items": {"type": "string", "format": "uri"},
                "maxItems": MAX_URLS,
                "description": "Absolute http(s) URLs to read"
            }),
        );
    }
    props.insert("model".into(), model_schema());
    props.insert("language".into(), language_schema());
    let required: &[&str] = if urls_required {
        &["urls", "query"]
    } else {
        &["query"]
    };
    object(props, required)
}

/// Specs de todas as ferramentas, na ordem de exibição.
pub fn tool_specs() -> Vec<ToolSpec> {
    let mut deep = research_properties();
    deep.insert(
        "wait_for_completion".into(),
        json!({"type": "boolean", "default": true, "description": "Wait for the report instead of returning the id right away"}),
    );
    deep.insert(
        "timeout".into(),
        json!({"type": "integer", "minimum": 1, "description": "Local wait ceiling in seconds"}),
    );

    let mut followup = serde_json::Map::new();
    followup.insert(
        "previous_interaction_id".into(),
        json!({"type": "string", "description": "Id of a completed research"}),
    );
    followup.insert(
        "question".into(),
        json!({"type": "string", "description": "Follow-up question"}),
    );

    vec![
        ToolSpec {
            name: "deep_research",
            description: "Run a multi-step deep research task with web sources. Takes minutes; returns the report with citations, or the interaction id when not waiting or when the local wait ends.",
            parameters: object(deep, &["query"]),
        },
        ToolSpec {
            name: "start_deep_research",
            description: "Submit a deep research task and return its interaction id immediately.",
            parameters: object(research_properties(), &["query"]),
        },
        ToolSpec {
            name: "get_research_status",
            description: "Get the status of a research task: pending, running, completed, failed or cancelled.",
            parameters: interaction_id_schema(),
        },
        ToolSpec {
            name: "get_research_result",
            description: "Get the report and citations of a completed research task.",
            parameters: interaction_id_schema(),
        },
        ToolSpec {
            name: "ask_followup_question",
            description: "Ask a follow-up question about a completed research task, keeping its context.",
            parameters: object(followup, &["previous_interaction_id", "question"]),
        },
        ToolSpec {
            name: "stream_research",
            description: "Run a deep research task while streaming; returns the report plus the agent's thought summaries.",
            parameters: object(research_properties(), &["query"]),
        },
        ToolSpec {
            name: "quick_search",
            description: "Fast web search grounded answer with citations. Seconds, not minutes.",
            parameters: quick_schema(false, false),
        },
        ToolSpec {
            name: "analyze_urls",
            description: "Read up to 20 specific URLs and answer a question about them.",
            parameters: quick_schema(true, true),
        },
        ToolSpec {
            name: "search_and_analyze",
            description: "Web search combined with reading specific reference URLs in one call.",
            parameters: quick_schema(true, false),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_reject_extra_keys() {
        for spec in tool_specs() {
            assert_eq!(spec.parameters["additionalProperties"], false, "{}", spec.name);
            assert!(spec.parameters["required"].as_array().is_some());
        }
    }

    #[test]
    fn test_model_enum_lists_variants() {
        let specs = tool_specs();
        let quick = specs.iter().find(|s| s.name == "quick_search").unwrap();
        assert_eq!(
            quick.parameters["properties"]["model"]["enum"],
            json!(["gemini-3-flash-preview", "gemini-3-pro-preview"])
        );
    }
}

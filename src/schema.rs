//! Response schema selection
//!
//! Maps a role onto the structured shape requested from the provider, and
//! parses the provider's JSON into the matching `StructuredResponse` variant.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::InvocationError;
use crate::models::{Decision, GraphLayout, GraphSpec, Role, SchemaKind, StructuredResponse};

/// Function name used for graphs that arrive in the legacy single-graph shape.
pub const LEGACY_GRAPH_NAME: &str = "main";

/// Pure, total mapping from role to schema.
pub fn select_schema(role: Role) -> SchemaKind {
    match role {
        Role::Interviewer => SchemaKind::InterviewDecision,
        Role::GenerateCode => SchemaKind::CodeWithGraphs,
        Role::OptimizeCode => SchemaKind::Optimization,
        Role::Assistant => SchemaKind::PlainText,
    }
}

#[derive(Debug, Deserialize)]
struct PlainTextBody {
    response: String,
}

#[derive(Debug, Deserialize)]
struct InterviewBody {
    decision: Decision,
    response: String,
}

#[derive(Debug, Deserialize)]
struct CodeWithGraphsBody {
    python_code: String,
    reasoning: String,
    #[serde(default)]
    cfg_graphs: Option<Vec<GraphSpec>>,
    #[serde(default)]
    dfg_graphs: Option<Vec<GraphSpec>>,
    // legacy single-graph shape
    #[serde(default)]
    cfg_graph: Option<String>,
    #[serde(default)]
    dfg_graph: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OptimizationBody {
    python_code: String,
    reasoning: String,
}

impl SchemaKind {
    /// JSON schema sent to the provider as a strict structured-output format.
    pub fn json_schema(&self) -> Value {
        let graph_list = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "function_name": { "type": "string" },
                    "dot_source": { "type": "string" }
                },
                "required": ["function_name", "dot_source"],
                "additionalProperties": false
            }
        });

        match self {
            SchemaKind::PlainText => json!({
                "type": "object",
                "properties": {
                    "response": { "type": "string" }
                },
                "required": ["response"],
                "additionalProperties": false
            }),
            SchemaKind::InterviewDecision => json!({
                "type": "object",
                "properties": {
                    "decision": { "type": "string", "enum": ["N/A", "1", "0"] },
                    "response": { "type": "string" }
                },
                "required": ["decision", "response"],
                "additionalProperties": false
            }),
            SchemaKind::CodeWithGraphs => json!({
                "type": "object",
                "properties": {
                    "python_code": { "type": "string" },
                    "reasoning": { "type": "string" },
                    "cfg_graphs": graph_list,
                    "dfg_graphs": graph_list
                },
                "required": ["python_code", "reasoning", "cfg_graphs", "dfg_graphs"],
                "additionalProperties": false
            }),
            SchemaKind::Optimization => json!({
                "type": "object",
                "properties": {
                    "python_code": { "type": "string" },
                    "reasoning": { "type": "string" }
                },
                "required": ["python_code", "reasoning"],
                "additionalProperties": false
            }),
        }
    }

    /// Parse provider output into the variant this schema implies.
    pub fn parse(&self, value: Value) -> Result<StructuredResponse, InvocationError> {
        let mismatch =
            |e: serde_json::Error| InvocationError::SchemaMismatch(format!("{}: {}", self, e));

        match self {
            SchemaKind::PlainText => {
                let body: PlainTextBody = serde_json::from_value(value).map_err(mismatch)?;
                Ok(StructuredResponse::PlainText {
                    response: body.response,
                })
            }
            SchemaKind::InterviewDecision => {
                let body: InterviewBody = serde_json::from_value(value).map_err(mismatch)?;
                Ok(StructuredResponse::InterviewDecision {
                    decision: body.decision,
                    response: body.response,
                })
            }
            SchemaKind::CodeWithGraphs => {
                let body: CodeWithGraphsBody = serde_json::from_value(value).map_err(mismatch)?;
                Ok(code_with_graphs(body))
            }
            SchemaKind::Optimization => {
                let body: OptimizationBody = serde_json::from_value(value).map_err(mismatch)?;
                Ok(StructuredResponse::Optimization {
                    python_code: body.python_code,
                    reasoning: body.reasoning,
                })
            }
        }
    }
}

fn code_with_graphs(body: CodeWithGraphsBody) -> StructuredResponse {
    let is_legacy = body.cfg_graphs.is_none()
        && body.dfg_graphs.is_none()
        && (body.cfg_graph.is_some() || body.dfg_graph.is_some());

    if is_legacy {
        let single = |dot: Option<String>| -> Vec<GraphSpec> {
            dot.filter(|d| !d.trim().is_empty())
                .map(|dot_source| GraphSpec {
                    function_name: LEGACY_GRAPH_NAME.to_string(),
                    dot_source,
                })
                .into_iter()
                .collect()
        };

        return StructuredResponse::CodeWithGraphs {
            python_code: body.python_code,
            reasoning: body.reasoning,
            cfg_graphs: single(body.cfg_graph),
            dfg_graphs: single(body.dfg_graph),
            layout: GraphLayout::Single,
        };
    }

    StructuredResponse::CodeWithGraphs {
        python_code: body.python_code,
        reasoning: body.reasoning,
        cfg_graphs: body.cfg_graphs.unwrap_or_default(),
        dfg_graphs: body.dfg_graphs.unwrap_or_default(),
        layout: GraphLayout::PerFunction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: [Role; 4] = [
        Role::Interviewer,
        Role::GenerateCode,
        Role::OptimizeCode,
        Role::Assistant,
    ];

    #[test]
    fn test_select_schema_mapping() {
        assert_eq!(select_schema(Role::Interviewer), SchemaKind::InterviewDecision);
        assert_eq!(select_schema(Role::GenerateCode), SchemaKind::CodeWithGraphs);
        assert_eq!(select_schema(Role::OptimizeCode), SchemaKind::Optimization);
        assert_eq!(select_schema(Role::Assistant), SchemaKind::PlainText);
    }

    #[test]
    fn test_select_schema_is_stable() {
        for role in ROLES {
            assert_eq!(select_schema(role), select_schema(role));
        }
    }

    #[test]
    fn test_json_schemas_are_strict_objects() {
        for role in ROLES {
            let schema = select_schema(role).json_schema();
            assert_eq!(schema["type"], "object");
            assert_eq!(schema["additionalProperties"], false);
            assert!(schema["required"].as_array().is_some_and(|r| !r.is_empty()));
        }
    }

    #[test]
    fn test_parse_interview_decision() {
        let parsed = SchemaKind::InterviewDecision
            .parse(json!({ "decision": "1", "response": "Thank you..." }))
            .unwrap();
        assert_eq!(
            parsed,
            StructuredResponse::InterviewDecision {
                decision: Decision::Accept,
                response: "Thank you...".into(),
            }
        );
    }

    #[test]
    fn test_parse_code_with_graphs_per_function() {
        let parsed = SchemaKind::CodeWithGraphs
            .parse(json!({
                "python_code": "def add(a,b): return a+b",
                "reasoning": "simple",
                "cfg_graphs": [{ "function_name": "add", "dot_source": "digraph CFG_add {A->B;}" }],
                "dfg_graphs": [{ "function_name": "add", "dot_source": "digraph DFG_add {a->r;}" }]
            }))
            .unwrap();

        let StructuredResponse::CodeWithGraphs { cfg_graphs, dfg_graphs, layout, .. } = parsed else {
            panic!("wrong variant");
        };
        assert_eq!(layout, GraphLayout::PerFunction);
        assert_eq!(cfg_graphs[0].function_name, "add");
        assert_eq!(dfg_graphs.len(), 1);
    }

    #[test]
    fn test_parse_code_with_graphs_legacy_shape() {
        let parsed = SchemaKind::CodeWithGraphs
            .parse(json!({
                "python_code": "print(1)",
                "reasoning": "r",
                "cfg_graph": "digraph CFG {A->B;}",
                "dfg_graph": "digraph DFG {x->y;}"
            }))
            .unwrap();

        let StructuredResponse::CodeWithGraphs { cfg_graphs, layout, .. } = parsed else {
            panic!("wrong variant");
        };
        assert_eq!(layout, GraphLayout::Single);
        assert_eq!(cfg_graphs.len(), 1);
        assert_eq!(cfg_graphs[0].function_name, LEGACY_GRAPH_NAME);
    }

    #[test]
    fn test_parse_mismatch_is_schema_error() {
        let err = SchemaKind::Optimization
            .parse(json!({ "response": "just text" }))
            .unwrap_err();
        assert!(matches!(err, InvocationError::SchemaMismatch(_)));
        assert!(!err.is_transient());
    }
}

//! Response interpretation
//!
//! Turns a typed provider response into what must be persisted, which side
//! effects to run and the client payload. Pure; the service executes the plans.

use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{InvocationError, OrchestrationError, RenderError};
use crate::interview::Transition;
use crate::models::{
    ArtifactRefs, ChatPayload, ContentBlock, ConversationTurn, GraphKind, GraphLayout, GraphSpec,
    InterviewState, Outcome, Role, StructuredResponse,
};
use crate::schema::select_schema;
use crate::Result;

/// Request-scoped facts about the caller.
#[derive(Debug, Clone, Copy)]
pub struct UserContext<'a> {
    pub user_id: Uuid,
    pub conversation_ref: &'a str,
    pub state: InterviewState,
    pub query: &'a str,
}

/// One graph to render, keyed by (user, conversation, message, function, kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub function_name: String,
    pub kind: GraphKind,
    pub dot_source: String,
    /// `<user>/<conversation>/<message>`
    pub namespace: String,
    /// `<function>_<kind>`
    pub name: String,
}

#[derive(Debug)]
pub struct RenderResult {
    pub request: RenderRequest,
    pub outcome: std::result::Result<String, RenderError>,
}

/// Writes to apply as one atomic unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistencePlan {
    pub turn: ConversationTurn,
    pub decision: Option<Outcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideEffectPlan {
    pub renders: Vec<RenderRequest>,
    /// Notify the user of this outcome once the decision is durably recorded.
    pub notify: Option<Outcome>,
}

#[derive(Debug, Clone)]
pub struct Interpretation {
    pub persistence: PersistencePlan,
    pub side_effects: SideEffectPlan,
    pub payload: ChatPayload,
    layout: GraphLayout,
}

/// Interpret `resp` for `role`. The variant must match the role's schema.
pub fn interpret(
    resp: StructuredResponse,
    role: Role,
    ctx: &UserContext<'_>,
) -> Result<Interpretation> {
    let expected = select_schema(role);
    if resp.kind() != expected {
        return Err(OrchestrationError::Invocation(InvocationError::SchemaMismatch(
            format!("expected {} for role {}, got {}", expected, role, resp.kind()),
        )));
    }

    let mut decision_outcome = None;
    let mut renders = Vec::new();
    let mut layout = GraphLayout::PerFunction;

    let (turn, payload) = match resp {
        StructuredResponse::PlainText { response } => {
            let turn = ConversationTurn::new(ctx.user_id, ctx.query.to_string(), response.clone(), expected);
            let payload = ChatPayload {
                role,
                kind: expected,
                content: vec![ContentBlock::Text { text: response.clone() }],
                message: response,
                decision: None,
            };
            (turn, payload)
        }

        StructuredResponse::InterviewDecision { decision, response } => {
            if let Transition::Conclude(outcome) = ctx.state.transition(decision)? {
                debug!(user_id = %ctx.user_id, %outcome, "Interview concluded by model decision");
                decision_outcome = Some(outcome);
            }

            let mut turn = ConversationTurn::new(ctx.user_id, ctx.query.to_string(), response.clone(), expected);
            turn.decision = Some(decision);

            let payload = ChatPayload {
                role,
                kind: expected,
                content: vec![ContentBlock::Text { text: response.clone() }],
                message: response,
                decision: Some(decision),
            };
            (turn, payload)
        }

        StructuredResponse::CodeWithGraphs {
            python_code,
            reasoning,
            cfg_graphs,
            dfg_graphs,
            layout: graph_layout,
        } => {
            layout = graph_layout;

            let (turn, payload) = code_turn(ctx, role, expected, python_code, reasoning);

            let namespace = format!("{}/{}/{}", ctx.user_id, ctx.conversation_ref, turn.turn_id);
            renders.extend(render_requests(&namespace, GraphKind::Cfg, cfg_graphs));
            renders.extend(render_requests(&namespace, GraphKind::Dfg, dfg_graphs));

            (turn, payload)
        }

        StructuredResponse::Optimization { python_code, reasoning } => {
            code_turn(ctx, role, expected, python_code, reasoning)
        }
    };

    Ok(Interpretation {
        persistence: PersistencePlan {
            turn,
            decision: decision_outcome,
        },
        side_effects: SideEffectPlan {
            renders,
            notify: decision_outcome,
        },
        payload,
        layout,
    })
}

fn code_turn(
    ctx: &UserContext<'_>,
    role: Role,
    kind: crate::models::SchemaKind,
    python_code: String,
    reasoning: String,
) -> (ConversationTurn, ChatPayload) {
    let mut turn = ConversationTurn::new(ctx.user_id, ctx.query.to_string(), reasoning.clone(), kind);
    turn.python_code = Some(python_code.clone());
    turn.reasoning = Some(reasoning.clone());

    let payload = ChatPayload {
        role,
        kind,
        content: vec![
            ContentBlock::Text { text: reasoning.clone() },
            ContentBlock::Code {
                language: "python".to_string(),
                code: python_code,
            },
        ],
        message: reasoning,
        decision: None,
    };

    (turn, payload)
}

fn render_requests(
    namespace: &str,
    kind: GraphKind,
    graphs: Vec<GraphSpec>,
) -> impl Iterator<Item = RenderRequest> + '_ {
    graphs.into_iter().map(move |graph| RenderRequest {
        name: format!("{}_{}", graph.function_name, kind.as_str()),
        namespace: namespace.to_string(),
        function_name: graph.function_name,
        kind,
        dot_source: graph.dot_source,
    })
}

impl Interpretation {
    /// Attach render results to the turn and the payload. Failed renders are
    /// dropped; the rest of the turn is unaffected.
    pub fn attach_renders(&mut self, results: Vec<RenderResult>) {
        let mut cfg: BTreeMap<String, String> = BTreeMap::new();
        let mut dfg: BTreeMap<String, String> = BTreeMap::new();

        for result in results {
            let RenderRequest { function_name, kind, .. } = result.request;

            let path = match result.outcome {
                Ok(path) => path,
                Err(e) => {
                    warn!(
                        function = %function_name,
                        graph = kind.as_str(),
                        "Graph render failed, omitting artifact: {}",
                        e
                    );
                    continue;
                }
            };

            match kind {
                GraphKind::Cfg => cfg.insert(function_name.clone(), path.clone()),
                GraphKind::Dfg => dfg.insert(function_name.clone(), path.clone()),
            };

            self.payload.content.push(ContentBlock::Image {
                url: path,
                function_name,
                graph: kind,
            });
        }

        let turn = &mut self.persistence.turn;
        turn.cfg_artifacts = artifact_refs(self.layout, cfg);
        turn.dfg_artifacts = artifact_refs(self.layout, dfg);
    }
}

fn artifact_refs(layout: GraphLayout, paths: BTreeMap<String, String>) -> Option<ArtifactRefs> {
    if paths.is_empty() {
        return None;
    }

    Some(match layout {
        GraphLayout::PerFunction => ArtifactRefs::PerFunction(paths),
        GraphLayout::Single => ArtifactRefs::Single(paths.into_values().next().unwrap_or_default()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, SchemaKind};

    fn ctx(state: InterviewState) -> UserContext<'static> {
        UserContext {
            user_id: Uuid::new_v4(),
            conversation_ref: "conv_1",
            state,
            query: "hello",
        }
    }

    fn add_graphs() -> StructuredResponse {
        StructuredResponse::CodeWithGraphs {
            python_code: "def add(a,b): return a+b".into(),
            reasoning: "adds".into(),
            cfg_graphs: vec![GraphSpec {
                function_name: "add".into(),
                dot_source: "digraph CFG_add {A->B;}".into(),
            }],
            dfg_graphs: vec![GraphSpec {
                function_name: "add".into(),
                dot_source: "digraph DFG_add {a->r;}".into(),
            }],
            layout: GraphLayout::PerFunction,
        }
    }

    #[test]
    fn test_plain_text_persists_message_only() {
        let interp = interpret(
            StructuredResponse::PlainText { response: "hi there".into() },
            Role::Assistant,
            &ctx(InterviewState::Open),
        )
        .unwrap();

        let turn = &interp.persistence.turn;
        assert_eq!(turn.message, "hello");
        assert_eq!(turn.response, "hi there");
        assert!(turn.python_code.is_none() && turn.decision.is_none());
        assert!(interp.side_effects.renders.is_empty());
        assert!(interp.side_effects.notify.is_none());
    }

    #[test]
    fn test_pending_decision_does_not_transition() {
        let interp = interpret(
            StructuredResponse::InterviewDecision {
                decision: Decision::Pending,
                response: "Tell me about yourself".into(),
            },
            Role::Interviewer,
            &ctx(InterviewState::Open),
        )
        .unwrap();

        assert_eq!(interp.persistence.decision, None);
        assert_eq!(interp.side_effects.notify, None);
        assert_eq!(interp.payload.decision, Some(Decision::Pending));
    }

    #[test]
    fn test_terminal_decision_plans_persist_and_notify() {
        let interp = interpret(
            StructuredResponse::InterviewDecision {
                decision: Decision::Reject,
                response: "Thank you for your time".into(),
            },
            Role::Interviewer,
            &ctx(InterviewState::Open),
        )
        .unwrap();

        assert_eq!(interp.persistence.decision, Some(Outcome::Rejected));
        assert_eq!(interp.side_effects.notify, Some(Outcome::Rejected));
        assert_eq!(interp.persistence.turn.decision, Some(Decision::Reject));
    }

    #[test]
    fn test_decision_after_conclusion_is_rejected() {
        let result = interpret(
            StructuredResponse::InterviewDecision {
                decision: Decision::Accept,
                response: "again".into(),
            },
            Role::Interviewer,
            &ctx(InterviewState::Accepted),
        );
        assert!(matches!(result, Err(OrchestrationError::AlreadyConcluded)));
    }

    #[test]
    fn test_variant_must_match_role() {
        let result = interpret(
            StructuredResponse::PlainText { response: "x".into() },
            Role::GenerateCode,
            &ctx(InterviewState::Open),
        );
        assert!(matches!(
            result,
            Err(OrchestrationError::Invocation(InvocationError::SchemaMismatch(_)))
        ));
    }

    #[test]
    fn test_code_with_graphs_emits_keyed_render_requests() {
        let context = ctx(InterviewState::Open);
        let interp = interpret(add_graphs(), Role::GenerateCode, &context).unwrap();

        let renders = &interp.side_effects.renders;
        assert_eq!(renders.len(), 2);
        assert_eq!(renders[0].kind, GraphKind::Cfg);
        assert_eq!(renders[0].name, "add_cfg");
        assert_eq!(renders[1].name, "add_dfg");
        assert_eq!(
            renders[0].namespace,
            format!("{}/conv_1/{}", context.user_id, interp.persistence.turn.turn_id)
        );
    }

    #[test]
    fn test_attach_renders_orders_blocks_and_keys_artifacts() {
        let mut interp = interpret(add_graphs(), Role::GenerateCode, &ctx(InterviewState::Open)).unwrap();
        let renders = std::mem::take(&mut interp.side_effects.renders);

        let results = renders
            .into_iter()
            .map(|request| RenderResult {
                outcome: Ok(format!("/graphs/{}.png", request.name)),
                request,
            })
            .collect();
        interp.attach_renders(results);

        let kinds: Vec<&str> = interp
            .payload
            .content
            .iter()
            .map(|b| match b {
                ContentBlock::Text { .. } => "text",
                ContentBlock::Code { .. } => "code",
                ContentBlock::Image { graph: GraphKind::Cfg, .. } => "cfg",
                ContentBlock::Image { graph: GraphKind::Dfg, .. } => "dfg",
            })
            .collect();
        assert_eq!(kinds, vec!["text", "code", "cfg", "dfg"]);

        let turn = &interp.persistence.turn;
        assert_eq!(turn.cfg_artifacts.as_ref().unwrap().get("add"), Some("/graphs/add_cfg.png"));
        assert_eq!(turn.dfg_artifacts.as_ref().unwrap().get("add"), Some("/graphs/add_dfg.png"));
    }

    #[test]
    fn test_failed_render_keeps_code_and_reasoning() {
        let mut interp = interpret(add_graphs(), Role::GenerateCode, &ctx(InterviewState::Open)).unwrap();
        let renders = std::mem::take(&mut interp.side_effects.renders);

        let results = renders
            .into_iter()
            .map(|request| RenderResult {
                outcome: if request.kind == GraphKind::Cfg {
                    Err(RenderError::InvalidSource("syntax error".into()))
                } else {
                    Ok("/graphs/add_dfg.png".into())
                },
                request,
            })
            .collect();
        interp.attach_renders(results);

        let turn = &interp.persistence.turn;
        assert_eq!(turn.python_code.as_deref(), Some("def add(a,b): return a+b"));
        assert_eq!(turn.reasoning.as_deref(), Some("adds"));
        assert!(turn.cfg_artifacts.is_none());
        assert!(turn.dfg_artifacts.is_some());
        assert_eq!(interp.payload.content.len(), 3);
    }

    #[test]
    fn test_legacy_layout_attaches_single_reference() {
        let resp = StructuredResponse::CodeWithGraphs {
            python_code: "print(1)".into(),
            reasoning: "r".into(),
            cfg_graphs: vec![GraphSpec {
                function_name: "main".into(),
                dot_source: "digraph G {A->B;}".into(),
            }],
            dfg_graphs: vec![],
            layout: GraphLayout::Single,
        };
        let mut interp = interpret(resp, Role::GenerateCode, &ctx(InterviewState::Open)).unwrap();
        let renders = std::mem::take(&mut interp.side_effects.renders);
        let results = renders
            .into_iter()
            .map(|request| RenderResult {
                outcome: Ok("/graphs/cfg.png".into()),
                request,
            })
            .collect();
        interp.attach_renders(results);

        assert_eq!(
            interp.persistence.turn.cfg_artifacts,
            Some(ArtifactRefs::Single("/graphs/cfg.png".into()))
        );
        assert_eq!(interp.persistence.turn.dfg_artifacts, None);
    }

    #[test]
    fn test_optimization_has_no_graphs() {
        let interp = interpret(
            StructuredResponse::Optimization {
                python_code: "intVar_1 = 1".into(),
                reasoning: "renamed".into(),
            },
            Role::OptimizeCode,
            &ctx(InterviewState::Open),
        )
        .unwrap();

        assert_eq!(interp.persistence.turn.kind, SchemaKind::Optimization);
        assert_eq!(interp.persistence.turn.python_code.as_deref(), Some("intVar_1 = 1"));
        assert!(interp.side_effects.renders.is_empty());
    }
}

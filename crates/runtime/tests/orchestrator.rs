mod common;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{ScriptedProvider, text_reply, tool_call_reply};
use mcp::ToolContent;
use runtime::llm::{ProviderError, Role, ToolChoice, ToolOutcome};
use runtime::{
    CleanupReport, Error, Orchestrator, PLAIN_SYSTEM_PROMPT, SessionError, SessionState,
    TOOL_FIRST_SYSTEM_PROMPT, ToolCatalog, ToolDescriptor, ToolInvocationRequest,
    ToolInvocationResult, ToolSession, lifecycle,
};
use serde_json::json;

const KB_TEXT: &str = "===============Here is the retrieved knowledge base:\n\nQ1: **What is MCP?**\nA1: MCP (Model Context Protocol) is a protocol for connecting AI models with external tools and data sources.\n\n";

struct FakeSession {
    state: SessionState,
    list_fails: bool,
    invoked: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl FakeSession {
    fn connected() -> Self {
        Self {
            state: SessionState::Connected,
            list_fails: false,
            invoked: Arc::default(),
            closes: Arc::default(),
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: json!({"type": "object"}),
        }
    }
}

impl ToolSession for FakeSession {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn list_tools(&self) -> Result<ToolCatalog, SessionError> {
        if self.list_fails {
            return Err(SessionError::Protocol(mcp::Error::ServerExited));
        }
        Ok(ToolCatalog::new([
            Self::descriptor("get_knowledge_base"),
            Self::descriptor("add"),
        ]))
    }

    async fn invoke(
        &self,
        request: &ToolInvocationRequest,
    ) -> Result<ToolInvocationResult, SessionError> {
        self.invoked.lock().unwrap().push(request.tool_name.clone());

        let ok = |text: String| ToolInvocationResult {
            call_id: request.call_id.clone(),
            content: vec![ToolContent::text(text)],
            success: true,
        };

        match request.tool_name.as_str() {
            "get_knowledge_base" => Ok(ok(KB_TEXT.to_string())),
            "add" => {
                let a = request.arguments["a"].as_f64().unwrap_or_default();
                let b = request.arguments["b"].as_f64().unwrap_or_default();
                Ok(ok((a + b).to_string()))
            }
            "hang_up" => Err(SessionError::Protocol(mcp::Error::Timeout)),
            other => Ok(ToolInvocationResult::failure(
                &request.call_id,
                format!("unknown tool: {other}"),
            )),
        }
    }

    async fn close(&mut self) -> CleanupReport {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.state = SessionState::Closed;
        CleanupReport::default()
    }
}

#[tokio::test]
async fn no_session_answers_in_a_single_call() {
    let orchestrator = Orchestrator::<_, FakeSession>::new(
        ScriptedProvider::new([text_reply("Paris.")]),
        None,
    );

    let answer = orchestrator.resolve("Capital of France?").await.unwrap();
    assert_eq!(answer, "Paris.");

    let requests = orchestrator.provider().requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].tools.is_empty());
    assert_eq!(requests[0].messages[0].text(), PLAIN_SYSTEM_PROMPT);
    assert_eq!(requests[0].messages[1].text(), "Capital of France?");
}

#[tokio::test]
async fn disconnected_session_runs_degraded() {
    let mut session = FakeSession::connected();
    session.state = SessionState::Disconnected;
    let invoked = session.invoked.clone();

    let orchestrator = Orchestrator::new(ScriptedProvider::new([text_reply("ok")]), Some(session));
    assert!(!orchestrator.has_tools());

    orchestrator.resolve("hi").await.unwrap();
    assert_eq!(orchestrator.provider().requests().len(), 1);
    assert!(invoked.lock().unwrap().is_empty());
}

#[tokio::test]
async fn direct_answer_is_returned_unchanged() {
    let orchestrator = Orchestrator::new(
        ScriptedProvider::new([text_reply("  Hello there.\n")]),
        Some(FakeSession::connected()),
    );

    let answer = orchestrator.resolve("hello").await.unwrap();
    assert_eq!(answer, "  Hello there.\n");

    let requests = orchestrator.provider().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tools, ["get_knowledge_base", "add"]);
    assert_eq!(requests[0].tool_choice, ToolChoice::Auto);
    assert_eq!(requests[0].messages[0].text(), TOOL_FIRST_SYSTEM_PROMPT);
}

#[tokio::test]
async fn tool_calls_take_exactly_two_provider_calls() {
    let session = FakeSession::connected();
    let invoked = session.invoked.clone();
    let orchestrator = Orchestrator::new(
        ScriptedProvider::new([
            tool_call_reply(&[
                ("call_1", "get_knowledge_base", "{}"),
                ("call_2", "add", r#"{"a": 1, "b": 2}"#),
            ]),
            text_reply("MCP connects models to tools. Also, 1 + 2 = 3."),
        ]),
        Some(session),
    );

    let answer = orchestrator.resolve("What is MCP? And 1 + 2?").await.unwrap();
    assert_eq!(answer, "MCP connects models to tools. Also, 1 + 2 = 3.");
    assert_eq!(*invoked.lock().unwrap(), ["get_knowledge_base", "add"]);

    let requests = orchestrator.provider().requests();
    assert_eq!(requests.len(), 2);

    let second = &requests[1];
    assert_eq!(second.tool_choice, ToolChoice::None);
    assert_eq!(second.tools, requests[0].tools);

    let roles: Vec<Role> = second.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::System, Role::User, Role::Assistant, Role::Tool, Role::Tool]
    );
    assert_eq!(second.messages[2].tool_calls().len(), 2);

    let results: Vec<_> = second.messages[3..]
        .iter()
        .flat_map(|m| m.tool_results())
        .collect();
    assert_eq!(results[0].tool_call_id, "call_1");
    assert_eq!(results[0].outcome, ToolOutcome::success(KB_TEXT));
    assert_eq!(results[1].tool_call_id, "call_2");
    assert_eq!(results[1].outcome, ToolOutcome::success("3"));
}

#[tokio::test]
async fn failing_tools_are_reported_to_the_model() {
    let orchestrator = Orchestrator::new(
        ScriptedProvider::new([
            tool_call_reply(&[("c1", "frobnicate", "{}"), ("c2", "hang_up", "{}")]),
            text_reply("Sorry, the tools are unavailable."),
        ]),
        Some(FakeSession::connected()),
    );

    let answer = orchestrator.resolve("frobnicate please").await.unwrap();
    assert_eq!(answer, "Sorry, the tools are unavailable.");

    let requests = orchestrator.provider().requests();
    let results: Vec<_> = requests[1]
        .messages
        .iter()
        .flat_map(|m| m.tool_results())
        .collect();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.outcome.is_error()));
    assert_eq!(
        results[0].outcome.to_model_text(),
        "Error: unknown tool: frobnicate"
    );
    assert!(results[1].outcome.to_model_text().contains("timeout"));
}

#[tokio::test]
async fn malformed_arguments_never_reach_the_host() {
    let session = FakeSession::connected();
    let invoked = session.invoked.clone();
    let orchestrator = Orchestrator::new(
        ScriptedProvider::new([
            tool_call_reply(&[("c1", "add", "{\"a\": 1,")]),
            text_reply("I could not add those."),
        ]),
        Some(session),
    );

    orchestrator.resolve("add 1 and ?").await.unwrap();
    assert!(invoked.lock().unwrap().is_empty());

    let requests = orchestrator.provider().requests();
    let result = requests[1].messages[3].tool_results()[0].clone();
    assert_eq!(result.tool_call_id, "c1");
    assert!(result.outcome.is_error());
}

#[tokio::test]
async fn discovery_failure_falls_back_to_plain_answer() {
    let mut session = FakeSession::connected();
    session.list_fails = true;

    let orchestrator = Orchestrator::new(
        ScriptedProvider::new([text_reply("From memory.")]),
        Some(session),
    );

    assert_eq!(orchestrator.resolve("What is MCP?").await.unwrap(), "From memory.");
    let requests = orchestrator.provider().requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].tools.is_empty());
    assert_eq!(requests[0].messages[0].text(), PLAIN_SYSTEM_PROMPT);
}

#[tokio::test]
async fn provider_errors_propagate() {
    let orchestrator = Orchestrator::new(
        ScriptedProvider::new([Err(ProviderError::Api {
            status: 401,
            message: "Bad credentials".to_string(),
        })]),
        Some(FakeSession::connected()),
    );

    match orchestrator.resolve("hi").await {
        Err(Error::Provider(e)) => assert!(e.is_auth()),
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn second_call_failure_propagates() {
    let orchestrator = Orchestrator::new(
        ScriptedProvider::new([tool_call_reply(&[("c1", "get_knowledge_base", "")])]),
        Some(FakeSession::connected()),
    );

    let err = orchestrator.resolve("What is MCP?").await.unwrap_err();
    assert!(matches!(err, Error::Provider(ProviderError::InvalidResponse(_))));
    assert_eq!(orchestrator.provider().requests().len(), 2);
}

#[tokio::test]
async fn shutdown_closes_once() {
    let session = FakeSession::connected();
    let closes = session.closes.clone();
    let mut orchestrator = Orchestrator::new(ScriptedProvider::default(), Some(session));

    assert!(orchestrator.has_tools());
    orchestrator.shutdown().await;
    assert!(orchestrator.shutdown().await.is_noop());

    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(!orchestrator.has_tools());
}

#[tokio::test]
async fn scoped_closes_after_failed_body() {
    let session = FakeSession::connected();
    let closes = session.closes.clone();
    let orchestrator = Orchestrator::new(ScriptedProvider::default(), Some(session));

    let result = lifecycle::scoped(orchestrator, async |o| o.resolve("anything").await).await;

    assert!(result.is_err());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

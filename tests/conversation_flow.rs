//! End-to-end tests for the conversation loop and its HTTP surface.
//!
//! A scripted provider stands in for the model; checkpoints and profiles live
//! in an in-memory libSQL database and the knowledge graph in a temp file.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use mentor_agent::agent::{AgentDeps, AgentService};
use mentor_agent::api::{ApiState, api_routes};
use mentor_agent::config::AgentConfig;
use mentor_agent::context::LearnerContext;
use mentor_agent::error::LlmError;
use mentor_agent::knowledge::KnowledgeGraph;
use mentor_agent::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};
use mentor_agent::store::{LibSqlBackend, ProfileStore};
use mentor_agent::tools::ToolRegistry;
use mentor_agent::tools::builtin::register_builtin_tools;
use mentor_agent::workflow::{AwaitKind, RunScope};

const GRAPH: &str = r#"{
  "concepts": {
    "A.1": {"label": "Supervised learning", "section": "A", "prerequisites": []},
    "B.3": {"label": "Gradient descent", "section": "B", "prerequisites": ["A.1"]}
  }
}"#;

const REPORT: &str = "The learner described the gradient as a slope and linked it to descent.";

/// Stub model: structured completions and tool turns are replayed in order.
#[derive(Default)]
struct StubLlm {
    completions: Mutex<VecDeque<Value>>,
    turns: Mutex<VecDeque<ToolCompletionResponse>>,
    /// Message roles of every tool-calling request, in order.
    transcripts: Mutex<Vec<Vec<Role>>>,
}

impl StubLlm {
    fn json(self, value: Value) -> Self {
        self.completions.lock().unwrap().push_back(value);
        self
    }

    fn say(self, text: &str) -> Self {
        self.turns.lock().unwrap().push_back(ToolCompletionResponse {
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
        });
        self
    }

    fn call(self, id: &str, name: &str, arguments: Value) -> Self {
        self.turns.lock().unwrap().push_back(ToolCompletionResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }],
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::ToolUse,
        });
        self
    }

    fn exhausted() -> LlmError {
        LlmError::RequestFailed {
            provider: "stub".to_string(),
            reason: "script exhausted".to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let value = self
            .completions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(Self::exhausted)?;
        Ok(CompletionResponse {
            content: value.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.transcripts
            .lock()
            .unwrap()
            .push(request.messages.iter().map(|m| m.role).collect());
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(Self::exhausted)
    }
}

struct Fixture {
    service: Arc<AgentService>,
    llm: Arc<StubLlm>,
    _dir: tempfile::TempDir,
}

async fn fixture(llm: StubLlm) -> Fixture {
    let dir = tempfile::TempDir::new().unwrap();
    let graph_path = dir.path().join("graph.json");
    tokio::fs::write(&graph_path, GRAPH).await.unwrap();

    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let profiles: Arc<dyn ProfileStore> = db.clone();
    let graph = Arc::new(KnowledgeGraph::new(graph_path));

    let registry = Arc::new(ToolRegistry::new());
    register_builtin_tools(&registry, Arc::clone(&profiles), Arc::clone(&graph)).unwrap();

    let llm = Arc::new(llm);
    let service = AgentService::new(
        AgentDeps {
            llm: llm.clone(),
            store: db,
            registry,
            learner: Arc::new(LearnerContext::new(Arc::clone(&profiles), graph)),
        },
        &AgentConfig::default(),
    )
    .unwrap();

    Fixture {
        service: Arc::new(service),
        llm,
        _dir: dir,
    }
}

fn scope() -> RunScope {
    RunScope::new("thread-1", "learner-1")
}

fn plan(titles: &[&str]) -> Value {
    let steps: Vec<_> = titles
        .iter()
        .map(|t| json!({"title": t, "description": format!("{t} walkthrough"), "learning_objective": "explain it"}))
        .collect();
    json!({"steps": steps})
}

fn evals(titles: &[&str]) -> Value {
    let evals: Vec<_> = titles
        .iter()
        .map(|t| json!({"title": t, "description": format!("checks {t}")}))
        .collect();
    json!({"evals": evals})
}

/// Script for: teach one step, stop, quiz once, report.
fn lesson_then_quiz() -> StubLlm {
    StubLlm::default()
        .call("c1", "LearningSession", json!({"input": "gradient descent"}))
        .json(plan(&["Intuition", "Update rule"]))
        .json(json!({"title": "Intuition", "content": "Gradients point uphill; we step the other way."}))
        .say("Want a quick check of what you learned?")
        .call("c2", "AssessmentSession", json!({"input": "gradient descent"}))
        .json(evals(&["Direction of descent"]))
        .json(json!({
            "title": "Direction",
            "content": "Why do we step against the gradient?",
            "evaluation_criteria": ["mentions steepest ascent"]
        }))
        .json(json!({"action_type": "report", "action": {"report": REPORT}}))
        .say("Nice work. Marking gradient descent as mastered.")
}

#[tokio::test]
async fn lesson_then_assessment_through_the_service() {
    let f = fixture(lesson_then_quiz()).await;
    let svc = &f.service;

    let reply = svc.chat(&scope(), "Teach me gradient descent").await.unwrap();
    assert_eq!(reply.content, "Gradients point uphill; we step the other way.");
    assert_eq!(reply.awaiting, Some(AwaitKind::Decision));
    assert_eq!(
        svc.session_state("thread-1").await.unwrap().as_deref(),
        Some("learning_session")
    );
    let steps = svc.learning_plan("thread-1").await.unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].title, "Intuition");

    let reply = svc.chat(&scope(), "stop").await.unwrap();
    assert_eq!(reply.content, "Want a quick check of what you learned?");
    assert_eq!(reply.awaiting, None);
    assert_eq!(svc.session_state("thread-1").await.unwrap(), None);

    let reply = svc.chat(&scope(), "Sure, quiz me").await.unwrap();
    assert_eq!(reply.content, "Why do we step against the gradient?");
    assert_eq!(reply.awaiting, Some(AwaitKind::Answer));
    assert_eq!(
        svc.session_state("thread-1").await.unwrap().as_deref(),
        Some("evaluation_session")
    );

    let reply = svc
        .chat(&scope(), "Because the gradient is the steepest ascent")
        .await
        .unwrap();
    assert_eq!(reply.content, "Nice work. Marking gradient descent as mastered.");
    assert_eq!(svc.session_state("thread-1").await.unwrap(), None);

    let assessment = svc.assessment_plan("thread-1").await.unwrap();
    assert_eq!(assessment.len(), 1);
    assert_eq!(assessment[0].title, "Direction of descent");

    // The assessment result reaches the model as the tool message for its call.
    let conversation = svc.conversation("thread-1").await.unwrap().unwrap();
    let result = conversation
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c2"))
        .unwrap();
    let report: Value = serde_json::from_str(&result.content).unwrap();
    assert!(report["report"].as_str().unwrap().starts_with(REPORT));
    assert_eq!(report["answer"][0], "Because the gradient is the steepest ascent");
}

#[tokio::test]
async fn profile_tool_output_is_visible_in_the_summary() {
    let llm = StubLlm::default()
        .call(
            "c1",
            "store_profile",
            json!({"content": "Ada", "profile_type": "name"}),
        )
        .say("Nice to meet you, Ada.");
    let f = fixture(llm).await;

    let reply = f.service.chat(&scope(), "I'm Ada").await.unwrap();
    assert_eq!(reply.content, "Nice to meet you, Ada.");

    let summary = f.service.profile_summary("learner-1").await.unwrap();
    assert!(summary.starts_with("Name: Ada"));
    assert!(summary.contains("Goals: "));

    // Entries are namespaced per user.
    let other = f.service.profile_summary("someone-else").await.unwrap();
    assert!(other.starts_with("Name: \n"));
}

#[tokio::test]
async fn failed_model_call_leaves_the_thread_usable() {
    let llm = StubLlm::default().say("Hello!");
    let f = fixture(llm).await;

    f.service.chat(&scope(), "hi").await.unwrap();
    // Script exhausted: the turn fails but the earlier exchange survives.
    assert!(f.service.chat(&scope(), "again").await.is_err());

    let conversation = f.service.conversation("thread-1").await.unwrap().unwrap();
    assert_eq!(conversation.last_reply(), Some("Hello!"));
}

#[tokio::test]
async fn session_that_fails_to_start_is_retried_on_the_next_turn() {
    let llm = StubLlm::default()
        .call("c1", "LearningSession", json!({"input": "gradient descent"}))
        .json(json!({"steps": []}))
        .json(plan(&["Intuition"]))
        .json(json!({"title": "Intuition", "content": "Gradients point uphill."}))
        .say("Let's pick it up later.");
    let f = fixture(llm).await;

    // Empty plan fails validation inside the session.
    assert!(f.service.chat(&scope(), "Teach me gradient descent").await.is_err());

    let reply = f.service.chat(&scope(), "hello?").await.unwrap();
    assert_eq!(reply.content, "Gradients point uphill.");
    assert_eq!(reply.awaiting, Some(AwaitKind::Decision));

    let reply = f.service.chat(&scope(), "stop").await.unwrap();
    assert_eq!(reply.content, "Let's pick it up later.");

    // The tool call is answered before the model sees the conversation again.
    let transcripts = f.llm.transcripts.lock().unwrap().clone();
    assert_eq!(transcripts.len(), 2);
    assert_eq!(
        transcripts[1],
        vec![Role::System, Role::User, Role::Assistant, Role::Tool]
    );
}

// ── HTTP ────────────────────────────────────────────────────────────

/// Serve the API on a random port; returns its base URL.
async fn serve(service: Arc<AgentService>) -> String {
    let app = api_routes(
        ApiState {
            service,
            scope: scope(),
        },
        "http://localhost:3000",
    )
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

async fn get_json(client: &reqwest::Client, url: &str) -> Value {
    client.get(url).send().await.unwrap().json().await.unwrap()
}

#[tokio::test]
async fn http_surface_reports_session_progress() {
    let f = fixture(lesson_then_quiz()).await;
    let base = serve(Arc::clone(&f.service)).await;
    let client = reqwest::Client::new();

    assert_eq!(
        get_json(&client, &format!("{base}/session-state")).await,
        json!({"next": ""})
    );
    assert_eq!(get_json(&client, &format!("{base}/plan")).await, json!({"plan": []}));
    assert_eq!(
        get_json(&client, &format!("{base}/assessment")).await,
        json!({"plan": []})
    );

    let reply: Value = client
        .get(format!("{base}/chat"))
        .query(&[("user_input", "Teach me gradient descent")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        reply,
        json!({"response": "Gradients point uphill; we step the other way."})
    );

    assert_eq!(
        get_json(&client, &format!("{base}/session-state")).await,
        json!({"next": "learning session"})
    );
    let plan = get_json(&client, &format!("{base}/plan")).await;
    assert_eq!(plan["plan"][1]["title"], "Update rule");
    assert_eq!(plan["plan"][1]["learning_objective"], "explain it");

    let profile = get_json(&client, &format!("{base}/profile")).await;
    assert!(profile["profile"].as_str().unwrap().starts_with("Name: "));
}

#[tokio::test]
async fn http_chat_failure_is_a_500_with_detail() {
    let f = fixture(StubLlm::default()).await;
    let base = serve(Arc::clone(&f.service)).await;

    let response = reqwest::Client::new()
        .get(format!("{base}/chat"))
        .query(&[("user_input", "hello")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("script exhausted"));
}

#[tokio::test]
async fn cors_allows_the_frontend_origin() {
    let f = fixture(StubLlm::default()).await;
    let base = serve(Arc::clone(&f.service)).await;

    let response = reqwest::Client::new()
        .get(format!("{base}/session-state"))
        .header("Origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );
}

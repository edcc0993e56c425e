//! Integration tests for the negotiation pipeline
//!
//! Runs whole turns against a temporary SQLite database and a wiremock
//! server standing in for the generative service:
//! - Asking turns leave the roadmap untouched
//! - Finalizing turns replace the roadmap exactly, even from prose-wrapped output
//! - Rejected answers and service failures write no history
//! - Missing credentials never reach the network
//! - History stays bounded and turns of one conversation never interleave

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use sdk::errors::{ErrorClass, NegotiationError, WaymarkErrorExt};
use sdk::types::{Author, CorrelationId, StepDraft};
use waymark_engine::config::OpenAIConfig;
use waymark_engine::db::Database;
use waymark_engine::llm::ollama::OllamaGateway;
use waymark_engine::llm::openai::OpenAIGateway;
use waymark_engine::llm::ModelGateway;
use waymark_engine::negotiation::{
    HistoryStore, NegotiationEngine, NegotiationSettings, RoadmapStore,
};
use waymark_engine::secrets::SecretString;

const TEST_KEY: &str = "sk-test-0123456789abcdefghij";

const ASKING: &str =
    r#"{"isAsking":true,"roadmap":null,"question":"Do you want to remove Pack and Move?"}"#;

const FINAL_AB: &str = r#"{"isAsking":false,"roadmap":{"name":"Demenagement","description":"Move to Lyon","steps":[{"name":"A","description":"first"},{"name":"B","description":"second"}]},"question":null}"#;

struct Fixture {
    _temp_dir: TempDir,
    db: Database,
    roadmap_id: i64,
}

async fn setup() -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("waymark.db")).await.unwrap();

    let roadmap = db
        .roadmaps()
        .create_roadmap(
            "Demenagement",
            "Move to Lyon",
            &[
                StepDraft::new("Find flat", "Visit listings"),
                StepDraft::new("Pack", "Boxes and tape"),
                StepDraft::new("Move", "Rent a truck"),
            ],
        )
        .await
        .unwrap();

    Fixture {
        _temp_dir: temp_dir,
        db,
        roadmap_id: roadmap.id,
    }
}

fn openai_gateway(mock_uri: &str, api_key: Option<&str>) -> Arc<dyn ModelGateway> {
    let config = OpenAIConfig {
        base_url: mock_uri.to_string(),
        ..OpenAIConfig::default()
    };
    Arc::new(
        OpenAIGateway::new(
            config,
            api_key.map(SecretString::from),
            Duration::from_secs(5),
        )
        .unwrap(),
    )
}

fn engine_with(
    fixture: &Fixture,
    gateway: Arc<dyn ModelGateway>,
    cap: usize,
    timeout: Duration,
) -> NegotiationEngine {
    NegotiationEngine::new(
        Arc::new(fixture.db.history(cap)),
        Arc::new(fixture.db.roadmaps()),
        gateway,
        NegotiationSettings {
            history_window: cap,
            request_timeout: timeout,
        },
    )
}

fn engine(fixture: &Fixture, mock_uri: &str) -> NegotiationEngine {
    engine_with(
        fixture,
        openai_gateway(mock_uri, Some(TEST_KEY)),
        10,
        Duration::from_secs(5),
    )
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

async fn mount_completion(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
        .mount(server)
        .await;
}

async fn step_names(fixture: &Fixture) -> Vec<String> {
    fixture
        .db
        .roadmaps()
        .get_roadmap_with_steps(fixture.roadmap_id)
        .await
        .unwrap()
        .unwrap()
        .steps
        .into_iter()
        .map(|s| s.name)
        .collect()
}

async fn history_count(fixture: &Fixture, cid: &CorrelationId) -> usize {
    fixture.db.history(10).count(cid).await.unwrap()
}

#[tokio::test]
async fn test_openai_request_carries_key_and_schema() {
    let server = MockServer::start().await;
    let fixture = setup().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", format!("Bearer {}", TEST_KEY).as_str()))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": "roadmap_negotiation", "strict": true }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(ASKING)))
        .expect(1)
        .mount(&server)
        .await;

    let reply = engine(&fixture, &server.uri())
        .negotiate_roadmap_edit(
            "drop the last two",
            fixture.roadmap_id,
            &CorrelationId::for_roadmap(fixture.roadmap_id),
        )
        .await
        .unwrap();

    assert!(reply.is_asking);
}

#[tokio::test]
async fn test_asking_does_not_mutate_roadmap() {
    let server = MockServer::start().await;
    let fixture = setup().await;
    mount_completion(&server, ASKING).await;
    let cid = CorrelationId::for_roadmap(fixture.roadmap_id);

    let before = fixture
        .db
        .roadmaps()
        .get_roadmap_with_steps(fixture.roadmap_id)
        .await
        .unwrap();

    let reply = engine(&fixture, &server.uri())
        .negotiate_roadmap_edit("drop the last two", fixture.roadmap_id, &cid)
        .await
        .unwrap();

    let after = fixture
        .db
        .roadmaps()
        .get_roadmap_with_steps(fixture.roadmap_id)
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&reply).unwrap(),
        json!({
            "isAsking": true,
            "roadmap": null,
            "question": "Do you want to remove Pack and Move?"
        })
    );
    assert_eq!(before, after);
    assert_eq!(history_count(&fixture, &cid).await, 2);
}

#[tokio::test]
async fn test_prose_wrapped_finalize_replaces_exactly() {
    let server = MockServer::start().await;
    let fixture = setup().await;
    mount_completion(
        &server,
        &format!("Sure! Here's the result: {} Hope that helps!", FINAL_AB),
    )
    .await;
    let cid = CorrelationId::for_roadmap(fixture.roadmap_id);

    let old_ids: Vec<i64> = fixture
        .db
        .roadmaps()
        .get_roadmap_with_steps(fixture.roadmap_id)
        .await
        .unwrap()
        .unwrap()
        .steps
        .iter()
        .map(|s| s.id)
        .collect();

    let reply = engine(&fixture, &server.uri())
        .negotiate_roadmap_edit("yes, just A and B", fixture.roadmap_id, &cid)
        .await
        .unwrap();

    assert!(!reply.is_asking);
    assert_eq!(reply.roadmap.as_ref().unwrap().name, "Demenagement");
    assert_eq!(step_names(&fixture).await, vec!["A", "B"]);

    let stored = fixture
        .db
        .roadmaps()
        .get_roadmap_with_steps(fixture.roadmap_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.steps.iter().all(|s| !old_ids.contains(&s.id)));
    assert!(stored.steps.iter().all(|s| !s.completed));
}

#[tokio::test]
async fn test_unparseable_answer_writes_no_history() {
    let server = MockServer::start().await;
    let fixture = setup().await;
    mount_completion(&server, "I'm not sure what you mean.").await;
    let cid = CorrelationId::for_roadmap(fixture.roadmap_id);

    let err = engine(&fixture, &server.uri())
        .negotiate_roadmap_edit("do the thing", fixture.roadmap_id, &cid)
        .await
        .unwrap_err();

    assert!(matches!(err, NegotiationError::Parse(_)));
    assert_eq!(err.class(), ErrorClass::Retry);
    assert_eq!(history_count(&fixture, &cid).await, 0);
    assert_eq!(step_names(&fixture).await, vec!["Find flat", "Pack", "Move"]);
}

#[tokio::test]
async fn test_schema_violation_names_field() {
    let server = MockServer::start().await;
    let fixture = setup().await;
    mount_completion(&server, r#"{"isAsking": true, "question": null, "roadmap": null}"#).await;
    let cid = CorrelationId::for_roadmap(fixture.roadmap_id);

    let err = engine(&fixture, &server.uri())
        .negotiate_roadmap_edit("rename it", fixture.roadmap_id, &cid)
        .await
        .unwrap_err();

    assert_eq!(err.offending_field(), Some("question"));
    assert_eq!(history_count(&fixture, &cid).await, 0);
}

#[tokio::test]
async fn test_service_errors_are_classified() {
    let server = MockServer::start().await;
    let fixture = setup().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string(format!(
            "Incorrect API key provided: {}",
            TEST_KEY
        )))
        .mount(&server)
        .await;
    let cid = CorrelationId::new_thread();

    let err = engine(&fixture, &server.uri())
        .negotiate_roadmap_edit("hello", fixture.roadmap_id, &cid)
        .await
        .unwrap_err();

    match &err {
        NegotiationError::Service(msg) => assert!(!msg.contains(TEST_KEY), "{}", msg),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(history_count(&fixture, &cid).await, 0);
}

#[tokio::test]
async fn test_server_error_is_service_error() {
    let server = MockServer::start().await;
    let fixture = setup().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = engine(&fixture, &server.uri())
        .negotiate_roadmap_edit("hello", fixture.roadmap_id, &CorrelationId::new_thread())
        .await
        .unwrap_err();

    assert!(matches!(err, NegotiationError::Service(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_missing_credential_never_reaches_network() {
    let server = MockServer::start().await;
    let fixture = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(ASKING)))
        .expect(0)
        .mount(&server)
        .await;

    let engine = engine_with(
        &fixture,
        openai_gateway(&server.uri(), None),
        10,
        Duration::from_secs(5),
    );

    let err = engine
        .negotiate_roadmap_edit("hello", fixture.roadmap_id, &CorrelationId::new_thread())
        .await
        .unwrap_err();

    assert!(matches!(err, NegotiationError::Credential(_)));
    assert!(!err.is_recoverable());
    assert_eq!(err.class(), ErrorClass::Misconfigured);
}

#[tokio::test]
async fn test_unknown_roadmap_never_reaches_network() {
    let server = MockServer::start().await;
    let fixture = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(ASKING)))
        .expect(0)
        .mount(&server)
        .await;

    let err = engine(&fixture, &server.uri())
        .negotiate_roadmap_edit("hello", 4242, &CorrelationId::new_thread())
        .await
        .unwrap_err();

    assert!(matches!(err, NegotiationError::NotFound(4242)));
    assert_eq!(err.class(), ErrorClass::FixRequest);
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let server = MockServer::start().await;
    let fixture = setup().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(ASKING))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let engine = engine_with(
        &fixture,
        openai_gateway(&server.uri(), Some(TEST_KEY)),
        10,
        Duration::from_millis(200),
    );
    let cid = CorrelationId::new_thread();

    let err = engine
        .negotiate_roadmap_edit("hello", fixture.roadmap_id, &cid)
        .await
        .unwrap_err();

    assert!(matches!(err, NegotiationError::Service(_)));
    assert_eq!(history_count(&fixture, &cid).await, 0);
}

#[tokio::test]
async fn test_history_is_replayed_and_bounded() {
    let server = MockServer::start().await;
    let fixture = setup().await;
    mount_completion(&server, ASKING).await;

    let cap = 3;
    let engine = engine_with(
        &fixture,
        openai_gateway(&server.uri(), Some(TEST_KEY)),
        cap,
        Duration::from_secs(5),
    );
    let cid = CorrelationId::for_roadmap(fixture.roadmap_id);

    for utterance in ["first", "second", "third"] {
        engine
            .negotiate_roadmap_edit(utterance, fixture.roadmap_id, &cid)
            .await
            .unwrap();
    }

    // Six entries written, the three newest kept
    let history = fixture.db.history(cap);
    assert_eq!(history.count(&cid).await.unwrap(), cap);
    let entries = history.load_recent(&cid, 10).await.unwrap();
    let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec![ASKING, "third", ASKING]);

    // The third request saw the bounded transcript before the new utterance
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    let body: Value = requests[2].body_json().unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages.len(), 1 + cap + 1);
    assert_eq!(messages.last().unwrap()["content"], "third");
    assert_eq!(messages[messages.len() - 2]["content"], ASKING);
}

#[tokio::test]
async fn test_concurrent_turns_on_one_conversation_do_not_interleave() {
    let server = MockServer::start().await;
    let fixture = setup().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(ASKING))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let engine = engine(&fixture, &server.uri());
    let cid = CorrelationId::for_roadmap(fixture.roadmap_id);

    let (a, b) = tokio::join!(
        engine.negotiate_roadmap_edit("one", fixture.roadmap_id, &cid),
        engine.negotiate_roadmap_edit("two", fixture.roadmap_id, &cid),
    );
    a.unwrap();
    b.unwrap();

    let entries = fixture.db.history(10).load_recent(&cid, 10).await.unwrap();
    let authors: Vec<Author> = entries.iter().map(|e| e.author).collect();
    assert_eq!(
        authors,
        vec![Author::User, Author::Assistant, Author::User, Author::Assistant]
    );
}

#[tokio::test]
async fn test_ollama_gateway_end_to_end() {
    let server = MockServer::start().await;
    let fixture = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({ "model": "llama3.1:8b", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1:8b",
            "created_at": "2024-08-04T19:22:45.499127Z",
            "message": { "role": "assistant", "content": FINAL_AB },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Arc::new(
        OllamaGateway::new(server.uri(), "llama3.1:8b", Duration::from_secs(5)).unwrap(),
    );
    let engine = engine_with(&fixture, gateway, 10, Duration::from_secs(5));

    engine
        .negotiate_roadmap_edit(
            "replace everything with A and B",
            fixture.roadmap_id,
            &CorrelationId::for_user(7),
        )
        .await
        .unwrap();

    assert_eq!(step_names(&fixture).await, vec!["A", "B"]);
}

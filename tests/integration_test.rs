//! End-to-end tests driving a full agent process (`AgentCore` + broker +
//! checkpoint store) the way `sam demo` does, exercising the turn
//! algorithm's externally observable behavior rather than its internals.

use std::sync::Arc;
use std::time::Duration;

use sam_broker::InMemoryBroker;
use sam_checkpoint::CheckpointStore;
use sam_config::AgentConfig;
use sam_core::{AgentCore, AgentDeps};
use sam_interfaces::DefaultAccessValidator;
use sam_testing::{InMemoryArtifactStore, ScriptedLlmClient, StaticToolRegistry};
use sam_types::{
    topics, A2aMessage, JsonRpcRequest, JsonRpcResponse, MessageMetadata, MessagePart,
    PeerResponseEnvelope, PeerResultPayload, SamError, TaskState, ToolResult, UserProperties,
};

fn config(agent_name: &str) -> Arc<AgentConfig> {
    Arc::new(AgentConfig {
        agent_name: agent_name.to_string(),
        namespace: "acme".to_string(),
        ..Default::default()
    })
}

/// Like `spawn_agent`, but over a caller-supplied broker and checkpoint
/// store so a test can simulate a process restart: stop the old core,
/// reopen the same on-disk checkpoint database, and start a new core
/// that restores suspended tasks from it rather than from memory.
fn spawn_agent_with(
    agent_name: &str,
    broker: Arc<InMemoryBroker>,
    checkpoint: Arc<CheckpointStore>,
    llm: ScriptedLlmClient,
    tools: StaticToolRegistry,
) -> tokio::task::JoinHandle<Result<(), SamError>> {
    let access = Arc::new(DefaultAccessValidator { own_agent_name: agent_name.to_string() });
    let deps = Arc::new(AgentDeps::new(
        config(agent_name),
        broker as Arc<dyn sam_broker::BrokerAdapter>,
        checkpoint,
        Arc::new(llm) as Arc<dyn sam_interfaces::LlmClient>,
        Arc::new(tools) as Arc<dyn sam_interfaces::ToolRegistry>,
        Arc::new(InMemoryArtifactStore::new()) as Arc<dyn sam_interfaces::ArtifactStore>,
        access as Arc<dyn sam_interfaces::AccessValidator>,
    ));
    let core = AgentCore::new(deps);
    tokio::spawn(core.run())
}

/// Spins up a full `AgentCore` over an in-memory broker and in-memory
/// checkpoint store, wired with the given LLM and tool doubles, and
/// returns the broker plus a handle to the background run loop.
fn spawn_agent(
    agent_name: &str,
    llm: ScriptedLlmClient,
    tools: StaticToolRegistry,
) -> (Arc<InMemoryBroker>, tokio::task::JoinHandle<Result<(), SamError>>) {
    let broker = Arc::new(InMemoryBroker::new());
    let checkpoint = Arc::new(CheckpointStore::open_in_memory().unwrap());
    let access = Arc::new(DefaultAccessValidator { own_agent_name: agent_name.to_string() });
    let deps = Arc::new(AgentDeps::new(
        config(agent_name),
        broker.clone() as Arc<dyn sam_broker::BrokerAdapter>,
        checkpoint,
        Arc::new(llm) as Arc<dyn sam_interfaces::LlmClient>,
        Arc::new(tools) as Arc<dyn sam_interfaces::ToolRegistry>,
        Arc::new(InMemoryArtifactStore::new()) as Arc<dyn sam_interfaces::ArtifactStore>,
        access as Arc<dyn sam_interfaces::AccessValidator>,
    ));
    let core = AgentCore::new(deps);
    let handle = tokio::spawn(core.run());
    (broker, handle)
}

async fn send_message(broker: &InMemoryBroker, namespace: &str, agent_name: &str, prompt: &str, reply_to: &str) {
    let message = A2aMessage {
        role: "user".to_string(),
        message_id: uuid::Uuid::new_v4().to_string(),
        kind: "message".to_string(),
        parts: vec![MessagePart::Text { text: prompt.to_string() }],
        metadata: MessageMetadata { agent_name: Some(agent_name.to_string()), parent_task_id: None, extra: Default::default() },
    };
    let request = JsonRpcRequest::new_message_send(uuid::Uuid::new_v4().to_string(), message);
    let request_topic = topics::request(namespace, agent_name);
    broker
        .publish(
            &request_topic,
            serde_json::to_value(&request).unwrap(),
            UserProperties {
                reply_to: Some(reply_to.to_string()),
                status_to: None,
                client_id: Some("integration-test".to_string()),
                user_id: Some("tester".to_string()),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn full_process_round_trip_text_only() {
    let (broker, core_handle) = spawn_agent("math", ScriptedLlmClient::always_text("4"), StaticToolRegistry::new());
    let reply_topic = "acme/test/reply/1";
    let mut reply_sub = broker.subscribe(reply_topic).await.unwrap();

    send_message(&broker, "acme", "math", "what is 2+2?", reply_topic).await;

    let msg = tokio::time::timeout(Duration::from_secs(5), reply_sub.recv())
        .await
        .expect("terminal response arrives before timeout")
        .expect("broker channel stays open");
    let envelope: JsonRpcResponse = serde_json::from_value(msg.payload).unwrap();
    let result = envelope.result.unwrap();
    assert_eq!(result.status.state, TaskState::Completed);
    assert_eq!(result.status.message.unwrap().parts[0], MessagePart::Text { text: "4".to_string() });

    core_handle.abort();
}

#[tokio::test]
async fn full_process_round_trip_with_local_tool_call() {
    let llm = ScriptedLlmClient::tool_then_text("call-1", "echo", serde_json::json!({"text": "hi"}), "done: hi");
    let tools = StaticToolRegistry::new().with_local_tool("echo", ToolResult::Text { text: "hi".to_string() });
    let (broker, core_handle) = spawn_agent("echoer", llm, tools);
    let reply_topic = "acme/test/reply/2";
    let mut reply_sub = broker.subscribe(reply_topic).await.unwrap();

    send_message(&broker, "acme", "echoer", "echo hi", reply_topic).await;

    let msg = tokio::time::timeout(Duration::from_secs(5), reply_sub.recv())
        .await
        .expect("terminal response arrives before timeout")
        .expect("broker channel stays open");
    let envelope: JsonRpcResponse = serde_json::from_value(msg.payload).unwrap();
    let result = envelope.result.unwrap();
    assert_eq!(result.status.state, TaskState::Completed);
    assert_eq!(result.status.message.unwrap().parts[0], MessagePart::Text { text: "done: hi".to_string() });

    core_handle.abort();
}

#[tokio::test]
async fn full_process_round_trip_with_peer_delegation() {
    let llm = ScriptedLlmClient::tool_then_text(
        "call-1",
        "ask_research_agent",
        serde_json::json!({"query": "weather"}),
        "the peer says it's sunny",
    );
    let tools = StaticToolRegistry::new().with_peer_tool("ask_research_agent", "research");
    let (broker, core_handle) = spawn_agent("coordinator", llm, tools);
    let reply_topic = "acme/test/reply/3";
    let mut reply_sub = broker.subscribe(reply_topic).await.unwrap();
    let mut peer_request_sub = broker.subscribe(&topics::request("acme", "research")).await.unwrap();

    send_message(&broker, "acme", "coordinator", "ask research about weather", reply_topic).await;

    let peer_msg = tokio::time::timeout(Duration::from_secs(5), peer_request_sub.recv())
        .await
        .expect("peer sub-task request published before timeout")
        .expect("broker channel stays open");
    let response_topic = peer_msg.user_properties.reply_to.expect("peer delegation carries a response topic");

    let response = PeerResponseEnvelope::ok("rpc-peer-1", PeerResultPayload::Ok { text: Some("it's sunny".to_string()), data: None });
    broker
        .publish(&response_topic, serde_json::to_value(&response).unwrap(), UserProperties::default())
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), reply_sub.recv())
        .await
        .expect("terminal response arrives before timeout")
        .expect("broker channel stays open");
    let envelope: JsonRpcResponse = serde_json::from_value(msg.payload).unwrap();
    let result = envelope.result.unwrap();
    assert_eq!(result.status.state, TaskState::Completed);
    assert_eq!(
        result.status.message.unwrap().parts[0],
        MessagePart::Text { text: "the peer says it's sunny".to_string() }
    );

    core_handle.abort();
}

#[tokio::test]
async fn full_process_round_trip_with_peer_error() {
    let llm = ScriptedLlmClient::tool_then_text(
        "call-1",
        "ask_research_agent",
        serde_json::json!({"query": "weather"}),
        "the peer failed, so I cannot answer",
    );
    let tools = StaticToolRegistry::new().with_peer_tool("ask_research_agent", "research");
    let (broker, core_handle) = spawn_agent("coordinator2", llm, tools);
    let reply_topic = "acme/test/reply/4";
    let mut reply_sub = broker.subscribe(reply_topic).await.unwrap();
    let mut peer_request_sub = broker.subscribe(&topics::request("acme", "research")).await.unwrap();

    send_message(&broker, "acme", "coordinator2", "ask research about weather", reply_topic).await;

    let peer_msg = tokio::time::timeout(Duration::from_secs(5), peer_request_sub.recv())
        .await
        .expect("peer sub-task request published before timeout")
        .expect("broker channel stays open");
    let response_topic = peer_msg.user_properties.reply_to.expect("peer delegation carries a response topic");

    let response = PeerResponseEnvelope::ok(
        "rpc-peer-2",
        PeerResultPayload::Error { code: "UPSTREAM".to_string(), message: "research agent is down".to_string(), peer_tool_name: None },
    );
    broker
        .publish(&response_topic, serde_json::to_value(&response).unwrap(), UserProperties::default())
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), reply_sub.recv())
        .await
        .expect("terminal response arrives before timeout")
        .expect("broker channel stays open");
    let envelope: JsonRpcResponse = serde_json::from_value(msg.payload).unwrap();
    assert_eq!(envelope.result.unwrap().status.state, TaskState::Completed);

    core_handle.abort();
}

#[tokio::test]
async fn full_process_round_trip_with_parallel_tool_calls() {
    let llm = ScriptedLlmClient::parallel_tools_then_text(
        vec![
            ("call-a".to_string(), "tool_a".to_string(), serde_json::json!({})),
            ("call-b".to_string(), "tool_b".to_string(), serde_json::json!({})),
        ],
        "both done",
    );
    let tools = StaticToolRegistry::new()
        .with_local_tool("tool_a", ToolResult::Text { text: "a-result".to_string() })
        .with_local_tool("tool_b", ToolResult::Text { text: "b-result".to_string() });
    let (broker, core_handle) = spawn_agent("fanout", llm, tools);
    let reply_topic = "acme/test/reply/5";
    let mut reply_sub = broker.subscribe(reply_topic).await.unwrap();

    send_message(&broker, "acme", "fanout", "do both", reply_topic).await;

    let msg = tokio::time::timeout(Duration::from_secs(5), reply_sub.recv())
        .await
        .expect("terminal response arrives before timeout")
        .expect("broker channel stays open");
    let envelope: JsonRpcResponse = serde_json::from_value(msg.payload).unwrap();
    let result = envelope.result.unwrap();
    assert_eq!(result.status.state, TaskState::Completed);
    assert_eq!(result.status.message.unwrap().parts[0], MessagePart::Text { text: "both done".to_string() });

    core_handle.abort();
}

#[tokio::test]
async fn unknown_request_method_is_dropped_without_crashing_the_core() {
    let (broker, core_handle) = spawn_agent("silent", ScriptedLlmClient::always_text("unused"), StaticToolRegistry::new());
    let request_topic = topics::request("acme", "silent");
    broker
        .publish(
            &request_topic,
            serde_json::json!({"jsonrpc": "2.0", "method": "tasks/unsupported", "params": {}}),
            UserProperties::default(),
        )
        .await
        .unwrap();

    // Give the core a beat to (not) misbehave, then confirm it still answers
    // a legitimate request on the same topic.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reply_topic = "acme/test/reply/6";
    let mut reply_sub = broker.subscribe(reply_topic).await.unwrap();
    send_message(&broker, "acme", "silent", "still alive?", reply_topic).await;

    let msg = tokio::time::timeout(Duration::from_secs(5), reply_sub.recv())
        .await
        .expect("core keeps serving requests after an unknown method")
        .expect("broker channel stays open");
    let envelope: JsonRpcResponse = serde_json::from_value(msg.payload).unwrap();
    assert_eq!(envelope.result.unwrap().status.state, TaskState::Completed);

    core_handle.abort();
}

/// Scenario F: a task suspended on a peer sub-task survives a simulated
/// process crash and restart. The checkpoint lives in a real on-disk
/// SQLite file (not `sqlite::memory:`), the first core is killed before
/// the peer ever responds, and a second core opened against the same
/// file restores the task from the Checkpoint Store and finalizes it.
#[tokio::test]
async fn suspended_task_survives_checkpoint_store_restart() {
    let db_path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
    let db_path = db_path.to_path_buf();

    let broker = Arc::new(InMemoryBroker::new());
    let first_checkpoint = Arc::new(CheckpointStore::open(&db_path).unwrap());
    let llm = ScriptedLlmClient::tool_then_text(
        "call-1",
        "ask_research_agent",
        serde_json::json!({"query": "weather"}),
        "the peer says it's sunny after a restart",
    );
    let tools = StaticToolRegistry::new().with_peer_tool("ask_research_agent", "research");

    let mut peer_request_sub = broker.subscribe(&topics::request("acme", "research")).await.unwrap();
    let reply_topic = "acme/test/reply/7";
    let mut reply_sub = broker.subscribe(reply_topic).await.unwrap();

    let first_core = spawn_agent_with("durable", broker.clone(), first_checkpoint, llm, tools);
    send_message(&broker, "acme", "durable", "ask research about weather", reply_topic).await;

    let peer_msg = tokio::time::timeout(Duration::from_secs(5), peer_request_sub.recv())
        .await
        .expect("peer sub-task request published before the simulated crash")
        .expect("broker channel stays open");
    let response_topic = peer_msg.user_properties.reply_to.expect("peer delegation carries a response topic");

    // Simulate a crash: the task is checkpointed and suspended, nothing
    // resident in this process survives past this point.
    first_core.abort();

    // "Restart": a fresh core, fresh in-process registry, reopening the
    // same on-disk checkpoint database.
    let second_checkpoint = Arc::new(CheckpointStore::open(&db_path).unwrap());
    let second_core = spawn_agent_with(
        "durable",
        broker.clone(),
        second_checkpoint,
        ScriptedLlmClient::always_text("the peer says it's sunny after a restart"),
        StaticToolRegistry::new().with_peer_tool("ask_research_agent", "research"),
    );

    let response = PeerResponseEnvelope::ok(
        "rpc-peer-restart",
        PeerResultPayload::Ok { text: Some("it's sunny after a restart".to_string()), data: None },
    );
    broker
        .publish(&response_topic, serde_json::to_value(&response).unwrap(), UserProperties::default())
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), reply_sub.recv())
        .await
        .expect("terminal response arrives from the restarted process before timeout")
        .expect("broker channel stays open");
    let envelope: JsonRpcResponse = serde_json::from_value(msg.payload).unwrap();
    let result = envelope.result.unwrap();
    assert_eq!(result.status.state, TaskState::Completed);
    assert_eq!(
        result.status.message.unwrap().parts[0],
        MessagePart::Text { text: "the peer says it's sunny after a restart".to_string() }
    );

    second_core.abort();
}

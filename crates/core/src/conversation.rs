//! Turn-Based Conversation Controller
//!
//! Drives the request/response loop: the whole history goes to the model,
//! the reply is appended, and any tool calls it carries are dispatched in
//! order before the next round-trip. The loop ends on the first reply that
//! carries no tool calls.

use crate::dispatch::Dispatcher;
use crate::llm_client::{ChatRequest, LLMClient};
use crate::message::Message;
use crate::projection::{self, ViewEntry};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// Default operating instructions for the agent.
pub const DEFAULT_INSTRUCTIONS: &str =
    "You control a lego robot by calling different functions that execute commands on the robot";

/// Model selection for a chat session.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub instructions: String,
    pub store: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            store: true,
        }
    }
}

/// A turn-based session owning its message log.
pub struct ChatSession {
    client: Arc<dyn LLMClient>,
    dispatcher: Dispatcher,
    settings: ChatSettings,
    history: Vec<Message>,
    busy_tx: watch::Sender<bool>,
}

impl ChatSession {
    /// Starts a session whose log holds only the system instructions.
    pub fn new(client: Arc<dyn LLMClient>, dispatcher: Dispatcher, settings: ChatSettings) -> Self {
        let history = vec![Message::system(settings.instructions.clone())];
        let (busy_tx, _) = watch::channel(false);
        Self {
            client,
            dispatcher,
            settings,
            history,
            busy_tx,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn is_busy(&self) -> bool {
        *self.busy_tx.borrow()
    }

    /// Observes the busy flag, e.g. to disable input while a turn runs.
    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy_tx.subscribe()
    }

    /// Runs one user turn to completion.
    ///
    /// Blank input is ignored. Tool failures end up in the log as tool
    /// messages; only a failed model round-trip is returned as an error, in
    /// which case the entries appended so far stay in the log.
    #[instrument(name = "chat_turn", skip_all)]
    pub async fn submit_user_turn(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            debug!("Ignoring empty user input");
            return Ok(());
        }

        self.history.push(Message::user(text));
        self.busy_tx.send_replace(true);
        let result = self.run_loop().await;
        self.busy_tx.send_replace(false);
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        let tools = self.dispatcher.registry().list_for_turn_based();
        let mut round = 0usize;

        loop {
            round += 1;
            let request = ChatRequest {
                model: self.settings.model.clone(),
                messages: self.history.clone(),
                tools: tools.clone(),
                store: self.settings.store,
            };
            let reply = self.client.complete(request).await?;
            let intents: Vec<_> = reply.tool_calls.iter().map(|c| c.intent()).collect();
            self.history.push(reply);

            if intents.is_empty() {
                info!(rounds = round, "Turn complete");
                return Ok(());
            }

            debug!(round, calls = intents.len(), "Dispatching tool calls");
            // Sequential on purpose: later calls may depend on earlier actuator state.
            for intent in &intents {
                let result = self.dispatcher.dispatch_intent(intent).await;
                self.history.push(Message::tool(result));
            }
        }
    }

    pub fn conversation_view(&self) -> Vec<ViewEntry> {
        projection::chat_conversation(&self.history)
    }

    pub fn tool_call_view(&self) -> Vec<ViewEntry> {
        projection::chat_tool_calls(&self.history)
    }

    pub fn tool_result_view(&self) -> Vec<ViewEntry> {
        projection::chat_tool_results(&self.history)
    }

    pub fn timeline_view(&self) -> Vec<ViewEntry> {
        projection::chat_timeline(&self.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{LightColor, MockActuator};
    use crate::llm_client::MockLLMClient;
    use crate::message::{Role, ToolCall};
    use crate::robot_tools;
    use mockall::predicate::eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A mock backend replaying `replies` in order and recording each request.
    fn scripted(replies: Vec<Message>) -> (MockLLMClient, Arc<Mutex<Vec<ChatRequest>>>) {
        let replies = Mutex::new(VecDeque::from(replies));
        let requests: Arc<Mutex<Vec<ChatRequest>>> = Arc::default();
        let recorded = requests.clone();
        let mut client = MockLLMClient::new();
        client.expect_complete().returning(move |request| {
            recorded.lock().unwrap().push(request);
            replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        });
        (client, requests)
    }

    fn session(client: MockLLMClient, actuator: MockActuator) -> ChatSession {
        let dispatcher = Dispatcher::new(robot_tools::registry(), Arc::new(actuator));
        ChatSession::new(Arc::new(client), dispatcher, ChatSettings::default())
    }

    #[tokio::test]
    async fn test_new_session_holds_system_message() {
        let (client, _) = scripted(vec![]);
        let chat = session(client, MockActuator::new());
        assert_eq!(chat.history(), &[Message::system(DEFAULT_INSTRUCTIONS)]);
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let (client, requests) = scripted(vec![]);
        let mut chat = session(client, MockActuator::new());

        chat.submit_user_turn("   \n").await.unwrap();
        assert_eq!(chat.history().len(), 1);
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reply_without_tool_calls_ends_turn() {
        let (client, requests) = scripted(vec![Message::assistant("Hello!")]);
        let mut chat = session(client, MockActuator::new());

        chat.submit_user_turn("hi").await.unwrap();

        assert_eq!(chat.history().len(), 3);
        assert_eq!(chat.history()[1], Message::user("hi"));
        assert_eq!(chat.history()[2], Message::assistant("Hello!"));
        assert!(!chat.is_busy());

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4o");
        assert!(requests[0].store);
        assert_eq!(requests[0].tools.len(), robot_tools::registry().len());
        assert_eq!(requests[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_rounds_grow_log_and_keep_order() {
        let n = 3;
        let mut replies: Vec<Message> = (0..n)
            .map(|i| {
                Message::assistant_with_calls(
                    None,
                    vec![ToolCall::new(
                        format!("call_{i}"),
                        "setHead",
                        format!(r#"{{"position": {}}}"#, i * 10),
                    )],
                )
            })
            .collect();
        replies.push(Message::assistant("Head moved."));
        let (client, requests) = scripted(replies);

        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        let mut actuator = MockActuator::new();
        actuator.expect_set_head().times(n).returning(move |position| {
            seen.lock().unwrap().push(position);
            Ok(())
        });
        let mut chat = session(client, actuator);

        chat.submit_user_turn("nod three times").await.unwrap();

        // system + user + n * (assistant + tool) + final assistant
        assert_eq!(chat.history().len(), 1 + 1 + n * 2 + 1);
        assert_eq!(
            *order.lock().unwrap(),
            vec![Some(0.0), Some(10.0), Some(20.0)]
        );
        for i in 0..n {
            let tool_msg = &chat.history()[3 + i * 2];
            assert_eq!(tool_msg.role, Role::Tool);
            assert_eq!(tool_msg.tool_call_id.as_deref(), Some(format!("call_{i}").as_str()));
            assert_eq!(tool_msg.content.as_deref(), Some("undefined"));
        }
        assert_eq!(requests.lock().unwrap().len(), n + 1);
        // Each round-trip sees the full log so far.
        assert_eq!(requests.lock().unwrap()[n].messages.len(), 2 + n * 2);
    }

    #[tokio::test]
    async fn test_calls_within_one_reply_run_sequentially() {
        let reply = Message::assistant_with_calls(
            Some("On it".into()),
            vec![
                ToolCall::new("a", "setMotors", r#"{"leftSpeed": 50, "rightSpeed": 50}"#),
                ToolCall::new("b", "setMotors", r#"{"leftSpeed": 0, "rightSpeed": 0}"#),
            ],
        );
        let (client, _) = scripted(vec![reply, Message::assistant("Stopped")]);

        let mut seq = mockall::Sequence::new();
        let mut actuator = MockActuator::new();
        actuator
            .expect_set_motors()
            .with(eq(Some(50.0)), eq(Some(50.0)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        actuator
            .expect_set_motors()
            .with(eq(Some(0.0)), eq(Some(0.0)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        let mut chat = session(client, actuator);

        chat.submit_user_turn("drive a bit").await.unwrap();
        let ids: Vec<_> = chat
            .history()
            .iter()
            .filter_map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort_turn() {
        let reply = Message::assistant_with_calls(
            None,
            vec![ToolCall::new("x", "selfDestruct", "{}")],
        );
        let (client, _) = scripted(vec![reply, Message::assistant("I can't do that.")]);
        let mut chat = session(client, MockActuator::new());

        chat.submit_user_turn("explode").await.unwrap();

        let tool_msg = &chat.history()[3];
        assert_eq!(
            tool_msg.content.as_deref(),
            Some("Error calling function \"selfDestruct\": tool is not registered")
        );
        assert_eq!(chat.history().len(), 5);
    }

    #[tokio::test]
    async fn test_backend_failure_is_returned_and_clears_busy() {
        let (client, _) = scripted(vec![]);
        let mut chat = session(client, MockActuator::new());
        let busy = chat.subscribe_busy();

        let err = chat.submit_user_turn("hello").await.unwrap_err();
        assert!(err.to_string().contains("script exhausted"));
        assert_eq!(chat.history().len(), 2);
        assert!(!*busy.borrow());
    }

    #[tokio::test]
    async fn test_turn_on_red_light_end_to_end() {
        let (client, _) = scripted(vec![
            Message::assistant_with_calls(
                None,
                vec![ToolCall::new(
                    "call_red",
                    "setLights",
                    r#"{"leftColor":"RED","rightColor":"BLACK"}"#,
                )],
            ),
            Message::assistant("Done"),
        ]);
        let mut actuator = MockActuator::new();
        actuator
            .expect_set_lights()
            .with(eq(Some(LightColor::Red)), eq(Some(LightColor::Black)))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut chat = session(client, actuator);

        chat.submit_user_turn("turn on red light").await.unwrap();

        assert_eq!(chat.history()[3].content.as_deref(), Some("undefined"));
        let conversation: Vec<String> = chat
            .conversation_view()
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(conversation, vec!["turn on red light", "Done"]);
        assert_eq!(
            chat.tool_call_view()[0].content,
            r#"setLights with arguments: {"leftColor":"RED","rightColor":"BLACK"}"#
        );
    }
}

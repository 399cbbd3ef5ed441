use chrono::Utc;
use tracing::error;

use crate::tutor_client::TutorApi;

/// Greeting shown when a conversation starts. It is a real assistant turn so
/// the model sees it as part of the transcript.
pub const GREETING_TEXT: &str = "Hello! I'm Socratica. I'm here to help you master math. Attach a photo of a problem you're working on, or just type it out, and we'll walk through it together. What's on your mind today?";

/// Substituted when an image is sent without any accompanying text.
pub const IMAGE_ONLY_PROMPT: &str = "I've uploaded an image of a problem. Can you help me with the first step?";

/// Shown in place of a reply when the tutor call fails for any reason.
pub const APOLOGY_TEXT: &str = "I'm sorry, I hit a snag while thinking. Could we try that step again?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A unit of content within a turn: inline text, an image as a
/// self-describing data string (`data:<mime>;base64,<payload>`), or both.
#[derive(Debug, Clone, Default)]
pub struct MessagePart {
    pub text: Option<String>,
    pub image: Option<String>,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }

    pub fn image(data: impl Into<String>) -> Self {
        Self {
            text: None,
            image: Some(data.into()),
        }
    }
}

/// One conversational turn. Immutable once appended to a conversation.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
        let timestamp = Utc::now().timestamp_millis();
        Self {
            id: timestamp.to_string(),
            role,
            parts,
            timestamp,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![MessagePart::text(text)])
    }

    /// Concatenated text of all parts, for display.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The full dialogue transcript, insertion-ordered. Replayed verbatim to the
/// tutor service on every call; never truncated or summarized.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// The one tunable forwarded to the tutor service. Not validated locally;
/// out-of-range budgets are the provider's concern.
#[derive(Debug, Clone, Copy)]
pub struct TutorConfig {
    pub thinking_budget: u32,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            thinking_budget: 32768,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    AwaitingResponse,
}

/// The two canned follow-up prompts. They travel through the ordinary send
/// path as fixed user text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nudge {
    Why,
    NextStep,
}

impl Nudge {
    pub fn text(self) -> &'static str {
        match self {
            Nudge::Why => "Why did we do that? I want to understand the concept behind this step.",
            Nudge::NextStep => "I'm stuck, can you show me the next step?",
        }
    }
}

/// Owns the transcript and the send state machine (Idle / Awaiting-Response).
///
/// All transitions go through [`send`](Self::send): the user turn is appended
/// optimistically, the tutor is called, and the reply (or the fixed apology on
/// any failure) is appended before returning to Idle. While a call is
/// outstanding, further sends and nudges are no-ops.
pub struct ConversationController {
    conversation: Conversation,
    state: SendState,
    config: TutorConfig,
}

impl ConversationController {
    pub fn new(config: TutorConfig) -> Self {
        let mut conversation = Conversation::new();
        conversation.push(Message::assistant(GREETING_TEXT));
        Self {
            conversation,
            state: SendState::Idle,
            config,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    /// Discards the transcript and starts over from the greeting.
    pub fn reset(&mut self) {
        self.conversation = Conversation::new();
        self.conversation.push(Message::assistant(GREETING_TEXT));
        self.state = SendState::Idle;
    }

    /// A send is possible only when idle and there is something to send.
    pub fn can_send(&self, text: &str, image: Option<&str>) -> bool {
        self.state == SendState::Idle && (!text.trim().is_empty() || image.is_some())
    }

    /// Nudges are enabled once the conversation holds more than the greeting.
    pub fn can_nudge(&self) -> bool {
        self.state == SendState::Idle && self.conversation.len() >= 2
    }

    /// Drives one full exchange. Returns the appended assistant message, or
    /// `None` when the send was refused (busy, or nothing to send).
    pub async fn send(
        &mut self,
        tutor: &dyn TutorApi,
        text: &str,
        image: Option<String>,
    ) -> Option<Message> {
        if !self.can_send(text, image.as_deref()) {
            return None;
        }

        let text = text.trim();
        let mut parts = vec![MessagePart::text(if text.is_empty() {
            IMAGE_ONLY_PROMPT
        } else {
            text
        })];
        if let Some(data) = image {
            parts.push(MessagePart::image(data));
        }
        self.conversation.push(Message::new(Role::User, parts));
        self.state = SendState::AwaitingResponse;

        // The one suspension point. All failures collapse into the same
        // canned apology; the error itself only reaches the log.
        let reply = match tutor.send_message(&self.conversation, &self.config).await {
            Ok(text) => text,
            Err(err) => {
                error!("tutor request failed: {err}");
                APOLOGY_TEXT.to_string()
            }
        };

        let message = Message::assistant(reply);
        self.conversation.push(message.clone());
        self.state = SendState::Idle;
        Some(message)
    }

    /// Sends a canned follow-up through the ordinary send path. A no-op until
    /// the conversation has progressed past the greeting.
    pub async fn nudge(&mut self, tutor: &dyn TutorApi, nudge: Nudge) -> Option<Message> {
        if !self.can_nudge() {
            return None;
        }
        self.send(tutor, nudge.text(), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tutor_client::TutorError;
    use async_trait::async_trait;

    struct CannedTutor(&'static str);

    #[async_trait]
    impl TutorApi for CannedTutor {
        async fn send_message(
            &self,
            _conversation: &Conversation,
            _config: &TutorConfig,
        ) -> Result<String, TutorError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingTutor;

    #[async_trait]
    impl TutorApi for FailingTutor {
        async fn send_message(
            &self,
            _conversation: &Conversation,
            _config: &TutorConfig,
        ) -> Result<String, TutorError> {
            Err(TutorError::Api {
                status: 500,
                message: "backend exploded".to_string(),
            })
        }
    }

    #[test]
    fn starts_with_greeting_and_idle() {
        let controller = ConversationController::new(TutorConfig::default());
        assert_eq!(controller.state(), SendState::Idle);
        let messages = controller.conversation().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].text(), GREETING_TEXT);
    }

    #[tokio::test]
    async fn blank_input_without_image_is_refused() {
        let mut controller = ConversationController::new(TutorConfig::default());
        assert!(!controller.can_send("   ", None));
        let reply = controller.send(&CannedTutor("hi"), "   ", None).await;
        assert!(reply.is_none());
        assert_eq!(controller.conversation().len(), 1);
        assert_eq!(controller.state(), SendState::Idle);
    }

    #[tokio::test]
    async fn image_only_send_substitutes_fixed_prompt() {
        let mut controller = ConversationController::new(TutorConfig::default());
        let data = "data:image/jpeg;base64,AAAA".to_string();
        let reply = controller.send(&CannedTutor("Let's look."), "", Some(data)).await;
        assert!(reply.is_some());

        let user_turn = &controller.conversation().messages()[1];
        assert_eq!(user_turn.role, Role::User);
        assert_eq!(user_turn.parts.len(), 2);
        assert_eq!(user_turn.parts[0].text.as_deref(), Some(IMAGE_ONLY_PROMPT));
        assert!(user_turn.parts[1].image.is_some());
    }

    #[tokio::test]
    async fn successful_send_appends_both_turns() {
        let mut controller = ConversationController::new(TutorConfig::default());
        let reply = controller
            .send(&CannedTutor("Start by factoring."), "Solve x^2 - 4 = 0", None)
            .await
            .unwrap();
        assert_eq!(reply.text(), "Start by factoring.");
        assert_eq!(controller.conversation().len(), 3);
        assert_eq!(controller.state(), SendState::Idle);
    }

    #[tokio::test]
    async fn failure_appends_exactly_one_apology_and_returns_to_idle() {
        let mut controller = ConversationController::new(TutorConfig::default());
        let reply = controller.send(&FailingTutor, "help", None).await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.text(), APOLOGY_TEXT);
        // greeting + user turn + single apology
        assert_eq!(controller.conversation().len(), 3);
        assert_eq!(controller.state(), SendState::Idle);
        assert!(controller.can_send("again", None));
    }

    #[tokio::test]
    async fn nudge_is_noop_before_first_exchange() {
        let mut controller = ConversationController::new(TutorConfig::default());
        assert!(!controller.can_nudge());
        let reply = controller.nudge(&CannedTutor("hi"), Nudge::NextStep).await;
        assert!(reply.is_none());
        assert_eq!(controller.conversation().len(), 1);
    }

    #[tokio::test]
    async fn nudge_sends_canned_text_after_first_exchange() {
        let mut controller = ConversationController::new(TutorConfig::default());
        controller.send(&CannedTutor("ok"), "question", None).await;
        assert!(controller.can_nudge());

        controller.nudge(&CannedTutor("because"), Nudge::Why).await.unwrap();
        let messages = controller.conversation().messages();
        assert_eq!(messages[3].text(), Nudge::Why.text());
        assert_eq!(messages[4].text(), "because");
    }

    #[test]
    fn reset_discards_transcript() {
        let mut controller = ConversationController::new(TutorConfig::default());
        controller.reset();
        assert_eq!(controller.conversation().len(), 1);
        assert_eq!(controller.conversation().messages()[0].text(), GREETING_TEXT);
    }
}

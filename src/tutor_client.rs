use std::env;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::cli::chat::conversation_state::{Conversation, MessagePart, Role, TutorConfig};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

const TEMPERATURE: f32 = 0.7;

/// Returned when the provider answers successfully but with no text at all.
pub const EMPTY_RESPONSE_FALLBACK: &str =
    "I'm sorry, I couldn't generate a response. Let's try looking at the problem again.";

/// The tutor persona. Sent out-of-band with every request, never as a
/// conversation turn.
const SYSTEM_INSTRUCTION: &str = "You are Socratica, a compassionate and expert Socratic Math Tutor.
Your goal is to guide students through complex algebra, calculus, and general mathematics problems.

Follow these principles strictly:
1. DO NOT give the full answer immediately.
2. When presented with a problem (via text or image), analyze it carefully.
3. Start by identifying the type of problem and asking a guiding question or providing the very first logical step.
4. Use a patient, encouraging, and warm tone.
5. If the user says they are stuck or asks \"Why?\", explain only the specific concept required for the current step.
6. Use LaTeX for mathematical notation (e.g., $$x^2 + y^2 = r^2$$).
7. Break down complex steps into smaller, digestible pieces.
8. If an image is provided, describe what you see in the problem first to confirm understanding.

Your response should always aim to empower the student to think for themselves.";

#[derive(Debug, Error)]
pub enum TutorError {
    #[error("conversation has no sendable turns")]
    EmptyConversation,
    #[error("request to the tutor service failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("tutor service returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// The single operation the conversation controller needs from a tutor
/// backend. Implemented by [`TutorClient`] for the real service and by mocks
/// in tests.
#[async_trait]
pub trait TutorApi {
    /// Sends the full transcript and returns the assistant's next reply text.
    async fn send_message(
        &self,
        conversation: &Conversation,
        config: &TutorConfig,
    ) -> Result<String, TutorError>;
}

/// Stateless client for the generateContent endpoint. Every call resends the
/// entire transcript; nothing is cached between calls.
pub struct TutorClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl TutorClient {
    /// Reads the API credential from `GEMINI_API_KEY` once. An absent key is
    /// not an error here; the first request will fail at the provider.
    pub fn new(model: impl Into<String>) -> Self {
        let api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TutorApi for TutorClient {
    async fn send_message(
        &self,
        conversation: &Conversation,
        config: &TutorConfig,
    ) -> Result<String, TutorError> {
        let contents = wire_turns(conversation);
        if contents.is_empty() {
            return Err(TutorError::EmptyConversation);
        }

        let request = GenerateContentRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: SYSTEM_INSTRUCTION,
                }],
            },
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                thinking_config: ThinkingConfig {
                    thinking_budget: config.thinking_budget,
                },
            },
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            BASE_URL, self.model, self.api_key
        );

        debug!(
            "Sending generateContent request: {}",
            serde_json::to_string(&request).unwrap_or_default()
        );

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            error!("generateContent failed with status {}: {}", status, message);
            return Err(TutorError::Api { status, message });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        debug!("Received generateContent response");

        Ok(extract_text(parsed).unwrap_or_else(|| EMPTY_RESPONSE_FALLBACK.to_string()))
    }
}

/// Maps a local role onto the wire role. One-directional: the reply is always
/// appended locally as `assistant`, never mapped back.
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        _ => "user",
    }
}

/// Strips the `data:<mime>;base64,` marker from a data string, keeping
/// everything after the first comma. A string with no comma is passed through
/// untouched.
fn strip_data_prefix(data: &str) -> &str {
    match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    }
}

/// Serializes the transcript for the wire. `system` turns are dropped (the
/// persona travels out-of-band); everything else maps one-to-one.
fn wire_turns(conversation: &Conversation) -> Vec<WireTurn> {
    conversation
        .messages()
        .iter()
        .filter(|message| message.role != Role::System)
        .map(|message| WireTurn {
            role: wire_role(message.role),
            parts: message.parts.iter().map(wire_part).collect(),
        })
        .collect()
}

fn wire_part(part: &MessagePart) -> WirePart {
    if let Some(image) = &part.image {
        WirePart::InlineData {
            inline_data: InlineData {
                mime_type: "image/jpeg",
                data: strip_data_prefix(image).to_string(),
            },
        }
    } else {
        WirePart::Text {
            text: part.text.clone().unwrap_or_default(),
        }
    }
}

fn extract_text(response: GenerateContentResponse) -> Option<String> {
    let text = response
        .candidates?
        .into_iter()
        .next()?
        .content?
        .parts?
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<String>();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireTurn>,
    system_instruction: SystemInstruction,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: &'static str,
}

#[derive(Debug, Serialize)]
struct WireTurn {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::chat::conversation_state::Message;
    use serde_json::json;

    fn conversation_with(messages: Vec<Message>) -> Conversation {
        let mut conversation = Conversation::new();
        for message in messages {
            conversation.push(message);
        }
        conversation
    }

    #[test]
    fn system_turns_are_filtered_out() {
        let conversation = conversation_with(vec![
            Message::new(Role::System, vec![MessagePart::text("persona")]),
            Message::assistant("hello"),
            Message::new(Role::User, vec![MessagePart::text("hi")]),
        ]);
        let turns = wire_turns(&conversation);
        assert_eq!(turns.len(), 2);
    }

    #[test]
    fn turn_count_matches_non_system_count() {
        let conversation = conversation_with(vec![
            Message::assistant("a"),
            Message::new(Role::User, vec![MessagePart::text("b")]),
            Message::assistant("c"),
        ]);
        assert_eq!(wire_turns(&conversation).len(), 3);
    }

    #[test]
    fn assistant_maps_to_model_everything_else_to_user() {
        assert_eq!(wire_role(Role::Assistant), "model");
        assert_eq!(wire_role(Role::User), "user");
        assert_eq!(wire_role(Role::System), "user");
    }

    #[test]
    fn data_prefix_is_stripped_through_first_comma() {
        assert_eq!(strip_data_prefix("data:image/jpeg;base64,ABC123"), "ABC123");
        assert_eq!(strip_data_prefix("ABC123"), "ABC123");
        assert_eq!(strip_data_prefix("a,b,c"), "b,c");
    }

    #[test]
    fn image_part_serializes_as_inline_data() {
        let part = MessagePart::image("data:image/jpeg;base64,ABC123");
        let value = serde_json::to_value(wire_part(&part)).unwrap();
        assert_eq!(
            value,
            json!({
                "inlineData": {
                    "mimeType": "image/jpeg",
                    "data": "ABC123"
                }
            })
        );
    }

    #[test]
    fn textless_part_serializes_as_empty_text() {
        let part = MessagePart::default();
        let value = serde_json::to_value(wire_part(&part)).unwrap();
        assert_eq!(value, json!({ "text": "" }));
    }

    #[test]
    fn request_carries_thinking_budget_and_temperature() {
        let request = GenerateContentRequest {
            contents: vec![WireTurn {
                role: "user",
                parts: vec![WirePart::Text {
                    text: "hi".to_string(),
                }],
            }],
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: SYSTEM_INSTRUCTION,
                }],
            },
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                thinking_config: ThinkingConfig {
                    thinking_budget: 32768,
                },
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            32768
        );
        assert!(value["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("You are Socratica"));
    }

    #[test]
    fn empty_candidates_yield_no_text() {
        let response = GenerateContentResponse { candidates: None };
        assert!(extract_text(response).is_none());

        let response = GenerateContentResponse {
            candidates: Some(vec![Candidate {
                content: Some(CandidateContent {
                    parts: Some(vec![CandidatePart { text: None }]),
                }),
            }]),
        };
        assert!(extract_text(response).is_none());
    }

    #[test]
    fn candidate_text_parts_are_concatenated() {
        let response = GenerateContentResponse {
            candidates: Some(vec![Candidate {
                content: Some(CandidateContent {
                    parts: Some(vec![
                        CandidatePart {
                            text: Some("First, ".to_string()),
                        },
                        CandidatePart {
                            text: Some("factor it.".to_string()),
                        },
                    ]),
                }),
            }]),
        };
        assert_eq!(extract_text(response).as_deref(), Some("First, factor it."));
    }
}

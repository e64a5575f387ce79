//! Working transcript of one tool-calling loop.
//!
//! A transcript only ever holds model turns and tool results. Every tool
//! result must answer a call id from the tool-call batch that immediately
//! precedes it; [`Transcript`] rejects appends that would break that rule.

use crate::types::{AppError, Result, ToolCallRequest};
use serde::{Deserialize, Serialize};

/// A turn in a loop's transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// Free-text model reply.
    Model { content: String },
    /// Model reply requesting tool calls.
    ModelToolCalls { calls: Vec<ToolCallRequest> },
    /// Output (or error text) of one tool call.
    Tool { call_id: String, output: String },
}

impl Message {
    pub fn role(&self) -> &'static str {
        match self {
            Message::Model { .. } | Message::ModelToolCalls { .. } => "model",
            Message::Tool { .. } => "tool",
        }
    }
}

/// Ordered, invariant-checked sequence of [`Message`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
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

    /// Number of tool results recorded so far.
    pub fn tool_results(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, Message::Tool { .. }))
            .count()
    }

    pub fn push_model(&mut self, content: impl Into<String>) {
        self.messages.push(Message::Model {
            content: content.into(),
        });
    }

    pub fn push_tool_calls(&mut self, calls: Vec<ToolCallRequest>) {
        self.messages.push(Message::ModelToolCalls { calls });
    }

    /// Append a tool result, checking it answers the open tool-call batch.
    pub fn push_tool_result(
        &mut self,
        call_id: impl Into<String>,
        output: impl Into<String>,
    ) -> Result<()> {
        let call_id = call_id.into();
        let open_batch = self
            .messages
            .iter()
            .rev()
            .find(|m| !matches!(m, Message::Tool { .. }));

        match open_batch {
            Some(Message::ModelToolCalls { calls }) if calls.iter().any(|c| c.id == call_id) => {
                let already_answered = self.messages.iter().rev().any(
                    |m| matches!(m, Message::Tool { call_id: id, .. } if *id == call_id),
                );
                if already_answered {
                    return Err(AppError::Internal(format!(
                        "Tool call '{}' already has a result",
                        call_id
                    )));
                }
                self.messages.push(Message::Tool {
                    call_id,
                    output: output.into(),
                });
                Ok(())
            }
            _ => Err(AppError::Internal(format!(
                "Tool result '{}' does not follow a model turn requesting it",
                call_id
            ))),
        }
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

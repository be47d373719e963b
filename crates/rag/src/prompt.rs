//! Prompt assembly for the completion API.
//!
//! Renders the system template with handlebars, serializes context blocks
//! into labeled sections, and produces the single-shot, chat-turn and
//! conversation shapes. No retrieval or network I/O happens here.

use std::collections::HashMap;

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use storechat_core::{AppError, AppResult};
use tracing::debug;

use crate::context::{render_sections, ContextBlock};

/// Default role instructions for the store assistant.
pub const DEFAULT_SYSTEM_TEMPLATE: &str = "You are the shopping assistant for {{storeName}}. \
Answer customer questions using only the information in the provided context. \
Cite the sources you used by their bracketed number, for example [1]. \
If the context does not contain the answer, say that you do not have that information. \
Never invent products, prices, availability or policies that are not in the context.";

/// Value of `storeName` when the caller does not set one.
pub const DEFAULT_STORE_NAME: &str = "this store";

const TEMPLATE_NAME: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The three renderings of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledPrompt {
    /// System text, context and question in one string
    pub single_shot: String,
    /// System message followed by one user message carrying the context
    pub chat: Vec<ChatMessage>,
    /// Like `chat`, with prior turns between the system and user messages
    pub conversation: Vec<ChatMessage>,
}

/// Renders prompts from a system template and context blocks.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_template: String,
    variables: HashMap<String, String>,
    max_history_messages: Option<usize>,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_TEMPLATE)
    }
}

impl PromptAssembler {
    pub fn new(system_template: impl Into<String>) -> Self {
        let mut variables = HashMap::new();
        variables.insert("storeName".to_string(), DEFAULT_STORE_NAME.to_string());

        Self {
            system_template: system_template.into(),
            variables,
            max_history_messages: None,
        }
    }

    /// Set a template variable such as `storeName`.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Keep only the newest `max` history messages in conversation mode.
    pub fn with_max_history_messages(mut self, max: usize) -> Self {
        self.max_history_messages = Some(max);
        self
    }

    /// Render the system template.
    ///
    /// Fails with a configuration error when the template is empty, does not
    /// parse, or references a variable that was never set.
    pub fn render_system(&self) -> AppResult<String> {
        if self.system_template.trim().is_empty() {
            return Err(AppError::Config("system template is missing".to_string()));
        }

        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);

        handlebars
            .register_template_string(TEMPLATE_NAME, &self.system_template)
            .map_err(|e| AppError::Config(format!("Failed to register system template: {}", e)))?;

        handlebars
            .render(TEMPLATE_NAME, &self.variables)
            .map_err(|e| AppError::Config(format!("Failed to render system template: {}", e)))
    }

    /// Serialize blocks as numbered, labeled sections separated by blank lines.
    pub fn render_context(&self, blocks: &[ContextBlock]) -> String {
        render_sections(blocks)
    }

    /// User turn content: the context (if any) followed by the question.
    fn user_content(&self, blocks: &[ContextBlock], user_message: &str) -> AppResult<String> {
        let message = user_message.trim();
        if message.is_empty() {
            return Err(AppError::Config("user message is missing".to_string()));
        }

        if blocks.is_empty() {
            return Ok(message.to_string());
        }

        Ok(format!(
            "Context:\n\n{}\n\nQuestion: {}",
            self.render_context(blocks),
            message
        ))
    }

    pub fn single_shot(&self, blocks: &[ContextBlock], user_message: &str) -> AppResult<String> {
        let system = self.render_system()?;
        let user = self.user_content(blocks, user_message)?;
        Ok(format!("{}\n\n{}", system, user))
    }

    pub fn chat_turn(
        &self,
        blocks: &[ContextBlock],
        user_message: &str,
    ) -> AppResult<Vec<ChatMessage>> {
        Ok(vec![
            ChatMessage::system(self.render_system()?),
            ChatMessage::user(self.user_content(blocks, user_message)?),
        ])
    }

    /// Chat turn with prior history, oldest first.
    ///
    /// System messages in `history` are ignored; the assembler owns the
    /// system instructions.
    pub fn conversation(
        &self,
        blocks: &[ContextBlock],
        user_message: &str,
        history: &[ChatMessage],
    ) -> AppResult<Vec<ChatMessage>> {
        let system = ChatMessage::system(self.render_system()?);
        let user = ChatMessage::user(self.user_content(blocks, user_message)?);

        let turns: Vec<&ChatMessage> = history
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .collect();
        let skip = self
            .max_history_messages
            .map(|max| turns.len().saturating_sub(max))
            .unwrap_or(0);

        let mut messages = Vec::with_capacity(turns.len() - skip + 2);
        messages.push(system);
        messages.extend(turns.into_iter().skip(skip).cloned());
        messages.push(user);
        Ok(messages)
    }

    /// Render all three shapes at once.
    pub fn assemble(
        &self,
        blocks: &[ContextBlock],
        user_message: &str,
        history: &[ChatMessage],
    ) -> AppResult<AssembledPrompt> {
        let prompt = AssembledPrompt {
            single_shot: self.single_shot(blocks, user_message)?,
            chat: self.chat_turn(blocks, user_message)?,
            conversation: self.conversation(blocks, user_message, history)?,
        };

        debug!(
            blocks = blocks.len(),
            history = history.len(),
            chars = prompt.single_shot.len(),
            "Assembled prompt"
        );
        Ok(prompt)
    }
}

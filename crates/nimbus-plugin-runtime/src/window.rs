//! Window and notification facade.
//!
//! Plugins talk to the user through [`WindowFacade`]; presentation is left
//! to a [`WindowBackend`] supplied by the embedding host.

use async_trait::async_trait;
use nimbus_plugin_api::MessageLevel;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What the backend is asked to show for an input box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBoxPrompt {
    pub prompt: String,
    pub placeholder: Option<String>,
    /// Pre-filled value; after a failed validation, the rejected input.
    pub value: Option<String>,
    pub password: bool,
    /// Set when re-prompting after the validator rejected the last input.
    pub validation_message: Option<String>,
}

type InputValidator = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Input box request as issued by plugin code.
#[derive(Clone, Default)]
pub struct InputBoxOptions {
    pub prompt: String,
    pub placeholder: Option<String>,
    pub value: Option<String>,
    pub password: bool,
    validate: Option<InputValidator>,
}

impl InputBoxOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn password(mut self) -> Self {
        self.password = true;
        self
    }

    /// Sets a validator returning an error message for rejected input.
    #[must_use]
    pub fn with_validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    fn to_prompt(&self) -> InputBoxPrompt {
        InputBoxPrompt {
            prompt: self.prompt.clone(),
            placeholder: self.placeholder.clone(),
            value: self.value.clone(),
            password: self.password,
            validation_message: None,
        }
    }
}

impl fmt::Debug for InputBoxOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBoxOptions")
            .field("prompt", &self.prompt)
            .field("placeholder", &self.placeholder)
            .field("password", &self.password)
            .field("validated", &self.validate.is_some())
            .finish_non_exhaustive()
    }
}

/// Presentation layer for messages and prompts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WindowBackend: Send + Sync {
    /// Shows a message; resolves to the chosen action, if any.
    async fn show_message(&self, level: MessageLevel, message: &str, actions: &[String]) -> Option<String>;

    /// Shows an input box; resolves to `None` when the user cancels.
    async fn prompt(&self, prompt: &InputBoxPrompt) -> Option<String>;
}

/// Backend for hosts without a UI: messages go to the log and prompts are
/// cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessWindow;

#[async_trait]
impl WindowBackend for HeadlessWindow {
    async fn show_message(&self, level: MessageLevel, message: &str, actions: &[String]) -> Option<String> {
        match level {
            MessageLevel::Info => info!(actions = ?actions, "{}", message),
            MessageLevel::Warning => warn!(actions = ?actions, "{}", message),
            MessageLevel::Error => error!(actions = ?actions, "{}", message),
        }
        None
    }

    async fn prompt(&self, prompt: &InputBoxPrompt) -> Option<String> {
        info!(prompt = %prompt.prompt, "Input box dismissed (headless)");
        None
    }
}

/// Message and prompt API handed to plugins.
#[derive(Clone)]
pub struct WindowFacade {
    backend: Arc<dyn WindowBackend>,
}

impl WindowFacade {
    pub fn new(backend: Arc<dyn WindowBackend>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn headless() -> Self {
        Self::new(Arc::new(HeadlessWindow))
    }

    pub async fn show_message(&self, level: MessageLevel, message: &str, actions: &[String]) -> Option<String> {
        self.backend.show_message(level, message, actions).await
    }

    pub async fn show_information_message(&self, message: &str, actions: &[String]) -> Option<String> {
        self.show_message(MessageLevel::Info, message, actions).await
    }

    pub async fn show_warning_message(&self, message: &str, actions: &[String]) -> Option<String> {
        self.show_message(MessageLevel::Warning, message, actions).await
    }

    pub async fn show_error_message(&self, message: &str, actions: &[String]) -> Option<String> {
        self.show_message(MessageLevel::Error, message, actions).await
    }

    /// Prompts until the validator accepts the input or the user cancels.
    pub async fn show_input_box(&self, options: InputBoxOptions) -> Option<String> {
        let mut prompt = options.to_prompt();
        loop {
            let input = self.backend.prompt(&prompt).await?;
            let Some(validate) = &options.validate else {
                return Some(input);
            };
            match validate(&input) {
                None => return Some(input),
                Some(message) => {
                    prompt.validation_message = Some(message);
                    prompt.value = Some(input);
                }
            }
        }
    }
}

impl fmt::Debug for WindowFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowFacade").finish_non_exhaustive()
    }
}

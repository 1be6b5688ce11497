mod ollama;
mod openai;
mod template;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{Phase, SenderRole};

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use template::{scripted_line, TemplateProvider};

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),

    #[error("Expected {expected} responses, got {actual}")]
    BatchSizeMismatch { expected: usize, actual: usize },
}

/// Everything a speaker needs to know to produce one line for the current round
#[derive(Debug, Clone)]
pub struct SpeechContext {
    pub phase: Phase,
    pub category: String,
    /// Real keyword for citizens; the liar's context carries the masked value
    pub keyword: String,
    pub is_liar: bool,
    /// Display name of the seat that will speak
    pub speaker: String,
    pub persona: Option<String>,
    /// Display name of the human whose message triggered this round
    pub trigger_sender: String,
    /// Whether the trigger was a player's turn or an operator interjection
    pub trigger_role: SenderRole,
    pub trigger_text: String,
    /// Recent transcript lines, oldest first, formatted as "name: text"
    pub history: Vec<String>,
}

/// Request to generate one AI seat's line
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Role and rules for the speaker
    pub system: String,
    /// The round-specific user prompt
    pub prompt: String,
    /// Structured context, used by providers that don't call a model
    pub context: SpeechContext,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Timeout for the request
    pub timeout: Duration,
    /// Optional model override (e.g., "gpt-4o" instead of configured model)
    pub model_override: Option<String>,
}

impl GenerateRequest {
    /// Build the request for one seat using the configured limits
    pub fn for_speaker(context: SpeechContext, config: &LlmConfig) -> Self {
        Self {
            system: system_prompt(&context),
            prompt: user_prompt(&context),
            context,
            max_tokens: Some(config.default_max_tokens),
            temperature: Some(config.temperature),
            timeout: config.default_timeout,
            model_override: None,
        }
    }
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    /// Provider-specific metadata (model used, tokens consumed, etc.)
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "openai", "ollama")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Tokens consumed (if available)
    pub tokens_used: Option<u32>,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate one line of speech for the given request
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Manager for multiple LLM providers
pub struct LlmManager {
    pub providers: Vec<Box<dyn LlmProvider>>,
}

impl LlmManager {
    /// Create a new LLM manager with the given providers
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Manager that never calls out; used when no provider is configured
    pub fn offline() -> Self {
        Self::new(vec![Box::new(TemplateProvider)])
    }

    /// Generate one line per request, concurrently. Providers are assigned to
    /// requests round-robin so every AI seat keeps a stable voice within a
    /// round. The batch is all-or-nothing: any failure fails the whole batch.
    pub async fn generate_batch(&self, requests: Vec<GenerateRequest>) -> LlmResult<Vec<String>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        if self.providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured".to_string(),
            ));
        }

        let expected = requests.len();
        let tasks = requests.into_iter().enumerate().map(|(i, req)| {
            let provider = self.providers[i % self.providers.len()].as_ref();
            let speaker = req.context.speaker.clone();
            async move {
                match provider.generate(req).await {
                    Ok(response) => {
                        tracing::debug!(
                            provider = %response.metadata.provider,
                            model = %response.metadata.model,
                            latency_ms = response.metadata.latency_ms,
                            tokens = ?response.metadata.tokens_used,
                            "Generated line for {}",
                            speaker
                        );
                        Ok(response.text)
                    }
                    Err(e) => {
                        tracing::error!("Provider {} failed for {}: {}", provider.name(), speaker, e);
                        Err(e)
                    }
                }
            }
        });

        let texts = futures::future::join_all(tasks)
            .await
            .into_iter()
            .collect::<LlmResult<Vec<String>>>()?;

        if texts.len() != expected {
            return Err(LlmError::BatchSizeMismatch {
                expected,
                actual: texts.len(),
            });
        }
        Ok(texts)
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Ollama model to use
    pub ollama_model: String,
    /// Default timeout for a single LLM request
    pub default_timeout: Duration,
    /// Default max tokens for responses
    pub default_max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: None,
            ollama_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(15),
            default_max_tokens: 300,
            temperature: 0.7,
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            openai_model: non_empty_env("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ollama_base_url: non_empty_env("OLLAMA_BASE_URL"),
            ollama_model: non_empty_env("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            default_timeout: std::env::var("LLM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            default_max_tokens: std::env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_max_tokens),
            temperature: std::env::var("LLM_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.temperature),
        }
    }

    /// Build an LlmManager with all configured providers
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        // Add OpenAI if API key is available
        if let Some(api_key) = &self.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                api_key.clone(),
                self.openai_model.clone(),
            )));
        }

        // Add Ollama if base URL is available
        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )?));
        }

        if providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured. Set OPENAI_API_KEY or OLLAMA_BASE_URL".to_string(),
            ));
        }

        Ok(LlmManager::new(providers))
    }
}

const CITIZEN_RULES: &str = r#"Rules you must follow:
1. Never say the secret word "{keyword}" itself.
2. Never state the answer outright.
3. Give at most two indirect hints, through sound, shape or metaphor.
4. Call it "it" or "the word" instead of "{keyword}".
5. Stay vague enough that the liar cannot easily catch on.
6. Do not lie.
7. It is currently the {phase} phase. Act accordingly."#;

const LIAR_RULES: &str = r#"Rules you must follow:
1. You do not know the secret word. You only know the category.
2. Never admit that you are the liar.
3. Speak vaguely enough that you could be talking about most things in the category.
4. Pick up on hints from the others and sound as confident as they do.
5. It is currently the {phase} phase. Act accordingly."#;

fn system_prompt(ctx: &SpeechContext) -> String {
    let role = if ctx.is_liar {
        format!(
            "You are a player in the Liar Game and you are the liar. The category is {}.",
            ctx.category
        )
    } else {
        format!(
            "You are a player in the Liar Game and you are an ordinary citizen who knows the secret word ({}). \
             Your goal is to prove you are not the liar and to find the liar.",
            ctx.keyword
        )
    };

    let rules = if ctx.is_liar { LIAR_RULES } else { CITIZEN_RULES }
        .replace("{keyword}", &ctx.keyword)
        .replace("{phase}", ctx.phase.label());

    let style = match &ctx.persona {
        Some(persona) => format!(
            "Your personality is {}. Speak in that style without breaking the rules.",
            persona
        ),
        None => "Speak plainly.".to_string(),
    };

    format!(
        "{}\n\n{}\n\n{} Answer in one or two short sentences, like a person typing in a chat.",
        role, rules, style
    )
}

fn user_prompt(ctx: &SpeechContext) -> String {
    let history = if ctx.history.is_empty() {
        "(nothing yet)".to_string()
    } else {
        ctx.history.join("\n")
    };

    if ctx.trigger_role == SenderRole::Operator {
        return format!(
            "Category: {}\n\nConversation so far:\n{}\n\nThe game operator interjects: \"{}\"\n\nYou are {}. React to the operator in character, still following your rules:",
            ctx.category, history, ctx.trigger_text, ctx.speaker
        );
    }

    format!(
        "Category: {}\n\nConversation so far:\n{}\n\n{} just said: \"{}\"\n\nYou are {}. Give your {} line:",
        ctx.category,
        history,
        ctx.trigger_sender,
        ctx.trigger_text,
        ctx.speaker,
        ctx.phase.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn context(is_liar: bool) -> SpeechContext {
        SpeechContext {
            phase: Phase::Statement1,
            category: "Animals".to_string(),
            keyword: if is_liar { "???" } else { "tiger" }.to_string(),
            is_liar,
            speaker: "Fox".to_string(),
            persona: Some("sly, smug and petty".to_string()),
            trigger_sender: "Panda".to_string(),
            trigger_role: SenderRole::Human,
            trigger_text: "I use it every morning".to_string(),
            history: vec!["Panda: I use it every morning".to_string()],
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        async fn generate(&self, _request: GenerateRequest) -> LlmResult<GenerateResponse> {
            Err(LlmError::ApiError("boom".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.ollama_model, "llama3.2");
        assert_eq!(config.default_max_tokens, 300);
        assert!(config.build_manager().is_err());
    }

    #[test]
    fn test_citizen_prompt_carries_keyword_and_rules() {
        let request = GenerateRequest::for_speaker(context(false), &LlmConfig::default());
        assert!(request.system.contains("(tiger)"));
        assert!(request.system.contains("Never say the secret word \"tiger\""));
        assert!(request.system.contains("first statement"));
        assert!(request.system.contains("sly, smug and petty"));
        assert!(request.prompt.contains("Panda just said"));
        assert!(request.prompt.contains("You are Fox"));
    }

    #[test]
    fn test_operator_prompt_asks_for_a_reaction() {
        let mut ctx = context(false);
        ctx.trigger_sender = crate::types::OPERATOR_NAME.to_string();
        ctx.trigger_role = SenderRole::Operator;
        ctx.trigger_text = "Someone here is lying".to_string();

        let request = GenerateRequest::for_speaker(ctx, &LlmConfig::default());
        assert!(request
            .prompt
            .contains("The game operator interjects: \"Someone here is lying\""));
        assert!(request.prompt.contains("React to the operator"));
        assert!(!request.prompt.contains("just said"));
    }

    #[test]
    fn test_liar_prompt_omits_keyword() {
        let request = GenerateRequest::for_speaker(context(true), &LlmConfig::default());
        assert!(request.system.contains("you are the liar"));
        assert!(!request.system.contains("tiger"));
    }

    #[tokio::test]
    async fn test_batch_preserves_request_order() {
        let manager = LlmManager::offline();
        let mut first = context(false);
        first.speaker = "Whale".to_string();
        let second = context(false);

        let config = LlmConfig::default();
        let texts = manager
            .generate_batch(vec![
                GenerateRequest::for_speaker(first.clone(), &config),
                GenerateRequest::for_speaker(second.clone(), &config),
            ])
            .await
            .unwrap();

        assert_eq!(texts, vec![scripted_line(&first), scripted_line(&second)]);
    }

    #[tokio::test]
    async fn test_batch_fails_as_a_whole() {
        let manager = LlmManager::new(vec![Box::new(TemplateProvider), Box::new(FailingProvider)]);
        let config = LlmConfig::default();
        let result = manager
            .generate_batch(vec![
                GenerateRequest::for_speaker(context(false), &config),
                GenerateRequest::for_speaker(context(false), &config),
            ])
            .await;

        assert!(matches!(result, Err(LlmError::ApiError(_))));
    }

    #[tokio::test]
    async fn test_empty_batch_needs_no_provider() {
        let manager = LlmManager::new(Vec::new());
        assert!(manager.generate_batch(Vec::new()).await.unwrap().is_empty());
    }
}

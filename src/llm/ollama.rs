use super::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Ollama provider implementation
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider with the given base URL and model
    pub fn new(base_url: String, model: String) -> LlmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    system: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let start = Instant::now();

        let model = request
            .model_override
            .clone()
            .unwrap_or_else(|| self.model.clone());

        let options = (request.max_tokens.is_some() || request.temperature.is_some()).then(|| {
            OllamaOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            }
        });

        let ollama_request = OllamaGenerateRequest {
            model: model.clone(),
            system: request.system,
            prompt: request.prompt,
            stream: false,
            options,
        };

        let url = format!("{}/api/generate", self.base_url);

        // Execute with timeout
        let response = tokio::time::timeout(
            request.timeout,
            self.client.post(&url).json(&ollama_request).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout(request.timeout))?
        .map_err(|e| LlmError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ApiError(format!(
                "Ollama API returned status: {}",
                response.status()
            )));
        }

        let ollama_response: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let text = ollama_response.response.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::ParseError("Empty response from Ollama".to_string()));
        }

        Ok(GenerateResponse {
            text,
            metadata: ResponseMetadata {
                provider: "ollama".to_string(),
                model,
                tokens_used: None, // Ollama doesn't return token counts in this API
                latency_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let provider =
            OllamaProvider::new("http://localhost:11434/".to_string(), "llama3.2".to_string())
                .unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_request_serialization_skips_empty_options() {
        let request = OllamaGenerateRequest {
            model: "llama3.2".to_string(),
            system: "sys".to_string(),
            prompt: "hi".to_string(),
            stream: false,
            options: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("options").is_none());
        assert_eq!(json["stream"], false);
    }

    #[tokio::test]
    #[ignore] // Only run with Ollama running locally
    async fn test_ollama_generate() {
        let provider =
            OllamaProvider::new("http://localhost:11434".to_string(), "llama3.2".to_string())
                .unwrap();

        let request =
            GenerateRequest::for_speaker(crate::llm::tests::context(false), &LlmConfig::default());

        let response = provider.generate(request).await.unwrap();

        assert!(!response.text.is_empty());
        assert_eq!(response.metadata.provider, "ollama");
        println!("Generated text: {}", response.text);
    }
}

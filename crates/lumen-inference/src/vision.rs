//! Vision-model captioner for scene descriptions.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lumen_core::{defaults, Captioner, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Prompt asking the vision model for a short, BLIP-style caption.
pub const DEFAULT_CAPTION_PROMPT: &str =
    "Write one short sentence describing the scene in this photo. \
     Mention people, activities and setting. Do not mention the camera or photo.";

/// Ollama-based captioner (e.g., llava, qwen3-vl, moondream).
pub struct OllamaCaptioner {
    base_url: String,
    model: String,
    prompt: String,
    max_tokens: u32,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaCaptioner {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            prompt: DEFAULT_CAPTION_PROMPT.to_string(),
            max_tokens: defaults::CAPTION_MAX_TOKENS,
            client: reqwest::Client::new(),
            timeout_secs: defaults::CAPTION_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OLLAMA_BASE` / `OLLAMA_URL` | `http://127.0.0.1:11434` |
    /// | `OLLAMA_VISION_MODEL` | `llava` |
    pub fn from_env() -> Self {
        let model = std::env::var(defaults::ENV_OLLAMA_VISION_MODEL)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| defaults::VISION_MODEL.to_string());
        let base_url = std::env::var("OLLAMA_BASE")
            .or_else(|_| std::env::var("OLLAMA_URL"))
            .unwrap_or_else(|_| defaults::OLLAMA_URL.to_string());
        Self::new(base_url, model)
    }

    /// Override the caption prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Override the maximum number of generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the request timeout.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    images: Vec<String>, // base64 encoded
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Strip whitespace and wrapping quotes some models add around captions.
fn clean_caption(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

#[async_trait]
impl Captioner for OllamaCaptioner {
    #[instrument(skip(self), fields(subsystem = "inference", component = "ollama_vision", op = "caption", model = %self.model))]
    async fn caption(&self, image_path: &Path) -> Result<String> {
        use base64::Engine;

        let start = Instant::now();
        let image_data = tokio::fs::read(image_path).await.map_err(|e| {
            Error::Caption(format!("Cannot read {}: {}", image_path.display(), e))
        })?;
        if image_data.is_empty() {
            return Err(Error::Caption(format!(
                "Image file is empty: {}",
                image_path.display()
            )));
        }
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&image_data);

        let request = OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            images: vec![image_b64],
            stream: false,
            options: GenerateOptions {
                num_predict: self.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Caption(format!("Vision request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Caption(format!(
                "Vision API returned {}: {}",
                status, body
            )));
        }

        let result: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Caption(format!("Failed to parse vision response: {}", e)))?;

        let caption = clean_caption(&result.response);
        if caption.is_empty() {
            return Err(Error::Caption(format!(
                "Model returned an empty caption for {}",
                image_path.display()
            )));
        }

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            response_len = caption.len(),
            "Caption complete"
        );
        Ok(caption)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_captioner_new() {
        let captioner =
            OllamaCaptioner::new("http://localhost:11434".to_string(), "llava".to_string());
        assert_eq!(captioner.base_url, "http://localhost:11434");
        assert_eq!(captioner.model, "llava");
        assert_eq!(captioner.timeout_secs, defaults::CAPTION_TIMEOUT_SECS);
        assert_eq!(captioner.max_tokens, 32);
        assert_eq!(captioner.model_name(), "llava");
    }

    #[test]
    fn test_builder_overrides() {
        let captioner = OllamaCaptioner::new("http://test".to_string(), "moondream".to_string())
            .with_prompt("Caption this")
            .with_max_tokens(16)
            .with_timeout_secs(5);
        assert_eq!(captioner.prompt, "Caption this");
        assert_eq!(captioner.max_tokens, 16);
        assert_eq!(captioner.timeout_secs, 5);
    }

    #[test]
    fn test_generate_request_serialization() {
        let request = OllamaGenerateRequest {
            model: "llava".to_string(),
            prompt: "Describe".to_string(),
            images: vec!["base64data".to_string()],
            stream: false,
            options: GenerateOptions { num_predict: 32 },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llava");
        assert_eq!(json["images"][0], "base64data");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 32);
    }

    #[test]
    fn test_clean_caption() {
        assert_eq!(clean_caption("  \"a dog on grass\"\n"), "a dog on grass");
        assert_eq!(clean_caption("   "), "");
    }

    #[tokio::test]
    async fn test_missing_file_is_caption_error() {
        let captioner = OllamaCaptioner::new("http://127.0.0.1:9".to_string(), "llava".to_string());
        let err = captioner
            .caption(Path::new("/definitely/not/here.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Caption(_)));
    }
}

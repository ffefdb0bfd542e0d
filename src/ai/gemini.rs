use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

use super::{
    AnalysisResult, DEFAULT_REQUEST_TIMEOUT, DescriptionSource, http_client, parse_ai_response,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiService {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiService {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Bound every request to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    fn endpoint(&self) -> String {
        format!("{API_BASE}/{}:generateContent", self.model)
    }

    fn request_body(image_base64: &str, prompt: &str, mime_type: &str) -> Value {
        json!({
            "contents": [
                {
                    "parts": [
                        { "text": prompt },
                        {
                            "inline_data": {
                                "mime_type": mime_type,
                                "data": image_base64
                            }
                        }
                    ]
                }
            ],
            "generationConfig": {
                "maxOutputTokens": 1024,
                "responseMimeType": "application/json"
            }
        })
    }
}

#[async_trait::async_trait]
impl DescriptionSource for GeminiService {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn analyze(
        &self,
        image_base64: &str,
        prompt: &str,
        mime_type: &str,
    ) -> Result<AnalysisResult> {
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(image_base64, prompt, mime_type))
            .send()
            .await
            .context("Gemini request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read Gemini response")?;

        if !status.is_success() {
            anyhow::bail!("Gemini API error ({}): {}", status, text);
        }

        let json: Value =
            serde_json::from_str(&text).context("Failed to parse Gemini response JSON")?;

        let content = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .context("No content in Gemini response")?;

        parse_ai_response(content)
    }
}

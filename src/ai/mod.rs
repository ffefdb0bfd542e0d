mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicService;
pub use gemini::GeminiService;
pub use openai::OpenAiService;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::BrandProfile;

/// Structured description returned by AI vision analysis.
///
/// Every field defaults to empty: models routinely omit or null out fields,
/// and the field mapper supplies fallbacks for the ones it needs.
///
/// # Fields
///
/// - `title`: name of the concept shown, usually derived from the filename
/// - `headline`: one-sentence value proposition
/// - `description`: two or three sentence caption
/// - `keywords`: ordered SEO keywords
/// - `category`, `supplemental_category`: the model's suggestion, kept for
///   display only
/// - `create_date`: the date the model was given in the prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub title: String,
    pub headline: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub category: Option<String>,
    pub supplemental_category: Option<String>,
    pub create_date: Option<String>,
}

/// A vision-AI backend that turns an image into an [`AnalysisResult`].
///
/// The library ships with [`AnthropicService`], [`OpenAiService`] and
/// [`GeminiService`]. Sources are tried in the configured order by
/// [`crate::pipeline::MetadataService`].
///
/// # Example
///
/// ```rust,no_run
/// use groundswell_meta::ai::{build_prompt, AnthropicService, DescriptionSource};
/// use groundswell_meta::config::BrandProfile;
///
/// # async fn example() -> anyhow::Result<()> {
/// let service = AnthropicService::new("sk-ant-...".into(), "claude-sonnet-4-20250514".into());
/// let prompt = build_prompt("storefront.jpg", "2025-01-01", &BrandProfile::default());
/// let result = service.analyze("base64data", &prompt, "image/jpeg").await?;
/// println!("Title: {}", result.title);
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait DescriptionSource: Send + Sync {
    /// The display name of this source (e.g., "Anthropic", "Gemini").
    fn name(&self) -> &str;

    /// Analyze a base64-encoded image and return its description.
    ///
    /// * `image_base64`: the image bytes encoded as base64
    /// * `prompt`: the analysis prompt (see [`build_prompt`])
    /// * `mime_type`: `"image/jpeg"` or `"image/png"`
    async fn analyze(
        &self,
        image_base64: &str,
        prompt: &str,
        mime_type: &str,
    ) -> Result<AnalysisResult>;
}

/// Per-request HTTP timeout for sources built without an explicit one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client whose requests give up after `timeout`.
fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            log::error!("Failed to build HTTP client with timeout, using default client: {e}");
            reqwest::Client::new()
        })
}

/// Build the analysis prompt for one upload.
///
/// Asks for a JSON object with the [`AnalysisResult`] fields, anchored on
/// the upload's filename and the organization context from the brand
/// profile.
pub fn build_prompt(filename: &str, current_date: &str, brand: &BrandProfile) -> String {
    let organization = &brand.organization;
    let category = &brand.category;
    let context = &brand.prompt_context;
    format!(
        r#"Based on the image filename and visual content, generate metadata for this {organization} image.

Filename: {filename}

Generate the following metadata in JSON format:
{{
  "title": "The title/name of the concept shown (from filename or image)",
  "headline": "A brief compelling headline (1 sentence) describing the value proposition",
  "description": "A detailed 2-3 sentence description of the concept",
  "keywords": ["list", "of", "relevant", "keywords"],
  "category": "{category}",
  "supplemental_category": "The specific sub-category",
  "create_date": "{current_date}"
}}

Rules:
- "title" should match the concept name from the filename (remove the file extension, clean up formatting).
- "headline" should convey the business value.
- "description" should explain what the concept means and why it matters to businesses.
- "keywords" should include the concept name, {organization}, and relevant business terms.
- Base your response on the visual content and the context below.

{context}

Return ONLY the JSON object, no markdown formatting, no code blocks, no extra text."#
    )
}

/// A reply in which no JSON object could be found, even after repair.
///
/// Sources return it through [`parse_ai_response`] so the chain can tell an
/// unusable reply apart from an unreachable service.
#[derive(Debug, thiserror::Error)]
#[error("AI reply contained no JSON object")]
pub struct UnparseableReply;

/// Parse raw AI response text into an [`AnalysisResult`].
///
/// Handles common AI quirks: markdown code fences, surrounding prose,
/// trailing commas, unquoted values, `null` fields and keywords given as a
/// single comma-separated string.
///
/// Fails with [`UnparseableReply`] when nothing in the text parses as JSON,
/// and with a plain error when the JSON has none of the expected fields.
pub fn parse_ai_response(text: &str) -> Result<AnalysisResult> {
    log::debug!("Raw AI response:\n{text}");

    let mut found_json = false;
    for candidate in json_candidates(text) {
        let Some(value) = parse_lenient(candidate) else {
            continue;
        };
        found_json = true;
        if let Some(result) = value_to_analysis(&value) {
            return Ok(result);
        }
        log::debug!("Parsed value without expected fields: {value:#}");
    }

    if found_json {
        anyhow::bail!("AI response is valid JSON but has none of the expected fields");
    }
    Err(UnparseableReply.into())
}

/// Description of an upload derived from its filename alone, used when the
/// AI reply held no JSON. `None` when the filename gives no title.
pub fn filename_analysis(
    filename: &str,
    current_date: &str,
    brand: &BrandProfile,
) -> Option<AnalysisResult> {
    let title = crate::metadata::fallback_title(filename);
    if title.is_empty() {
        return None;
    }
    let organization = &brand.organization;
    let category = &brand.category;
    Some(AnalysisResult {
        headline: format!("Learn about {title} with {organization}"),
        description: format!("{title} is a key concept in the {organization} {category}."),
        keywords: vec![
            title.clone(),
            organization.clone(),
            "business".to_string(),
            "organizational development".to_string(),
        ],
        category: Some(category.clone()),
        supplemental_category: Some("General".to_string()),
        create_date: Some(current_date.to_string()),
        title,
    })
}

/// Strict parse, then a parse of the repaired text.
fn parse_lenient(candidate: &str) -> Option<serde_json::Value> {
    serde_json::from_str(candidate)
        .or_else(|_| serde_json::from_str(&repair_json(candidate)))
        .ok()
}

/// Where a JSON object may sit in a reply, most specific first: fenced
/// blocks, each top-level `{...}`, then the whole text.
fn json_candidates(text: &str) -> Vec<&str> {
    let text = text.trim();
    let mut candidates = Vec::new();

    // odd segments between ``` markers are fence bodies
    for block in text.split("```").skip(1).step_by(2) {
        let body = match block.split_once('\n') {
            Some((tag, rest)) if !tag.contains('{') => rest,
            _ => block,
        };
        let body = body.trim();
        if !body.is_empty() {
            candidates.push(body);
        }
    }

    candidates.extend(top_level_objects(text));
    candidates.push(text);
    candidates
}

/// Each char with its byte offset and whether it belongs to a string
/// literal (quotes included).
fn lex(text: &str) -> impl Iterator<Item = (usize, char, bool)> + '_ {
    let mut in_string = false;
    let mut escaped = false;
    text.char_indices().map(move |(i, c)| {
        let was_in_string = in_string;
        if !in_string {
            in_string = c == '"';
        } else if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            in_string = false;
        }
        (i, c, was_in_string || in_string)
    })
}

/// Balanced `{...}` spans outside string literals, outermost only.
fn top_level_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c, quoted) in lex(text) {
        if quoted {
            continue;
        }
        match c {
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    objects.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    objects
}

/// Drop trailing commas and quote bare string values such as
/// `"title": Storefront view,`.
fn repair_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut skip_until = 0;

    for (i, c, quoted) in lex(text) {
        if i < skip_until {
            continue;
        }
        if quoted {
            out.push(c);
            continue;
        }
        let rest = &text[i + c.len_utf8()..];
        match c {
            ',' if rest.trim_start().starts_with(['}', ']']) => {}
            ':' => {
                out.push(':');
                let value = rest.trim_start_matches([' ', '\t']);
                if !is_bare_word(value) {
                    continue;
                }
                let len = value.find([',', '}', '\n']).unwrap_or(value.len());
                out.push(' ');
                out.push_str(&serde_json::Value::from(value[..len].trim_end()).to_string());
                skip_until = text.len() - value.len() + len;
            }
            _ => out.push(c),
        }
    }
    out
}

/// Whether a JSON value position starts with something that is not a JSON
/// literal, e.g. `Storefront view`.
fn is_bare_word(value: &str) -> bool {
    let Some(first) = value.chars().next() else {
        return false;
    };
    if matches!(first, '"' | '{' | '[' | '-' | '\r' | '\n') || first.is_ascii_digit() {
        return false;
    }
    let word_end = value
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(value.len());
    !matches!(&value[..word_end], "null" | "true" | "false")
}

/// Pull [`AnalysisResult`] fields out of a JSON object, tolerating nulls
/// and loosely typed values. `None` when none of the fields is present.
fn value_to_analysis(val: &serde_json::Value) -> Option<AnalysisResult> {
    let obj = val.as_object()?;
    let text = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(|s| s.trim().to_string());

    let keywords = match obj.get("keywords").or_else(|| obj.get("tags")) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(serde_json::Value::String(joined)) => joined
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    let result = AnalysisResult {
        title: text("title").unwrap_or_default(),
        headline: text("headline").unwrap_or_default(),
        description: text("description").unwrap_or_default(),
        keywords,
        category: text("category").filter(|s| !s.is_empty()),
        supplemental_category: text("supplemental_category").filter(|s| !s.is_empty()),
        create_date: text("create_date").filter(|s| !s.is_empty()),
    };

    if result == AnalysisResult::default() {
        None
    } else {
        Some(result)
    }
}

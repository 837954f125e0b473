use crate::error::ApiError;
use crate::ImageGenerator;
use base64::Engine;
use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat models take the ratio as part of the prompt.
pub fn prompt_with_ratio(prompt: &str, aspect_ratio: &str) -> String {
    format!("{}\n\nAspect ratio: {}", prompt, aspect_ratio)
}

#[derive(Serialize)]
struct OpenRouterChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    modalities: [&'static str; 2],
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    images: Vec<ResponseImage>,
}

#[derive(Deserialize, Debug)]
struct ResponseImage {
    #[serde(default)]
    #[serde(alias = "imageUrl")]
    image_url: Option<ResponseImageUrl>,
}

#[derive(Deserialize, Debug)]
struct ResponseImageUrl {
    url: String,
}

// POST {GEMINI_BASE}/{model}:generateContent, authenticated with x-goog-api-key.
#[derive(Serialize)]
struct GeminiGenerateContentRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: [&'static str; 2],
}

#[derive(Deserialize, Debug)]
struct GeminiGenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponsePart {
    #[serde(default)]
    #[serde(alias = "inlineData")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Deserialize, Debug)]
struct GeminiInlineData {
    data: String,
}

pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(api_key: String, model: String) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, api_key, model })
    }

    fn image_from_response(&self, response: Response) -> Result<Vec<u8>, ApiError> {
        let text = successful_body(response, "OpenRouter")?;
        let data: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            warn!("Unparseable OpenRouter response: {}", truncate_for_log(&text, 2000));
            ApiError::from(e)
        })?;

        let url = data
            .choices
            .first()
            .and_then(|choice| choice.message.images.first())
            .and_then(|image| image.image_url.as_ref())
            .map(|u| u.url.as_str())
            .ok_or(ApiError::EmptyImageData)?;

        match extract_base64_from_data_url(url) {
            Some(b64) => Ok(base64::engine::general_purpose::STANDARD.decode(b64)?),
            None => {
                debug!("Downloading image from {}", url);
                Ok(self.http.get(url).send()?.error_for_status()?.bytes()?.to_vec())
            }
        }
    }
}

impl ImageGenerator for OpenRouterClient {
    fn generate(&self, prompt: &str, aspect_ratio: &str) -> Result<Vec<u8>, ApiError> {
        let request = OpenRouterChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt_with_ratio(prompt, aspect_ratio),
            }],
            modalities: ["image", "text"],
        };
        debug!("Sending image generation request to OpenRouter (model {})", self.model);

        let response = self
            .http
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()?;
        self.image_from_response(response)
    }
}

pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, api_key, model })
    }
}

impl ImageGenerator for GeminiClient {
    fn generate(&self, prompt: &str, aspect_ratio: &str) -> Result<Vec<u8>, ApiError> {
        let request = GeminiGenerateContentRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt_with_ratio(prompt, aspect_ratio),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                response_modalities: ["TEXT", "IMAGE"],
            },
        };
        debug!("Sending generateContent request to Gemini (model {})", self.model);

        let response = self
            .http
            .post(format!("{}/{}:generateContent", GEMINI_BASE, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()?;
        let text = successful_body(response, "Gemini")?;
        gemini_image(&text)
    }
}

fn gemini_image(body: &str) -> Result<Vec<u8>, ApiError> {
    let data: GeminiGenerateContentResponse = serde_json::from_str(body).map_err(|e| {
        warn!("Unparseable Gemini response: {}", truncate_for_log(body, 2000));
        ApiError::from(e)
    })?;
    let inline = data
        .candidates
        .first()
        .and_then(|c| c.content.parts.iter().find_map(|p| p.inline_data.as_ref()))
        .ok_or(ApiError::EmptyImageData)?;
    Ok(base64::engine::general_purpose::STANDARD.decode(inline.data.as_str())?)
}

fn successful_body(response: Response, provider: &str) -> Result<String, ApiError> {
    let status = response.status();
    let text = response.text()?;
    if !status.is_success() {
        warn!(
            "{} returned non-success status {}. Body: {}",
            provider,
            status,
            truncate_for_log(&text, 2000)
        );
        return Err(ApiError::ApiReturnedError {
            status,
            content: text,
        });
    }
    Ok(text)
}

/// Base64 payload of a `data:image/...;base64,` URL.
pub fn extract_base64_from_data_url(url: &str) -> Option<&str> {
    let lower = url.to_ascii_lowercase();
    if !lower.starts_with("data:image/") {
        return None;
    }
    let marker = ";base64,";
    let idx = lower.find(marker)?;
    Some(&url[idx + marker.len()..])
}

pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    let total = s.chars().count();
    if total <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{}... [truncated, total_len={}]", head, total)
}

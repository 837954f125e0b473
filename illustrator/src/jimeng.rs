//! Jimeng 4.0 text-to-image on the Volcengine visual API.
//!
//! Generation is asynchronous: a task is submitted, then polled until the
//! image is ready.

use crate::error::ApiError;
use crate::signer::Signer;
use crate::ImageGenerator;
use base64::Engine;
use chrono::Utc;
use log::info;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

const BASE_URL: &str = "https://visual.volcengineapi.com";
const HOST: &str = "visual.volcengineapi.com";
const REGION: &str = "cn-north-1";
const SERVICE: &str = "cv";
const VERSION: &str = "2022-08-31";
const REQ_KEY: &str = "jimeng_t2i_v40";

const SUBMIT_ACTION: &str = "CVSync2AsyncSubmitTask";
const QUERY_ACTION: &str = "CVSync2AsyncGetResult";
const SUCCESS_CODE: i64 = 10000;
const PENDING_STATUSES: [&str; 2] = ["in_queue", "generating"];

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_WAIT: Duration = Duration::from_secs(120);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Output size for an aspect ratio. Unknown ratios get the 16:9 size.
pub fn dimensions(aspect_ratio: &str) -> (u32, u32) {
    match aspect_ratio.trim() {
        "1:1" => (2048, 2048),
        "9:16" => (1440, 2560),
        "4:3" => (2304, 1728),
        "3:4" => (1728, 2304),
        "3:2" => (2496, 1664),
        "2:3" => (1664, 2496),
        "21:9" => (3024, 1296),
        "9:21" => (1296, 3024),
        _ => (2560, 1440),
    }
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    req_key: &'a str,
    prompt: &'a str,
    width: u32,
    height: u32,
    force_single: bool,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    req_key: &'a str,
    task_id: &'a str,
    req_json: String,
}

#[derive(Deserialize, Debug, Default)]
struct JimengResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<JimengData>,
}

#[derive(Deserialize, Debug, Default)]
struct JimengData {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    binary_data_base64: Vec<String>,
}

#[derive(Debug)]
enum PollState {
    Pending(String),
    Done(JimengData),
}

fn classify(response: JimengResponse) -> Result<PollState, ApiError> {
    let data = response.data.unwrap_or_default();
    let pending = PENDING_STATUSES.contains(&data.status.as_str());

    if response.code != SUCCESS_CODE {
        if pending {
            return Ok(PollState::Pending(data.status));
        }
        return Err(ApiError::JimengError {
            code: response.code,
            message: non_empty_message(response.message),
        });
    }

    match data.status.as_str() {
        "done" => Ok(PollState::Done(data)),
        "not_found" => Err(ApiError::TaskFailed("not found, it may have expired")),
        "expired" => Err(ApiError::TaskFailed("expired, submit it again")),
        _ => Ok(PollState::Pending(data.status)),
    }
}

fn non_empty_message(message: String) -> String {
    if message.is_empty() {
        "Unknown error".to_string()
    } else {
        message
    }
}

pub struct JimengClient {
    http: Client,
    signer: Signer,
}

impl JimengClient {
    pub fn new(access_key: String, secret_key: String) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            signer: Signer {
                access_key,
                secret_key,
                host: HOST.to_string(),
                region: REGION.to_string(),
                service: SERVICE.to_string(),
                version: VERSION.to_string(),
            },
        })
    }

    fn call(&self, action: &str, body: String) -> Result<JimengResponse, ApiError> {
        let headers = self.signer.sign("POST", action, &body, Utc::now());
        let response = self
            .http
            .post(BASE_URL)
            .query(&[("Action", action), ("Version", VERSION)])
            .header("Content-Type", headers.content_type)
            .header("Host", headers.host)
            .header("X-Date", headers.x_date)
            .header("X-Content-Sha256", headers.x_content_sha256)
            .header("Authorization", headers.authorization)
            .body(body)
            .send()?;
        let text = response.text()?;
        Ok(serde_json::from_str(&text)?)
    }

    fn submit_task(&self, prompt: &str, width: u32, height: u32) -> Result<String, ApiError> {
        let body = serde_json::to_string(&SubmitRequest {
            req_key: REQ_KEY,
            prompt,
            width,
            height,
            force_single: true,
        })?;
        let response = self.call(SUBMIT_ACTION, body)?;
        if response.code != SUCCESS_CODE {
            return Err(ApiError::JimengError {
                code: response.code,
                message: non_empty_message(response.message),
            });
        }
        response
            .data
            .and_then(|d| d.task_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::ParseError("submit response is missing task_id".to_string()))
    }

    fn query_task(&self, task_id: &str) -> Result<JimengResponse, ApiError> {
        let body = serde_json::to_string(&QueryRequest {
            req_key: REQ_KEY,
            task_id,
            req_json: r#"{"return_url": false}"#.to_string(),
        })?;
        self.call(QUERY_ACTION, body)
    }

    fn wait_for_result(&self, task_id: &str) -> Result<JimengData, ApiError> {
        let started = Instant::now();
        while started.elapsed() < MAX_WAIT {
            match classify(self.query_task(task_id)?)? {
                PollState::Done(data) => return Ok(data),
                PollState::Pending(status) => {
                    info!("Task in progress ({})", status);
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
        Err(ApiError::Timeout(MAX_WAIT.as_secs()))
    }
}

impl ImageGenerator for JimengClient {
    fn generate(&self, prompt: &str, aspect_ratio: &str) -> Result<Vec<u8>, ApiError> {
        let (width, height) = dimensions(aspect_ratio);
        info!("Output size: {}x{}", width, height);

        info!("Submitting generation task");
        let task_id = self.submit_task(prompt, width, height)?;
        info!(
            "Task submitted (task_id: {}...)",
            task_id.chars().take(16).collect::<String>()
        );

        info!("Waiting for the image");
        let data = self.wait_for_result(&task_id)?;
        let encoded = data
            .binary_data_base64
            .first()
            .ok_or(ApiError::EmptyImageData)?;
        Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
    }
}

//! Blocking client for an OpenAI-compatible chat-completions endpoint,
//! implementing the loop's [`InferenceService`] contract: spec
//! interpretation and per-file repair proposals.

use std::io::Read;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use veritree_core::compare::DiffRecord;
use veritree_core::hier::HierarchyNode;
use veritree_core::orchestrate::{InferError, InferenceService};

pub const DEFAULT_MODEL: &str = "gpt-5";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

const SPEC_SYSTEM_PROMPT: &str = r#"You are the specification interpreter of a chip-design verification framework.
Read the design specification of an SoC and produce a structured JSON document describing the intended architecture.

Strict output requirements:
- Output ONLY valid JSON. No explanations, no comments, no markdown, no extra text.
- All field names must match the schema exactly; all strings double-quoted.
- If information is missing in the specification, use an empty list [] or empty string "".
- Do not infer RTL-level details; only extract what the specification states.
- If an item does not exist, do NOT invent one.

Output a single JSON object for the top-level module, recursively:

{
  "Module_name": "string",
  "Instance_name": "string",
  "Port": [
    "port_name",
    "port_name : signal"
  ],
  "Instances": [
    { "Module_name": "string", "Instance_name": "string", "Port": ["..."], "Instances": [] }
  ]
}

Use "Top" as the root Instance_name. For submodule ports capture the
"port_name : signal_name" connection form when the specification describes it.
Ensure every list is present even when empty and that the JSON parses."#;

const REPAIR_SYSTEM_PROMPT: &str = r#"You are an expert Verilog/SystemVerilog RTL engineer.
Fix mismatches between the design specification and the implemented RTL.
You are given the file path, the current file content, and a JSON object
describing the difference (expected architecture vs. the parsed RTL).

Modify the RTL to match the expected architecture:
- Change only what is needed to resolve the mismatch (port names, module names, instance names).
- Preserve the rest of the logic.
- Output the FULL modified file content.
- Output raw code only, with no markdown fencing."#;

/// Validated client configuration. A missing API key is a configuration
/// error raised here, before any iteration runs.
#[derive(Debug, Clone)]
pub struct InferConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl InferConfig {
    pub fn new(
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<InferConfig, InferError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| InferError::new("no API key configured for the inference service"))?;
        Ok(InferConfig {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: u32,
}

pub struct OpenAiClient {
    config: InferConfig,
}

impl OpenAiClient {
    pub fn new(config: InferConfig) -> OpenAiClient {
        OpenAiClient { config }
    }

    fn chat(&self, system: &str, user: &str) -> Result<String, InferError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| InferError::new(format!("encode request: {e}")))?;

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let resp = ureq::post(&url)
            .config()
            .timeout_global(Some(self.config.timeout))
            .http_status_as_error(false)
            .build()
            .header("authorization", &format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .send(&body[..])
            .map_err(|e| InferError::new(format!("POST {url}: {e}")))?;

        let status: u16 = resp.status().into();
        let mut reader = resp.into_body().into_reader();
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| InferError::new(format!("read response body: {e}")))?;

        if status != 200 {
            return Err(InferError::new(format!(
                "inference endpoint returned HTTP {status}: {}",
                String::from_utf8_lossy(&bytes[..bytes.len().min(512)])
            )));
        }
        chat_content(&bytes)
    }
}

/// Extracts `choices[0].message.content` from a chat-completions response.
pub fn chat_content(bytes: &[u8]) -> Result<String, InferError> {
    let doc: Value = serde_json::from_slice(bytes)
        .map_err(|e| InferError::new(format!("response is not JSON: {e}")))?;
    let content = doc["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| InferError::new("response carries no message content"))?;
    Ok(content.to_string())
}

/// Strips one level of markdown code fencing (```/```lang lines) and outer
/// whitespace. Inference services fence their output despite instructions.
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.first().is_some_and(|l| l.starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim_end().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

impl InferenceService for OpenAiClient {
    fn interpret_spec(&self, spec_text: &str) -> Result<HierarchyNode, InferError> {
        let content = self.chat(SPEC_SYSTEM_PROMPT, spec_text)?;
        let cleaned = strip_fences(&content);
        if cleaned.is_empty() {
            return Err(InferError::new("spec interpretation returned no content"));
        }
        serde_json::from_str(&cleaned).map_err(|e| {
            InferError::new(format!("spec interpretation is not a hierarchy tree: {e}"))
        })
    }

    fn propose_repair(&self, diff: &DiffRecord, file_text: &str) -> Result<String, InferError> {
        let diff_json = serde_json::to_string_pretty(diff)
            .map_err(|e| InferError::new(format!("encode diff: {e}")))?;
        let user = format!(
            "File: {}\n\nDifference detected:\n{}\n\nCurrent file content:\n{}\n\nProvide the corrected full file content.",
            diff.file, diff_json, file_text
        );
        let content = self.chat(REPAIR_SYSTEM_PROMPT, &user)?;
        let cleaned = strip_fences(&content);
        if cleaned.is_empty() {
            return Err(InferError::new("repair proposal returned no content"));
        }
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfenced_text_passes_through_trimmed() {
        assert_eq!(strip_fences("  module m;\nendmodule\n"), "module m;\nendmodule");
    }

    #[test]
    fn plain_fences_are_stripped() {
        assert_eq!(strip_fences("```\nmodule m;\n```"), "module m;");
    }

    #[test]
    fn language_tagged_fences_are_stripped() {
        assert_eq!(
            strip_fences("```verilog\nmodule m;\nendmodule\n```\n"),
            "module m;\nendmodule"
        );
        assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn fully_fenced_empty_body_is_empty() {
        assert_eq!(strip_fences("```\n```"), "");
    }

    #[test]
    fn chat_content_extracts_the_first_choice() {
        let body = br#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(chat_content(body).expect("content"), "hello");
    }

    #[test]
    fn chat_content_rejects_shapeless_responses() {
        assert!(chat_content(b"{}").is_err());
        assert!(chat_content(b"not json").is_err());
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        assert!(InferConfig::new(None, None, None, None).is_err());
        assert!(InferConfig::new(Some("   ".to_string()), None, None, None).is_err());
    }

    #[test]
    fn config_defaults_apply() {
        let cfg = InferConfig::new(Some("sk-test".to_string()), None, None, None).expect("cfg");
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn chat_request_body_shape_is_pinned() {
        let req = ChatRequest {
            model: "gpt-5",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            temperature: 0,
        };
        let v: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&req).expect("encode")).expect("parse");
        assert_eq!(v["model"], "gpt-5");
        assert_eq!(v["temperature"], 0);
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "u");
    }
}

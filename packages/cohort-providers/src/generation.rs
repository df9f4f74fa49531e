use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Submit a prompt to the generation backend and collect the produced text.
///
/// Speaks the Ollama generate protocol: `{model, prompt, stream: false}` in,
/// `{"response": "…"}` out. No retry here; resubmitting a generation request
/// is a caller decision.
pub async fn generate(
	cfg: &cohort_config::GenerationProviderConfig,
	model: &str,
	prompt: &str,
) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": model,
		"prompt": prompt,
		"stream": false,
		"options": { "temperature": cfg.temperature },
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(cfg.api_key.as_deref(), &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await.map_err(|_| Error::InvalidResponse {
		message: "Generation response is not valid JSON.".to_string(),
	})?;

	parse_generation_response(json)
}

fn parse_generation_response(json: Value) -> Result<String> {
	json.get("response").and_then(Value::as_str).map(str::to_string).ok_or_else(|| {
		Error::InvalidResponse {
			message: "Generation response is missing the response field.".to_string(),
		}
	})
}

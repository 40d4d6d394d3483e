//! OpenAI-compatible chat-completions backend with streamed responses

use super::{FragmentStream, GenerationConfig, GenerationService, ServiceError};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Generation service speaking the chat-completions protocol
pub struct OpenAiService {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiService {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(OpenAiService {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl GenerationService for OpenAiService {
    fn generate<'a>(
        &'a self,
        model: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<FragmentStream<'a>, ServiceError> {
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: config.max_output_length,
            stream: true,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or(text);
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(Box::new(SseFragments::new(std::io::BufReader::new(response))))
    }
}

/// Server-sent event reader yielding the content deltas of a chat stream
pub struct SseFragments<R> {
    reader: R,
    done: bool,
}

impl<R: BufRead> SseFragments<R> {
    pub fn new(reader: R) -> Self {
        SseFragments {
            reader,
            done: false,
        }
    }

    fn next_line(&mut self) -> Option<Result<String, ServiceError>> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(Ok(line)),
            Err(e) => Some(Err(ServiceError::Stream(e.to_string()))),
        }
    }
}

impl<R: BufRead> Iterator for SseFragments<R> {
    type Item = Result<String, ServiceError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.next_line() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(line)) => line,
            };

            // Blank lines separate events; other fields (event:, id:, :comment) carry no text
            let Some(payload) = line.trim_end().strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim_start();
            if payload == "[DONE]" {
                self.done = true;
                return None;
            }

            match serde_json::from_str::<ChatChunk>(payload) {
                Ok(chunk) => {
                    let text: String = chunk
                        .choices
                        .into_iter()
                        .filter_map(|choice| choice.delta.and_then(|d| d.content))
                        .collect();
                    if !text.is_empty() {
                        return Some(Ok(text));
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(ServiceError::Decode(e.to_string())));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fragments(body: &str) -> Vec<Result<String, ServiceError>> {
        SseFragments::new(Cursor::new(body.to_string())).collect()
    }

    #[test]
    fn test_reads_deltas_in_order() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Pur\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"pose: \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"X\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let out: Vec<String> = fragments(body).into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec!["Pur", "pose: ", "X"]);
    }

    #[test]
    fn test_stops_at_done_marker() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
        );
        let out: Vec<String> = fragments(body).into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec!["a"]);
    }

    #[test]
    fn test_ignores_comments_and_other_fields() {
        let body = concat!(
            ": keep-alive\n",
            "event: message\n",
            "id: 7\n",
            "data:{\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\n",
            "\n",
        );
        let out: Vec<String> = fragments(body).into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec!["ok"]);
    }

    #[test]
    fn test_stream_without_done_ends_at_eof() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}\n";
        let out: Vec<String> = fragments(body).into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec!["tail"]);
    }

    #[test]
    fn test_undecodable_event_is_an_error() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {not json\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
        );
        let out = fragments(body);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("a".to_string()));
        assert!(matches!(out[1], Err(ServiceError::Decode(_))));
    }

    #[test]
    fn test_empty_body_yields_nothing() {
        assert!(fragments("").is_empty());
    }
}

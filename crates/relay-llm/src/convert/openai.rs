//! Conversion between canonical types and the OpenAI-compatible dialect

use super::{Transformed, clamp_max_tokens, clamp_temperature, is_droppable};
use crate::error::TransformError;
use crate::protocol::openai::{
    OpenAiContent, OpenAiContentPart, OpenAiFunctionCall, OpenAiFunctionDef, OpenAiImageUrl, OpenAiMessage,
    OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    CompletionRequest, CompletionResponse, Content, ContentPart, FinishReason, Message, Role, StreamChunk, ToolCall,
    Usage,
};

// -- Outbound: canonical request -> OpenAI wire request --

/// Build a chat completions body
///
/// Text parts are flattened into a single string. Image parts keep the
/// multipart shape since the text-only form cannot carry them.
pub fn to_openai(request: &CompletionRequest) -> Transformed<OpenAiRequest> {
    let mut warnings = Vec::new();

    let messages = request
        .messages
        .iter()
        .filter(|message| {
            let drop = is_droppable(message);
            if drop {
                tracing::debug!(role = ?message.role, "dropping empty message");
            }
            !drop
        })
        .map(message_to_openai)
        .collect();

    let tools = request.tools.as_ref().filter(|tools| !tools.is_empty()).map(|tools| {
        tools
            .iter()
            .map(|tool| OpenAiTool {
                tool_type: "function".to_owned(),
                function: OpenAiFunctionDef {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    });

    let temperature = request.params.temperature.map(|t| clamp_temperature(t, &mut warnings));
    let max_tokens = request.params.max_tokens.map(|n| clamp_max_tokens(n, None, &mut warnings));

    let wire = OpenAiRequest {
        model: request.model.clone(),
        messages,
        temperature,
        top_p: request.params.top_p,
        max_tokens,
        stop: request.params.stop.clone(),
        tools,
        stream: None,
        stream_options: None,
        extra: serde_json::Map::new(),
    };

    Transformed { wire, warnings }
}

fn message_to_openai(message: &Message) -> OpenAiMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    let content = match &message.content {
        Content::Parts(parts) if message.content.has_images() => Some(OpenAiContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => OpenAiContentPart::Text { text: text.clone() },
                    ContentPart::Image { url, detail } => OpenAiContentPart::ImageUrl {
                        image_url: OpenAiImageUrl {
                            url: url.clone(),
                            detail: detail.clone(),
                        },
                    },
                })
                .collect(),
        )),
        content if message.role == Role::Assistant && message.has_tool_calls() && content.is_blank() => None,
        content => Some(OpenAiContent::Text(content.as_text())),
    };

    let tool_calls = message.tool_calls.as_ref().filter(|calls| !calls.is_empty()).map(|calls| {
        calls
            .iter()
            .map(|call| OpenAiToolCall {
                id: call.id.clone(),
                call_type: "function".to_owned(),
                function: OpenAiFunctionCall {
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                },
            })
            .collect()
    });

    OpenAiMessage {
        role: role.to_owned(),
        content,
        name: message.name.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
        reasoning_content: None,
    }
}

// -- Inbound: OpenAI wire response -> canonical types --

/// Map an OpenAI finish reason
pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::MaxTokens,
        "tool_calls" | "function_call" => FinishReason::ToolCall,
        _ => FinishReason::Other,
    }
}

fn map_usage(usage: OpenAiUsage) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
    }
}

/// Convert a chat completions response; only the first choice is used
pub fn from_openai(response: OpenAiResponse) -> Result<CompletionResponse, TransformError> {
    let usage = response.usage.map(map_usage).unwrap_or_default();
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(TransformError::EmptyResponse)?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall::new(call.id, call.function.name, call.function.arguments))
        .collect();

    let finish_reason = if tool_calls.is_empty() {
        choice.finish_reason.as_deref().map_or(FinishReason::Stop, map_finish_reason)
    } else {
        FinishReason::ToolCall
    };

    let text = choice.message.content.map(OpenAiContent::into_text).unwrap_or_default();
    let reasoning = choice.message.reasoning_content.filter(|r| !r.trim().is_empty());

    let message = if tool_calls.is_empty() {
        Message::assistant(text)
    } else {
        Message {
            content: Content::Text(text),
            ..Message::assistant_tool_calls(tool_calls)
        }
    };

    Ok(CompletionResponse {
        model: response.model,
        message,
        finish_reason,
        usage,
        reasoning,
        warnings: Vec::new(),
    })
}

// -- Stream conversion --

/// Decode one streaming chunk; only the first choice is used
pub fn openai_chunk_to_stream(chunk: &OpenAiStreamChunk) -> Vec<StreamChunk> {
    let mut out = Vec::new();

    for choice in chunk.choices.iter().filter(|c| c.index == 0) {
        let delta = &choice.delta;

        if let Some(reasoning) = delta.reasoning_content.as_deref()
            && !reasoning.is_empty()
        {
            out.push(StreamChunk::Reasoning(reasoning.to_owned()));
        }

        if let Some(content) = delta.content.as_deref()
            && !content.is_empty()
        {
            out.push(StreamChunk::Content(content.to_owned()));
        }

        for call in delta.tool_calls.iter().flatten() {
            let function = call.function.clone().unwrap_or_default();
            out.push(StreamChunk::ToolCallDelta {
                index: call.index,
                id: call.id.clone(),
                name: function.name,
                arguments: function.arguments,
            });
        }

        if let Some(reason) = choice.finish_reason.as_deref() {
            out.push(StreamChunk::Finish(map_finish_reason(reason)));
        }
    }

    if let Some(usage) = chunk.usage {
        out.push(StreamChunk::Usage(map_usage(usage)));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolSchema;

    #[test]
    fn finish_reasons() {
        assert_eq!(map_finish_reason("stop"), FinishReason::Stop);
        assert_eq!(map_finish_reason("length"), FinishReason::MaxTokens);
        assert_eq!(map_finish_reason("tool_calls"), FinishReason::ToolCall);
        assert_eq!(map_finish_reason("content_filter"), FinishReason::Other);
    }

    #[test]
    fn flattens_text_parts_and_keeps_images_multipart() {
        let mut request = CompletionRequest::new(
            "llava",
            vec![
                Message::user(vec![
                    ContentPart::Text { text: "a".to_owned() },
                    ContentPart::Text { text: "b".to_owned() },
                ]),
                Message::user(vec![
                    ContentPart::Text {
                        text: "describe".to_owned(),
                    },
                    ContentPart::Image {
                        url: "https://example.com/cat.png".to_owned(),
                        detail: Some("low".to_owned()),
                    },
                ]),
            ],
        );
        request.params.temperature = Some(-1.0);
        request.tools = Some(vec![ToolSchema {
            name: "search".to_owned(),
            description: Some("web search".to_owned()),
            parameters: Some(serde_json::json!({"type": "object"})),
        }]);

        let Transformed { wire, warnings } = to_openai(&request);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["messages"][0]["content"], "ab");
        assert_eq!(json["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(json["messages"][1]["content"][1]["image_url"]["detail"], "low");
        assert_eq!(json["tools"][0]["function"]["name"], "search");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn assistant_tool_call_turn_has_null_content() {
        let request = CompletionRequest::new(
            "m",
            vec![
                Message::user("weather?"),
                Message::assistant_tool_calls(vec![ToolCall::new("call_1", "weather", r#"{"city":"Oslo"}"#)]),
                Message::tool("call_1", "sunny"),
            ],
        );

        let json = serde_json::to_value(to_openai(&request).wire).unwrap();
        assert!(json["messages"][1]["content"].is_null());
        assert_eq!(json["messages"][1]["tool_calls"][0]["function"]["arguments"], r#"{"city":"Oslo"}"#);
        assert_eq!(json["messages"][2]["tool_call_id"], "call_1");
    }

    #[test]
    fn response_separates_reasoning_and_tool_calls() {
        let response: OpenAiResponse = serde_json::from_str(
            r#"{
                "model": "qwen3:8b",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "reasoning": "need the weather tool",
                        "tool_calls": [{"id": "call_7", "type": "function",
                                        "function": {"name": "weather", "arguments": "{}"}}]
                    },
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
            }"#,
        )
        .unwrap();

        let canonical = from_openai(response).unwrap();
        assert_eq!(canonical.finish_reason, FinishReason::ToolCall);
        assert_eq!(canonical.reasoning.as_deref(), Some("need the weather tool"));
        assert_eq!(canonical.message.tool_calls.unwrap()[0].id, "call_7");
        assert_eq!(canonical.usage.total(), 17);
    }

    #[test]
    fn empty_choices_is_an_error() {
        let response: OpenAiResponse = serde_json::from_str(r#"{"model":"m","choices":[]}"#).unwrap();
        assert!(matches!(from_openai(response), Err(TransformError::EmptyResponse)));
    }

    #[test]
    fn stream_chunk_decoding() {
        let chunk: OpenAiStreamChunk = serde_json::from_str(
            r#"{"choices":[{"index":0,"delta":{"reasoning_content":"hm","content":"Hi",
                "tool_calls":[{"index":0,"id":"call_1","function":{"name":"f","arguments":"{\"a\""}}]},
                "finish_reason":"length"}],
                "usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
        )
        .unwrap();

        assert_eq!(
            openai_chunk_to_stream(&chunk),
            vec![
                StreamChunk::Reasoning("hm".to_owned()),
                StreamChunk::Content("Hi".to_owned()),
                StreamChunk::ToolCallDelta {
                    index: 0,
                    id: Some("call_1".to_owned()),
                    name: Some("f".to_owned()),
                    arguments: Some("{\"a\"".to_owned()),
                },
                StreamChunk::Finish(FinishReason::MaxTokens),
                StreamChunk::Usage(Usage {
                    prompt_tokens: 1,
                    completion_tokens: 2
                }),
            ]
        );
    }
}

//! Conversion between canonical types and the native `generateContent` dialect

use std::collections::HashMap;

use super::{NATIVE_MAX_OUTPUT_TOKENS, Transformed, clamp_max_tokens, clamp_temperature, is_droppable};
use crate::error::TransformError;
use crate::protocol::native::{
    FunctionDeclaration, GenerationConfig, InlineData, NativeContent, NativeFunctionCall, NativeFunctionResponse,
    NativePart, NativeRequest, NativeResponse, NativeTool, UsageMetadata,
};
use crate::types::{
    CompletionRequest, CompletionResponse, Content, ContentPart, FinishReason, Message, Role, StreamChunk, ToolCall,
    Usage,
};

// -- Outbound: canonical request -> native wire request --

/// Build a `generateContent` body
///
/// System messages are merged into `systemInstruction`. Tool results become
/// `functionResponse` parts named after the function of the originating call.
pub fn to_native(request: &CompletionRequest) -> Transformed<NativeRequest> {
    let mut warnings = Vec::new();

    let system_text = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System && !m.content.is_blank())
        .map(|m| m.content.as_text())
        .collect::<Vec<_>>()
        .join("\n\n");
    let system_instruction = (!system_text.is_empty()).then(|| NativeContent {
        role: None,
        parts: vec![NativePart::text(system_text)],
    });

    let call_names: HashMap<&str, &str> = request
        .messages
        .iter()
        .flat_map(|m| m.tool_calls.iter().flatten())
        .map(|call| (call.id.as_str(), call.function.name.as_str()))
        .collect();

    let mut contents: Vec<NativeContent> = Vec::new();
    for message in request.messages.iter().filter(|m| m.role != Role::System) {
        if is_droppable(message) {
            tracing::debug!(role = ?message.role, "dropping empty message");
            continue;
        }

        let (role, parts) = match message.role {
            Role::Assistant => ("model", assistant_parts(message)),
            Role::Tool => ("user", vec![tool_result_part(message, &call_names)]),
            Role::User | Role::System => ("user", content_parts(&message.content, &mut warnings)),
        };

        if parts.is_empty() {
            continue;
        }

        // Consecutive turns of one role share a content object
        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
            _ => contents.push(NativeContent {
                role: Some(role.to_owned()),
                parts,
            }),
        }
    }

    let params = &request.params;
    let generation_config = (params.temperature.is_some()
        || params.top_p.is_some()
        || params.max_tokens.is_some()
        || params.stop.is_some())
    .then(|| GenerationConfig {
        temperature: params.temperature.map(|t| clamp_temperature(t, &mut warnings)),
        top_p: params.top_p,
        max_output_tokens: params
            .max_tokens
            .map(|n| clamp_max_tokens(n, Some(NATIVE_MAX_OUTPUT_TOKENS), &mut warnings)),
        stop_sequences: params.stop.clone(),
        thinking_config: None,
    });

    let tools = request.tools.as_ref().filter(|tools| !tools.is_empty()).map(|tools| {
        vec![NativeTool {
            function_declarations: tools
                .iter()
                .map(|tool| FunctionDeclaration {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                })
                .collect(),
        }]
    });

    Transformed {
        wire: NativeRequest {
            contents,
            system_instruction,
            generation_config,
            tools,
        },
        warnings,
    }
}

fn content_parts(content: &Content, warnings: &mut Vec<String>) -> Vec<NativePart> {
    match content {
        Content::Text(text) => vec![NativePart::text(text.clone())],
        Content::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(NativePart::text(text.clone())),
                ContentPart::Image { url, .. } => {
                    let inline = parse_data_uri(url);
                    if inline.is_none() {
                        warnings.push(format!("image '{url}' skipped: only data URIs can be sent inline"));
                    }
                    inline.map(|inline_data| NativePart {
                        inline_data: Some(inline_data),
                        ..NativePart::default()
                    })
                }
            })
            .collect(),
    }
}

fn parse_data_uri(url: &str) -> Option<InlineData> {
    let (header, data) = url.strip_prefix("data:")?.split_once(',')?;
    let mime_type = header.strip_suffix(";base64").unwrap_or(header);
    Some(InlineData {
        mime_type: mime_type.to_owned(),
        data: data.to_owned(),
    })
}

fn assistant_parts(message: &Message) -> Vec<NativePart> {
    let mut parts = Vec::new();

    if !message.content.is_blank() {
        parts.push(NativePart::text(message.content.as_text()));
    }

    for call in message.tool_calls.iter().flatten() {
        let args = call
            .function
            .parsed_arguments()
            .unwrap_or_else(|_| serde_json::json!({ "raw": call.function.arguments }));
        parts.push(NativePart {
            function_call: Some(NativeFunctionCall {
                name: call.function.name.clone(),
                args,
            }),
            ..NativePart::default()
        });
    }

    parts
}

fn tool_result_part(message: &Message, call_names: &HashMap<&str, &str>) -> NativePart {
    let id = message.tool_call_id.as_deref().unwrap_or_default();
    let name = call_names.get(id).copied().unwrap_or(id);
    let text = message.content.as_text();

    let response = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        Ok(value) => serde_json::json!({ "result": value }),
        Err(_) => serde_json::json!({ "result": text }),
    };

    NativePart {
        function_response: Some(NativeFunctionResponse {
            name: name.to_owned(),
            response,
        }),
        ..NativePart::default()
    }
}

// -- Inbound: native wire response -> canonical types --

/// Map a native finish reason
pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::MaxTokens,
        _ => FinishReason::Other,
    }
}

fn map_usage(usage: &UsageMetadata) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count.saturating_add(usage.thoughts_token_count),
    }
}

fn call_id(index: u32, name: &str) -> String {
    format!("call_{index}_{name}")
}

/// Convert a `generateContent` response; only the first candidate is used
pub fn from_native(response: NativeResponse) -> Result<CompletionResponse, TransformError> {
    let usage = response.usage_metadata.as_ref().map(map_usage).unwrap_or_default();
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(TransformError::EmptyResponse)?;

    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(call) = part.function_call {
            #[allow(clippy::cast_possible_truncation)]
            let id = call_id(tool_calls.len() as u32, &call.name);
            tool_calls.push(ToolCall::new(id, call.name, call.args.to_string()));
        } else if let Some(fragment) = part.text.as_deref() {
            if part.thought == Some(true) {
                reasoning.push_str(fragment);
            } else {
                text.push_str(fragment);
            }
        }
    }

    let finish_reason = if tool_calls.is_empty() {
        candidate.finish_reason.as_deref().map_or(FinishReason::Stop, map_finish_reason)
    } else {
        FinishReason::ToolCall
    };

    let message = if tool_calls.is_empty() {
        Message::assistant(text)
    } else {
        Message {
            content: Content::Text(text),
            ..Message::assistant_tool_calls(tool_calls)
        }
    };

    Ok(CompletionResponse {
        model: response.model_version.unwrap_or_default(),
        message,
        finish_reason,
        usage,
        reasoning: (!reasoning.trim().is_empty()).then_some(reasoning),
        warnings: Vec::new(),
    })
}

// -- Stream conversion --

/// Decode one streamed `generateContent` response
///
/// Function calls arrive whole; `next_call` numbers them across the stream so
/// every call gets its own index and id.
pub fn native_chunk_to_stream(chunk: &NativeResponse, next_call: &mut u32) -> Vec<StreamChunk> {
    let mut out = Vec::new();

    if let Some(candidate) = chunk.candidates.first() {
        for part in candidate.content.iter().flat_map(|c| &c.parts) {
            if let Some(call) = &part.function_call {
                let index = *next_call;
                *next_call += 1;
                out.push(StreamChunk::ToolCallDelta {
                    index,
                    id: Some(call_id(index, &call.name)),
                    name: Some(call.name.clone()),
                    arguments: Some(call.args.to_string()),
                });
            } else if let Some(text) = part.text.as_deref()
                && !text.is_empty()
            {
                out.push(if part.is_thought() {
                    StreamChunk::Reasoning(text.to_owned())
                } else {
                    StreamChunk::Content(text.to_owned())
                });
            }
        }

        if let Some(reason) = candidate.finish_reason.as_deref() {
            out.push(StreamChunk::Finish(map_finish_reason(reason)));
        }
    }

    if let Some(usage) = &chunk.usage_metadata
        && candidate_finished(chunk)
    {
        out.push(StreamChunk::Usage(map_usage(usage)));
    }

    out
}

/// Usage metadata rides on every chunk; only the final one is meaningful
fn candidate_finished(chunk: &NativeResponse) -> bool {
    chunk.candidates.first().is_none_or(|c| c.finish_reason.is_some())
}

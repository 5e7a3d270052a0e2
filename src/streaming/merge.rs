//! Pairwise merging of streamed tool-call fragments.
//!
//! Zhinao streams a tool call as a run of chunks: the first carries the call
//! id, type and function name, the following ones carry slices of the JSON
//! argument text, and the run ends with `finish_reason = "tool_calls"`.
//! [`merge_chunks`] folds two consecutive chunks of such a run into one. The
//! fold is strictly left to right: argument text is concatenated in arrival
//! order.

use crate::errors::{ZhinaoError, ZhinaoResult};
use crate::types::chat::{
    ChatCompletionChunk, ChatCompletionFunction, ChatCompletionMessage, ChunkChoice,
    FinishReason, Role, ToolCall,
};

/// Returns true if the chunk carries a tool-call fragment.
pub fn is_streaming_tool_function_call(chunk: &ChatCompletionChunk) -> bool {
    !chunk.tool_calls().is_empty()
}

/// Returns true if the chunk closes a streamed tool call.
pub fn is_streaming_tool_function_call_finish(chunk: &ChatCompletionChunk) -> bool {
    chunk.finish_reason() == Some(FinishReason::ToolCalls)
}

/// Fails if a fragment carries more than one tool call.
pub(crate) fn ensure_single_tool_call(chunk: &ChatCompletionChunk) -> ZhinaoResult<()> {
    let count = chunk.tool_calls().len();
    if count > 1 {
        return Err(ZhinaoError::invalid_param(
            format!("Currently only one tool call is supported per streamed fragment, got {count}"),
            "tool_calls",
        ));
    }
    Ok(())
}

/// Merges `current` into the accumulated `previous` chunk.
///
/// Top-level fields and the first choice's finish reason and index take the
/// current value when present. Only the first choice of each chunk is kept.
///
/// # Errors
///
/// Returns [`ZhinaoError::InvalidArgument`] if `current` carries more than
/// one tool call.
pub fn merge_chunks(
    previous: ChatCompletionChunk,
    current: ChatCompletionChunk,
) -> ZhinaoResult<ChatCompletionChunk> {
    let ChatCompletionChunk {
        choices: previous_choices,
        created: previous_created,
        id: previous_id,
        model: previous_model,
        object: previous_object,
        usage: previous_usage,
    } = previous;

    let previous_choice = previous_choices.into_iter().next();
    let current_choice = current.choices.into_iter().next();
    let choice = merge_choice(previous_choice, current_choice)?;

    Ok(ChatCompletionChunk {
        choices: choice.into_iter().collect(),
        created: current.created.or(previous_created),
        id: current.id.or(previous_id),
        model: current.model.or(previous_model),
        object: current.object.or(previous_object),
        usage: current.usage.or(previous_usage),
    })
}

fn merge_choice(
    previous: Option<ChunkChoice>,
    current: Option<ChunkChoice>,
) -> ZhinaoResult<Option<ChunkChoice>> {
    let (previous, current) = match (previous, current) {
        (None, current) => return Ok(current),
        (previous, None) => return Ok(previous),
        (Some(previous), Some(current)) => (previous, current),
    };

    let delta = merge_message(
        previous.delta.unwrap_or_default(),
        current.delta.unwrap_or_default(),
    )?;

    Ok(Some(ChunkChoice {
        delta: Some(delta),
        finish_reason: current.finish_reason.or(previous.finish_reason),
        index: current.index.or(previous.index),
    }))
}

fn merge_message(
    previous: ChatCompletionMessage,
    current: ChatCompletionMessage,
) -> ZhinaoResult<ChatCompletionMessage> {
    // Content is not concatenated here; whole-stream text accumulation
    // belongs to `MessageAggregator`.
    let content = current.content.or(previous.content).unwrap_or_default();
    let role = current.role.or(previous.role).unwrap_or(Role::Assistant);

    let mut previous_calls = previous.tool_calls.unwrap_or_default();
    // The most recent call may still be receiving argument text.
    let open_call = previous_calls.pop();
    let mut tool_calls = previous_calls;

    let mut current_calls = current.tool_calls.unwrap_or_default();
    if current_calls.len() > 1 {
        return Err(ZhinaoError::invalid_param(
            format!(
                "Currently only one tool call is supported per streamed fragment, got {}",
                current_calls.len()
            ),
            "tool_calls",
        ));
    }

    match current_calls.pop() {
        Some(call) if call.id.is_some() => {
            tool_calls.extend(open_call);
            tool_calls.push(call);
        }
        Some(call) => tool_calls.push(merge_tool_call(open_call, call)),
        None => tool_calls.extend(open_call),
    }

    Ok(ChatCompletionMessage {
        role: Some(role),
        content: Some(content),
        tool_name: None,
        tool_call_id: None,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
    })
}

/// Folds an id-less continuation into the open call.
fn merge_tool_call(open: Option<ToolCall>, continuation: ToolCall) -> ToolCall {
    let Some(open) = open else {
        return continuation;
    };

    ToolCall {
        id: open.id.or(continuation.id),
        type_: open.type_.or(continuation.type_),
        function: merge_function(open.function, continuation.function),
    }
}

fn merge_function(
    previous: Option<ChatCompletionFunction>,
    current: Option<ChatCompletionFunction>,
) -> Option<ChatCompletionFunction> {
    match (previous, current) {
        (None, current) => current,
        (previous, None) => previous,
        (Some(previous), Some(current)) => {
            let mut arguments = previous.arguments.unwrap_or_default();
            if let Some(fragment) = current.arguments {
                arguments.push_str(&fragment);
            }
            Some(ChatCompletionFunction {
                name: current.name.or(previous.name),
                arguments: Some(arguments),
            })
        }
    }
}

// Cross-cutting prompt assembly shared by every gateway call.
// Each stage that calls the gateway keeps its own prompts.rs alongside it.

use super::CompletionRequest;

/// Instruction block introducing an output schema.
pub const FORMAT_INSTRUCTIONS: &str = "\
    The output should be formatted as a JSON instance that conforms to the JSON schema below. \
    Use the property names exactly as written (they are case and space sensitive). \
    Respond with the JSON only, without any additional text.";

/// Builds the user message: prompt, then format instructions with the
/// schema (if any), then the few-shot examples (if any).
pub fn build_user_message(request: &CompletionRequest<'_>) -> String {
    let mut message = request.user_prompt.trim().to_string();

    if let Some(schema) = request.output_schema {
        let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
        message.push_str("\n\n");
        message.push_str(FORMAT_INSTRUCTIONS);
        message.push_str("\n\nHere is the output schema:\n```\n");
        message.push_str(&schema);
        message.push_str("\n```");
    }

    if let Some(examples) = request.few_shot_examples {
        message.push_str("\n\nExamples:\n");
        message.push_str(examples.trim());
    }

    message
}

use serde_json::{json, Value};

/// Persona for the grounded chat engine. The model must answer from the
/// assembled event context and nothing else.
pub const CHAT_SYSTEM_INSTRUCTION: &str = "\
Role: You are \"Backstage Brain\", the official assistant for this production event.
Mission: Answer user questions based ONLY on the provided context.

Strict rules:
1. Your source of truth is the text labeled \"EVENT CONTEXT\". Do not use outside knowledge.
2. If the answer is not in the context, reply politely: \"I can only answer questions related to the official information for this event.\"
3. Be concise, helpful, and keep a professional but friendly tone.
4. If asked about topics unrelated to the event, remind the user of your function.
5. Do not introduce yourself or greet. Go straight to the answer.";

/// Persona for the timeline extraction engine.
pub const TIMELINE_SYSTEM_INSTRUCTION: &str = "\
You are an event data extraction specialist.
Your task is to analyze the event documents and extract a detailed timeline.

Instructions:
1. Identify every scheduled item with a time.
2. Group items into logical categories (e.g. \"General\", \"Main Stage\", \"Catering\", \"VIP\", \"Technical\"). When no clear grouping exists, use \"General\".
3. Extract the combined date and time (e.g. \"30 Nov - 14:00\") and the item label.
4. Your response must strictly follow the provided JSON schema.";

/// Returned (and persisted) without invoking the model when the event has no
/// documents to ground an answer.
pub const NO_DOCUMENTS_FALLBACK: &str =
    "I couldn't find any documents for this event. Please upload some files first.";

pub fn chat_prompt(context: &str, question: &str) -> String {
    format!("EVENT CONTEXT:\n{context}\n\nUSER QUESTION:\n{question}")
}

/// Response schema for schema-constrained timeline generation, in the
/// provider's uppercase type vocabulary.
pub fn timeline_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "data": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "category": {
                            "type": "STRING",
                            "description": "Category of the group of items (e.g. Main Stage, General)"
                        },
                        "items": {
                            "type": "ARRAY",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "date": {
                                        "type": "STRING",
                                        "description": "Human-readable, e.g. 14:00 or 30 Nov 14:00"
                                    },
                                    "label": {
                                        "type": "STRING",
                                        "description": "Name or short description of the item"
                                    }
                                },
                                "required": ["date", "label"]
                            }
                        }
                    },
                    "required": ["category", "items"]
                }
            }
        },
        "required": ["data"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_prompt_embeds_context_before_question() {
        let prompt = chat_prompt("--- Document: Rider.txt ---\ntext", "When is soundcheck?");
        let context_pos = prompt.find("EVENT CONTEXT").unwrap();
        let question_pos = prompt.find("USER QUESTION").unwrap();
        assert!(context_pos < question_pos);
        assert!(prompt.contains("Rider.txt"));
    }

    #[test]
    fn timeline_schema_requires_category_and_items() {
        let schema = timeline_response_schema();
        let item_schema = &schema["properties"]["data"]["items"];
        assert_eq!(item_schema["required"], json!(["category", "items"]));
        let entry_schema = &item_schema["properties"]["items"]["items"];
        assert_eq!(entry_schema["required"], json!(["date", "label"]));
    }
}

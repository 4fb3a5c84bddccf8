//! Prompts for vision-model annotation.
//!
//! The OCR backend takes the schema as a structured `document_annotation_format`
//! and needs no prompt; vision models only see text, so the schema is spelled
//! out in the user message.

/// Default system prompt for extracting one partial record from a page window.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a meticulous research assistant extracting structured data from scanned document pages.

Follow these rules precisely:

1. OUTPUT
   - Reply with a single JSON object and nothing else
   - No code fences, no commentary before or after the object

2. FIELDS
   - Use exactly the property names defined in the JSON Schema you are given
   - Fill a field only with information visible on these pages
   - When a field is not present on these pages, use null (or [] for lists)
   - Never guess or infer values from general knowledge

3. VALUES
   - Copy names, numbers and units as printed
   - Lists hold each distinct item once
   - Nested objects follow the schema's nested properties

4. PARTIAL VIEW
   - You are seeing only some pages of a longer document
   - Other pages are processed separately and merged later, so an empty field is expected and correct"#;

/// Build the user message that accompanies the page images.
pub fn window_instruction(schema_name: &str, schema_json: &str, first_page: usize, last_page: usize) -> String {
    format!(
        "Pages {first_page}-{last_page} of the document are attached.\n\
         Extract a `{schema_name}` object conforming to this JSON Schema:\n\n{schema_json}"
    )
}

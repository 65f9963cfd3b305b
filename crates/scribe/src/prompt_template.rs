//! Instruction templates rendered with tera. The bundled prompts are compiled
//! into the binary, any other name is read from disk.

use serde::Serialize;
use std::fs;
use std::path::Path;
use tera::{Context, Error as TeraError, Tera};

const BUNDLED: [(&str, &str); 14] = [
    ("comments.md", include_str!("prompts/comments.md")),
    ("comments_agent.md", include_str!("prompts/comments_agent.md")),
    ("comments_workflow.md", include_str!("prompts/comments_workflow.md")),
    ("editor_agent.md", include_str!("prompts/editor_agent.md")),
    ("grammar_check.md", include_str!("prompts/grammar_check.md")),
    ("insert_content_workflow.md", include_str!("prompts/insert_content_workflow.md")),
    ("inline_edits.md", include_str!("prompts/inline_edits.md")),
    ("inline_edits_request.md", include_str!("prompts/inline_edits_request.md")),
    ("multi_document.md", include_str!("prompts/multi_document.md")),
    ("proofreader.md", include_str!("prompts/proofreader.md")),
    ("selection_awareness.md", include_str!("prompts/selection_awareness.md")),
    ("server_agent.md", include_str!("prompts/server_agent.md")),
    ("template_workflow.md", include_str!("prompts/template_workflow.md")),
    ("tiptap_edit_workflow.md", include_str!("prompts/tiptap_edit_workflow.md")),
];

pub fn bundled_prompt(name: &str) -> Option<&'static str> {
    BUNDLED
        .iter()
        .find(|(bundled, _)| *bundled == name)
        .map(|(_, template)| *template)
}

/// Render a template held in memory
pub fn render_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("prompt", template)?;
    tera.render("prompt", &Context::from_serialize(context_data)?)
}

/// Render a bundled prompt by name, or a template file at `name`
pub fn load_prompt_file<T: Serialize>(name: impl AsRef<Path>, context_data: &T) -> Result<String, TeraError> {
    let path = name.as_ref();
    if let Some(template) = path.to_str().and_then(bundled_prompt) {
        return render_prompt(template, context_data);
    }

    let template = fs::read_to_string(path).map_err(|e| {
        TeraError::chain(format!("Failed to read prompt {}", path.display()), e)
    })?;
    render_prompt(&template, context_data)
}

use anyhow::{Context, Result};
use std::path::Path;

use crate::model::ContactRecord;

pub const NAME_PLACEHOLDER: &str = "{{name}}";

/// Replace every `{{name}}` in `template` with `name`.
pub fn render(template: &str, name: &str) -> String {
    template.replace(NAME_PLACEHOLDER, name)
}

/// The contact's own message when it has one, else the shared template.
pub fn message_for(contact: &ContactRecord, template: &str) -> String {
    let text = contact
        .custom_message
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(template);
    render(text, &contact.name)
}

/// Read the template file. No path means an empty template.
pub fn load_template(path: Option<&Path>) -> Result<String> {
    match path {
        None => Ok(String::new()),
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read template: {}", p.display())),
    }
}

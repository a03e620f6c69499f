//! Placeholder substitution for exposition templates
//!
//! `{field}` and dotted `{files.new}` placeholders are looked up in a JSON
//! object; `{{` and `}}` produce literal braces.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("no value for placeholder '{0}'")]
    MissingField(String),

    #[error("unbalanced brace at offset {0}")]
    UnbalancedBrace(usize),
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |value, key| value.get(key))
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute every placeholder of `template` from `context`
pub fn render(template: &str, context: &Value) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut path = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => return Err(TemplateError::UnbalancedBrace(offset)),
                        Some((_, ch)) => path.push(ch),
                    }
                }
                let value = lookup(context, path.trim())
                    .ok_or_else(|| TemplateError::MissingField(path.trim().to_string()))?;
                out.push_str(&display(value));
            }
            '}' => return Err(TemplateError::UnbalancedBrace(offset)),
            _ => out.push(c),
        }
    }

    Ok(out)
}

//! Command template rendering.
//!
//! Templates interpolate `{input}`, `{output}`, and any named parameter;
//! `{{` and `}}` escape literal braces. Values arrive already shell-escaped.

use indexmap::IndexMap;

use buttress_core::{BuildError, BuildResult};

/// Render a command template against a parameter map
///
/// # Errors
///
/// Returns a misconfiguration error for unknown placeholders or unbalanced
/// braces.
pub fn render(template: &str, params: &IndexMap<String, String>) -> BuildResult<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    rendered.push('{');
                    continue;
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(inner) => name.push(inner),
                        None => {
                            return Err(BuildError::Misconfigured {
                                reason: format!("unclosed placeholder in template: '{template}'"),
                            });
                        }
                    }
                }
                match params.get(&name) {
                    Some(value) => rendered.push_str(value),
                    None => {
                        return Err(BuildError::Misconfigured {
                            reason: format!("unknown placeholder '{{{name}}}' in template"),
                        });
                    }
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    rendered.push('}');
                } else {
                    return Err(BuildError::Misconfigured {
                        reason: format!("unbalanced '}}' in template: '{template}'"),
                    });
                }
            }
            other => rendered.push(other),
        }
    }

    Ok(rendered)
}

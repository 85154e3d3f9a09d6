//! Variable substitution for output name templates.

use std::collections::HashMap;

/// Variable substitution context using the `{varname}` syntax.
///
/// Substitution is a single left-to-right pass, so values that themselves
/// contain `{...}` are never expanded again. Unknown variables are left as-is.
///
/// # Example
///
/// ```
/// use muxpair_av::TemplateContext;
///
/// let ctx = TemplateContext::new()
///     .with_var("idx", "3")
///     .with_var("name", "lecture");
///
/// assert_eq!(ctx.substitute("{idx}_{name}"), "3_lecture");
/// assert_eq!(ctx.substitute("{idx}_{missing}"), "3_{missing}");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty template context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn with_var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Substitute variables in a string.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let key = &after[..close];
                    match self.vars.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

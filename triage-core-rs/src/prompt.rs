//! Prompt rendering for the reasoning engine.
//!
//! Templates use `{{name}}` placeholders. Values are inserted verbatim; the
//! output is a plain-text prompt, so nothing is HTML-escaped. Unknown
//! placeholders render as empty strings.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::model::ErrorContext;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Template asking the engine for a strict JSON diagnosis
pub const TRIAGE_TEMPLATE: &str = r#"
You are an SAP Integration Suite (CPI) expert.
Analyze the following CPI error context and respond STRICTLY as valid JSON with these keys:
{
  "flow": "<string>",
  "type": "<one of: authentication, authorization, connectivity, business, payload_mapping, duplicate, configuration, unknown>",
  "description": "<clear explanation for L2 support>",
  "root_causes": ["<short bullets>"],
  "suggested_fix": ["<ordered steps>"],
  "retry_hint": { "allowed": <true|false>, "after_seconds": <int>, "max_attempts": <int> },
  "requires_manual": <true|false>,
  "signals": { "http_status": "<string|empty>", "target_system": "<string|empty>", "step": "<string|empty>" }
}

CPI Context:
Flow: {{flow}}
Step: {{stepName}}
Target system: {{targetSystem}}
HTTP status: {{httpStatus}}
Timestamp: {{timestamp}}
Attempts: {{attempts}}
Error message:
{{errorMessage}}
"#;

/// Turns an error context into engine input. Must be pure and total.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, ctx: &ErrorContext) -> String;
}

/// `{{placeholder}}` renderer over a fixed template
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    template: String,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(TRIAGE_TEMPLATE)
    }
}

impl TemplateRenderer {
    pub fn new<S: Into<String>>(template: S) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitutes placeholders from `values`
    pub fn render_with(&self, values: &HashMap<&str, String>) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| {
                values.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }
}

impl PromptRenderer for TemplateRenderer {
    fn render(&self, ctx: &ErrorContext) -> String {
        let values = HashMap::from([
            ("flow", ctx.flow.clone()),
            ("stepName", ctx.step_name.clone()),
            ("targetSystem", ctx.target_system.clone()),
            ("httpStatus", ctx.http_status.clone()),
            ("timestamp", ctx.timestamp.clone()),
            ("errorMessage", ctx.error_message.clone()),
            ("attempts", ctx.attempts.to_string()),
        ]);
        self.render_with(&values)
    }
}

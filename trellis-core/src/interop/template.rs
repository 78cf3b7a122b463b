//! Template evaluation for the pipeline's template mapping form.

use serde_json::Value;

use super::path::{DottedPathResolver, PathResolver};
use crate::error::EvalError;

/// Evaluates a template string against an item.
pub trait ExpressionEvaluator {
    fn evaluate(&self, template: &str, item: &Value) -> Result<String, EvalError>;
}

/// Substitutes `{{ path }}` placeholders with values read from the item.
///
/// Strings are inserted verbatim, `null` and missing paths as the empty
/// string, everything else as JSON. `{{}}` and an unclosed `{{` are errors.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderEvaluator<R = DottedPathResolver> {
    resolver: R,
}

impl PlaceholderEvaluator<DottedPathResolver> {
    pub fn new() -> Self {
        Self {
            resolver: DottedPathResolver,
        }
    }
}

impl<R: PathResolver> PlaceholderEvaluator<R> {
    pub fn with_resolver(resolver: R) -> Self {
        Self { resolver }
    }

    fn render(&self, item: &Value, path: &str) -> String {
        match self.resolver.resolve(item, path) {
            Ok(Value::String(text)) => text,
            Ok(Value::Null) | Err(_) => String::new(),
            Ok(other) => other.to_string(),
        }
    }
}

impl<R: PathResolver> ExpressionEvaluator for PlaceholderEvaluator<R> {
    fn evaluate(&self, template: &str, item: &Value) -> Result<String, EvalError> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| EvalError::Unterminated {
                template: template.to_string(),
            })?;

            let path = after[..end].trim();
            if path.is_empty() {
                return Err(EvalError::EmptyPlaceholder {
                    template: template.to_string(),
                });
            }

            output.push_str(&self.render(item, path));
            rest = &after[end + 2..];
        }

        output.push_str(rest);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_placeholders() {
        let evaluator = PlaceholderEvaluator::new();
        let item = json!({ "name": "Alice", "age": 30 });

        assert_eq!(
            evaluator.evaluate("{{ name }} is {{age}}", &item).unwrap(),
            "Alice is 30"
        );
        assert_eq!(evaluator.evaluate("plain", &item).unwrap(), "plain");
    }

    #[test]
    fn missing_values_render_empty() {
        let evaluator = PlaceholderEvaluator::new();

        assert_eq!(
            evaluator.evaluate("[{{ nickname }}]", &json!({})).unwrap(),
            "[]"
        );
    }

    #[test]
    fn malformed_templates_fail() {
        let evaluator = PlaceholderEvaluator::new();

        assert!(matches!(
            evaluator.evaluate("{{ name", &json!({})),
            Err(EvalError::Unterminated { .. })
        ));
        assert!(matches!(
            evaluator.evaluate("{{ }}", &json!({})),
            Err(EvalError::EmptyPlaceholder { .. })
        ));
    }
}

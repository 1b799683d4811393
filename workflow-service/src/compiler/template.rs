// Placeholder Rendering
// Substitutes `{{ .name }}` references in strings against a variables map

use serde_yaml::Value;

use std::collections::HashMap;
use std::fmt;

/// Error raised while rendering a placeholder
#[derive(Debug, Clone)]
pub struct TemplateError {
    pub message: String,
    pub kind: TemplateErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateErrorKind {
    /// A placeholder references a variable that is not defined
    MissingVariable,
    /// The placeholder is malformed (unterminated, or not a `.name` reference)
    BadSyntax,
    /// The referenced variable is a sequence or mapping, not a scalar
    NotScalar,
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template error: {}", self.message)
    }
}

impl std::error::Error for TemplateError {}

impl TemplateError {
    fn missing_variable(name: &str) -> Self {
        Self {
            message: format!("variable '{}' is not defined", name),
            kind: TemplateErrorKind::MissingVariable,
        }
    }

    fn bad_syntax(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TemplateErrorKind::BadSyntax,
        }
    }

    fn not_scalar(name: &str) -> Self {
        Self {
            message: format!("variable '{}' is not a scalar", name),
            kind: TemplateErrorKind::NotScalar,
        }
    }
}

/// Render every `{{ .name }}` placeholder in `input` from `variables`.
/// Text without placeholders passes through untouched, which makes
/// rendering idempotent once all references are resolved.
pub fn render(input: &str, variables: &HashMap<String, Value>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            TemplateError::bad_syntax(format!("unterminated placeholder in '{}'", input))
        })?;

        let expr = after[..end].trim();
        let name = expr.strip_prefix('.').ok_or_else(|| {
            TemplateError::bad_syntax(format!(
                "expected a '.name' reference, got '{{{{{}}}}}'",
                &after[..end]
            ))
        })?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(TemplateError::bad_syntax(format!(
                "invalid variable reference '.{}'",
                name
            )));
        }

        let value = variables
            .get(name)
            .ok_or_else(|| TemplateError::missing_variable(name))?;
        out.push_str(&scalar_string(value).ok_or_else(|| TemplateError::not_scalar(name))?);

        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Canonical string form of a scalar YAML value; `None` for sequences
/// and mappings.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("null".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_basic() {
        let variables = vars(&[("name", Value::String("world".into()))]);
        assert_eq!(render("hello {{ .name }}", &variables).unwrap(), "hello world");
    }

    #[test]
    fn test_render_whitespace_variants() {
        let variables = vars(&[("v", Value::String("x".into()))]);
        assert_eq!(render("{{.v}}", &variables).unwrap(), "x");
        assert_eq!(render("{{  .v  }}", &variables).unwrap(), "x");
        assert_eq!(render("a{{ .v }}b{{.v}}c", &variables).unwrap(), "axbxc");
    }

    #[test]
    fn test_render_non_string_scalars() {
        let variables = vars(&[
            ("n", Value::Number(8080.into())),
            ("b", Value::Bool(true)),
        ]);
        assert_eq!(
            render("port={{ .n }} on={{ .b }}", &variables).unwrap(),
            "port=8080 on=true"
        );
    }

    #[test]
    fn test_missing_variable() {
        let err = render("{{ .ghost }}", &HashMap::new()).unwrap_err();
        assert_eq!(err.kind, TemplateErrorKind::MissingVariable);
        assert!(err.message.contains("ghost"));
    }

    #[test]
    fn test_bad_syntax() {
        let variables = vars(&[("v", Value::String("x".into()))]);

        let err = render("{{ v }}", &variables).unwrap_err();
        assert_eq!(err.kind, TemplateErrorKind::BadSyntax);

        let err = render("{{ .v", &variables).unwrap_err();
        assert_eq!(err.kind, TemplateErrorKind::BadSyntax);

        let err = render("{{ . }}", &variables).unwrap_err();
        assert_eq!(err.kind, TemplateErrorKind::BadSyntax);
    }

    #[test]
    fn test_sequence_is_not_renderable() {
        let variables = vars(&[("xs", Value::Sequence(vec![Value::Bool(true)]))]);
        let err = render("{{ .xs }}", &variables).unwrap_err();
        assert_eq!(err.kind, TemplateErrorKind::NotScalar);
    }

    #[test]
    fn test_render_is_idempotent_once_resolved() {
        let variables = vars(&[("v", Value::String("plain".into()))]);
        let once = render("a {{ .v }} z", &variables).unwrap();
        let twice = render(&once, &variables).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_text_without_placeholders_is_identity() {
        let variables = HashMap::new();
        assert_eq!(render("plain text", &variables).unwrap(), "plain text");
        assert_eq!(render("", &variables).unwrap(), "");
    }
}

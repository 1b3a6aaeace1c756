use thiserror::Error;

/// Whether an issue blocks a request or is only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// One problem found in a request or config, located by a JSON-pointer-like
/// path (`/children/posts_author_id_fkey/fields/title`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {path}: {message}{}", hint_suffix(.hint))]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Stable machine-readable code such as `unknown_field`.
    pub code: String,
    pub path: String,
    pub message: String,
    pub hint: Option<String>,
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|hint| format!(" (hint: {hint})"))
        .unwrap_or_default()
}

impl ValidationIssue {
    pub fn new(
        severity: IssueSeverity,
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            path: path.into(),
            message: message.into(),
            hint,
        }
    }

    pub fn error(code: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, path, message, None)
    }

    pub fn warning(
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(IssueSeverity::Warning, code, path, message, None)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Everything validation found for one request or config file.
///
/// Only `errors` reject the input; `warnings` are logged by the session and
/// generation goes ahead. Display lists the errors.
#[derive(Debug, Default, Clone, PartialEq, Eq, Error)]
#[error("{}", join_issues(.errors))]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    let rendered: Vec<String> = issues.iter().map(ToString::to_string).collect();
    rendered.join("; ")
}

impl ValidationReport {
    /// True when nothing blocks the input.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push_error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    pub fn push_warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    /// Fold the issues of a nested request into this report.
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|issue| issue.code == code)
    }
}

/// Failures loading or parsing a config file or request document.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Unsupported config format, or a JSON Schema that fails to compile.
    #[error("schema error: {0}")]
    Schema(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_errors_with_hints() {
        let mut report = ValidationReport::default();
        report.push_error(
            ValidationIssue::error("unknown_field", "/fields/nickname", "no such field")
                .with_hint("check the table's columns"),
        );
        report.push_error(ValidationIssue::error("bad_count", "/count", "min exceeds max"));
        report.push_warning(ValidationIssue::warning("shape_on_enum", "/fields/mood", "ignored"));

        assert!(!report.is_ok());
        assert!(report.has_error("bad_count"));
        assert_eq!(
            report.to_string(),
            "[unknown_field] /fields/nickname: no such field (hint: check the table's columns); \
             [bad_count] /count: min exceeds max"
        );
    }
}

//! Expansion of `${LABEL}` templates against change labels.

use std::collections::BTreeMap;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, UndefinedBehavior};

use crate::git::GitError;

/// Expands a `${LABEL}` template using the first value of each label.
///
/// # Errors
///
/// Returns [`GitError::Validation`] naming the template when it is
/// malformed or references a label the change does not carry.
pub fn expand_labels(
    template: &str,
    labels: &BTreeMap<String, Vec<String>>,
) -> Result<String, GitError> {
    let template_error =
        |err: minijinja::Error| GitError::validation(format!("Template '{template}' has an error: {err}"));
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    let syntax = SyntaxConfig::builder()
        .variable_delimiters("${", "}")
        .build()
        .map_err(template_error)?;
    env.set_syntax(syntax);
    let context: BTreeMap<&str, &str> = labels
        .iter()
        .filter_map(|(name, values)| values.first().map(|value| (name.as_str(), value.as_str())))
        .collect();
    env.render_str(template, context).map_err(template_error)
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "tests panic on failure")]

    use std::collections::BTreeMap;

    use rstest::rstest;

    use super::expand_labels;

    fn labels() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([
            ("MY_LABEL".to_owned(), vec!["value".to_owned()]),
            (
                "CONTEXT_REFERENCE".to_owned(),
                vec!["feature-x".to_owned(), "ignored".to_owned()],
            ),
        ])
    }

    #[rstest]
    #[case("plain-branch", "plain-branch")]
    #[case("other_${MY_LABEL}", "other_value")]
    #[case("pr-${CONTEXT_REFERENCE}", "pr-feature-x")]
    fn templates_expand_to_label_values(#[case] template: &str, #[case] expected: &str) {
        assert_eq!(expand_labels(template, &labels()).unwrap(), expected);
    }

    #[rstest]
    fn missing_labels_fail_with_the_template_named() {
        let err = expand_labels("other_${NO_SUCH_LABEL}", &labels()).unwrap_err();
        assert!(
            err.to_string()
                .contains("Template 'other_${NO_SUCH_LABEL}' has an error")
        );
    }
}

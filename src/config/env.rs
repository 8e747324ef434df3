//! Environment variable substitution in the raw configuration text.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Z_][A-Z0-9_]*)\}|([A-Z_][A-Z0-9_]*))").expect("Invalid regex")
});

/// Replace `$VAR_NAME` and `${VAR_NAME}` placeholders with environment values.
///
/// Only upper-case names are recognised. A placeholder whose variable is not
/// set is left untouched so that YAML parsing still sees the original text.
pub fn substitute_env_vars(content: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(content, |caps: &Captures<'_>| {
            let full = &caps[0];
            let Some(name) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
                return full.to_string();
            };

            match std::env::var(name) {
                Ok(value) => {
                    tracing::debug!(
                        variable = %name,
                        length = value.len(),
                        "Substituting environment variable"
                    );
                    value
                }
                Err(_) => {
                    tracing::debug!(
                        variable = %name,
                        placeholder = %full,
                        "Environment variable not set, leaving placeholder"
                    );
                    full.to_string()
                }
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn substitutes_braced_and_bare_placeholders() {
        temp_env::with_vars(
            [
                ("D2P_TEST_TOKEN", Some("tok-123")),
                ("D2P_TEST_APP", Some("app-456")),
            ],
            || {
                let result = substitute_env_vars("a: ${D2P_TEST_TOKEN}\nb: $D2P_TEST_APP\n");
                assert_eq!(result, "a: tok-123\nb: app-456\n");
            },
        );
    }

    #[test]
    #[serial]
    fn unset_variable_keeps_placeholder() {
        temp_env::with_var_unset("D2P_TEST_MISSING", || {
            let input = "token: ${D2P_TEST_MISSING} and $D2P_TEST_MISSING";
            assert_eq!(substitute_env_vars(input), input);
        });
    }

    #[test]
    #[serial]
    fn lowercase_names_are_not_placeholders() {
        temp_env::with_var("lower", Some("nope"), || {
            assert_eq!(substitute_env_vars("cost: $lower"), "cost: $lower");
        });
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "rules:\n  - name: plain\n";
        assert_eq!(substitute_env_vars(input), input);
    }
}

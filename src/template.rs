//! Template rendering for module command arguments and environment values.
//!
//! Templating is opt-in per string. A string without `#` is used as is.
//! Otherwise it is split on `#`, and a segment naming a context (`Config` or
//! `Environment`) renders the segment after it against that context:
//!
//! ```text
//! --state=#Environment#{{ .UUID }}#.tfstate   →   --state=<uuid>.tfstate
//! ```
//!
//! Placeholders are `{{ .Dotted.Field }}`. A placeholder naming a missing
//! field is an error; the failing pair is dropped from the output.

use std::collections::BTreeMap;

/// Flat field lookup for one context.
pub type Values = BTreeMap<String, String>;

const CONFIG: &str = "Config";
const ENVIRONMENT: &str = "Environment";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("map has no entry for key {key:?}")]
    MissingKey { key: String },

    #[error("unclosed action in template {template:?}")]
    Unclosed { template: String },

    #[error("unsupported action {action:?}: expected a field such as {{{{ .Name }}}}")]
    BadAction { action: String },
}

/// The data a template may reference.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub config: Values,
    pub environment: Values,
}

impl TemplateContext {
    fn select(&self, selector: &str) -> Option<&Values> {
        match selector {
            CONFIG => Some(&self.config),
            ENVIRONMENT => Some(&self.environment),
            _ => None,
        }
    }
}

/// Render `s` against `ctx`. Errors are logged and the failing pair elided.
pub fn render(s: &str, ctx: &TemplateContext) -> String {
    if !s.contains('#') {
        return s.to_string();
    }

    let mut segments = s.split('#');
    // Text before the first `#` is never a selector.
    let mut out = segments.next().unwrap_or_default().to_string();

    while let Some(segment) = segments.next() {
        let Some(values) = ctx.select(segment) else {
            out.push_str(segment);
            continue;
        };
        let Some(template) = segments.next() else {
            break;
        };
        match render_template(template, values) {
            Ok(rendered) => out.push_str(&rendered),
            Err(e) => tracing::warn!(input = s, selector = segment, "template error: {e}"),
        }
    }

    out
}

/// Render one template against one context, failing on missing keys.
pub fn render_template(template: &str, values: &Values) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| TemplateError::Unclosed {
            template: template.to_string(),
        })?;
        out.push_str(lookup(after[..end].trim(), values)?);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

fn lookup<'a>(action: &str, values: &'a Values) -> Result<&'a str, TemplateError> {
    let key = action
        .strip_prefix('.')
        .filter(|k| !k.is_empty() && !k.contains(char::is_whitespace))
        .ok_or_else(|| TemplateError::BadAction {
            action: action.to_string(),
        })?;
    values
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| TemplateError::MissingKey {
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TemplateContext {
        TemplateContext {
            config: Values::from([
                ("Kind".to_string(), "Config".to_string()),
                (
                    "AzureConfig.Credentials.Tenant".to_string(),
                    "tenant-1".to_string(),
                ),
            ]),
            environment: Values::from([
                ("Name".to_string(), "t1".to_string()),
                ("UUID".to_string(), "1234".to_string()),
            ]),
        }
    }

    #[test]
    fn strings_without_hash_are_unchanged() {
        let ctx = ctx();
        for s in ["", "plain", "{{ .Name }}", "Config", "--flag=value with spaces"] {
            assert_eq!(render(s, &ctx), s);
        }
    }

    #[test]
    fn renders_environment_pair() {
        assert_eq!(
            render("--state=#Environment#{{ .UUID }}#.tfstate", &ctx()),
            "--state=1234.tfstate"
        );
    }

    #[test]
    fn renders_config_pair() {
        assert_eq!(
            render("#Config#tenant={{.AzureConfig.Credentials.Tenant}}", &ctx()),
            "tenant=tenant-1"
        );
    }

    #[test]
    fn renders_multiple_pairs() {
        assert_eq!(
            render("#Environment#{{ .Name }}#-#Environment#{{ .UUID }}", &ctx()),
            "t1-1234"
        );
    }

    #[test]
    fn unknown_selector_is_literal() {
        assert_eq!(render("a#Other#b", &ctx()), "aOtherb");
    }

    #[test]
    fn trailing_selector_emits_nothing() {
        assert_eq!(render("prefix#Config", &ctx()), "prefix");
    }

    #[test]
    fn missing_key_elides_the_pair() {
        assert_eq!(render("a#Environment#{{ .Nope }}#b", &ctx()), "ab");
    }

    #[test]
    fn render_template_errors() {
        let values = ctx().environment;

        assert_eq!(
            render_template("{{ .Nope }}", &values),
            Err(TemplateError::MissingKey { key: "Nope".into() })
        );
        assert!(matches!(
            render_template("{{ .Name", &values),
            Err(TemplateError::Unclosed { .. })
        ));
        assert!(matches!(
            render_template("{{ Name }}", &values),
            Err(TemplateError::BadAction { .. })
        ));
    }

    #[test]
    fn render_template_keeps_surrounding_text() {
        let values = ctx().environment;
        assert_eq!(
            render_template("env-{{.Name}}/{{ .UUID }}/", &values).unwrap(),
            "env-t1/1234/"
        );
    }
}

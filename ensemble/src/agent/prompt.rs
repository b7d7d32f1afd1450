//! Prompt template rendering.
//!
//! Templates use `{variable}` placeholders; `{{` and `}}` escape literal
//! braces. Missing variables render as the empty string by default, or fail
//! in strict mode (per-agent `strict_prompt`).

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PromptError {
    #[error("missing template variable '{0}'")]
    MissingVariable(String),
    #[error("unclosed placeholder at byte {0}")]
    Unclosed(usize),
}

/// Renders `template` substituting `vars`.
pub fn render(
    template: &str,
    vars: &BTreeMap<String, String>,
    strict: bool,
) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                out.push('{');
                i += 2;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                out.push('}');
                i += 2;
            }
            b'{' => {
                let end = template[i + 1..]
                    .find('}')
                    .map(|off| i + 1 + off)
                    .ok_or(PromptError::Unclosed(i))?;
                let name = &template[i + 1..end];
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    // Not a placeholder (JSON braces, prose); keep verbatim.
                    out.push_str(&template[i..=end]);
                } else {
                    match vars.get(name) {
                        Some(value) => out.push_str(value),
                        None if strict => {
                            return Err(PromptError::MissingVariable(name.to_string()))
                        }
                        None => {}
                    }
                }
                i = end + 1;
            }
            _ => match template[i..].chars().next() {
                Some(ch) => {
                    out.push(ch);
                    i += ch.len_utf8();
                }
                None => break,
            },
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// **Scenario**: placeholders substitute, escapes produce literal braces.
    #[test]
    fn substitution_and_escapes() {
        let rendered = render(
            "You are {agent_name}. Literal {{braces}} stay. Task: {task}",
            &vars(&[("agent_name", "research"), ("task", "write a guide")]),
            false,
        )
        .unwrap();
        assert_eq!(
            rendered,
            "You are research. Literal {braces} stay. Task: write a guide"
        );
    }

    /// **Scenario**: missing variables render empty by default and fail in
    /// strict mode.
    #[test]
    fn missing_variables() {
        let rendered = render("Hello {who}!", &vars(&[]), false).unwrap();
        assert_eq!(rendered, "Hello !");
        let err = render("Hello {who}!", &vars(&[]), true).unwrap_err();
        assert_eq!(err, PromptError::MissingVariable("who".into()));
    }

    /// **Scenario**: non-identifier braces (JSON examples in prompts) pass
    /// through verbatim.
    #[test]
    fn non_identifier_braces_pass_through() {
        let template = r#"Reply as {"key": "value"} with {agent_name}"#;
        let rendered = render(template, &vars(&[("agent_name", "a")]), false).unwrap();
        assert_eq!(rendered, r#"Reply as {"key": "value"} with a"#);
    }

    /// **Scenario**: an unclosed brace is reported with its position.
    #[test]
    fn unclosed_brace_is_error() {
        let err = render("broken {tail", &vars(&[]), false).unwrap_err();
        assert!(matches!(err, PromptError::Unclosed(7)));
    }
}

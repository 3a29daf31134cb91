// SPDX-License-Identifier: GPL-2.0-or-later

//! Variable substitution in pipeline template strings.
//!
//! Placeholder grammar is `{IDENT}` or `{IDENT.INT}`; the full placeholder
//! text (without braces) is used verbatim as the lookup key, so the engine
//! itself never parses the dot out of `IDENT.INT` — callers that need the
//! distinction encode it into the variable map's keys. A literal `{` is
//! written as `{{`; `}` is always literal outside of a placeholder.

use std::collections::HashMap;
use thiserror::Error;

pub type Variables = HashMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("missing variable: '{0}'")]
    MissingVariable(String),

    #[error("unterminated placeholder starting at byte {0}")]
    UnterminatedPlaceholder(usize),
}

/// Expands `template`, replacing every `{NAME}` placeholder with
/// `variables[NAME]`. Scans once, left to right.
pub fn expand(template: &str, variables: &Variables) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }

        if let Some((_, '{')) = chars.peek() {
            chars.next();
            out.push('{');
            continue;
        }

        let mut name = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }
        if !closed {
            return Err(TemplateError::UnterminatedPlaceholder(idx));
        }

        match variables.get(&name) {
            Some(value) => out.push_str(value),
            None => return Err(TemplateError::MissingVariable(name)),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn no_placeholders_passes_through() {
        assert_eq!(
            Ok("v4l2src ! videoconvert".to_owned()),
            expand("v4l2src ! videoconvert", &Variables::new())
        );
    }

    #[test]
    fn single_placeholder() {
        let v = vars(&[("DEVICE", "/dev/video0")]);
        assert_eq!(
            Ok("v4l2src device=/dev/video0".to_owned()),
            expand("v4l2src device={DEVICE}", &v)
        );
    }

    #[test]
    fn indexed_placeholder_key_is_verbatim() {
        let v = vars(&[("VIDEOCHANNEL.0", "cam0")]);
        assert_eq!(
            Ok("name=cam0".to_owned()),
            expand("name={VIDEOCHANNEL.0}", &v)
        );
    }

    #[test]
    fn escaped_brace_is_literal() {
        assert_eq!(Ok("{literal}".to_owned()), expand("{{literal}", &Variables::new()));
    }

    #[test]
    fn missing_variable_errors() {
        assert_eq!(
            Err(TemplateError::MissingVariable("DEVICE".to_owned())),
            expand("{DEVICE}", &Variables::new())
        );
    }

    #[test]
    fn unterminated_placeholder_errors() {
        assert_eq!(
            Err(TemplateError::UnterminatedPlaceholder(5)),
            expand("abcde{DEVICE", &Variables::new())
        );
    }

    #[test_case("", &[]; "empty template")]
    #[test_case("plain text", &[]; "plain text")]
    fn idempotent_on_already_expanded_output(template: &str, pairs: &[(&str, &str)]) {
        let v = vars(pairs);
        let once = expand(template, &v).unwrap();
        let twice = expand(&once, &v).unwrap();
        assert_eq!(once, twice);
    }
}

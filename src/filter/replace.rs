use std::borrow::Cow;
use std::collections::HashSet;

use tracing::debug;

use crate::context::Context;

/// Jinja delimiters occurring literally in an instance, with the expressions
/// that render them back verbatim.
const JINJA_ESCAPES: [(&str, &str); 4] = [
    ("{{", r#"{{"{{"}}"#),
    ("}}", r#"{{"}}"}}"#),
    ("{%", r#"{{"{%"}}"#),
    ("%}", r#"{{"%}"}}"#),
];

/// Answers too ambiguous to be replaced unless asked for explicitly.
const BOOLEAN_ANSWERS: [&str; 6] = ["y", "n", "yes", "no", "true", "false"];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Replacement {
    from: Vec<u8>,
    to: Vec<u8>,
}

/// Variables whose values are turned back into template expressions.
#[derive(Debug, Clone, Default)]
pub struct VariableSelection {
    /// Replaced even when their value looks ambiguous.
    pub whitelist: HashSet<String>,
    /// Never replaced.
    pub blacklist: HashSet<String>,
}

impl VariableSelection {
    fn includes(&self, key: &str, value: &str) -> bool {
        if key.starts_with('_') || self.blacklist.contains(key) || value.is_empty() {
            return false;
        }
        if self.whitelist.contains(key) {
            return true;
        }
        value.chars().count() > 1
            && !BOOLEAN_ANSWERS
                .iter()
                .any(|answer| value.eq_ignore_ascii_case(answer))
    }
}

/// Byte substitutions applied to file contents and path components.
///
/// Substitution is a single left-to-right pass in which the longest match
/// wins at each position, so replaced text is never scanned again.
#[derive(Debug, Clone)]
pub struct Replacements {
    content: Vec<Replacement>,
    names: Vec<Replacement>,
}

impl Replacements {
    pub fn new(context: &Context, selection: &VariableSelection) -> Self {
        let mut names = Vec::new();
        for (key, value) in context.variables() {
            if !selection.includes(key, value) {
                debug!("Not replacing variable {key}={value:?}");
                continue;
            }
            if names.iter().any(|r: &Replacement| r.from == value.as_bytes()) {
                debug!("Value of {key} is already replaced by an earlier variable");
                continue;
            }
            names.push(Replacement {
                from: value.as_bytes().to_vec(),
                to: format!("{{{{cookiecutter.{key}}}}}").into_bytes(),
            });
        }

        let mut content: Vec<Replacement> = JINJA_ESCAPES
            .iter()
            .map(|(from, to)| Replacement {
                from: from.as_bytes().to_vec(),
                to: to.as_bytes().to_vec(),
            })
            .collect();
        content.extend(names.iter().cloned());

        // Stable sorts keep file order among values of equal length.
        names.sort_by(|a, b| b.from.len().cmp(&a.from.len()));
        content.sort_by(|a, b| b.from.len().cmp(&a.from.len()));
        Self { content, names }
    }

    /// Number of template variables being replaced.
    pub fn variable_count(&self) -> usize {
        self.names.len()
    }

    /// Rewrite file contents: escape Jinja syntax and replace variable values.
    pub fn rewrite<'a>(&self, data: &'a [u8]) -> Cow<'a, [u8]> {
        substitute(data, &self.content)
    }

    /// Rewrite a single path component: replace variable values only.
    pub fn rewrite_name<'a>(&self, name: &'a [u8]) -> Cow<'a, [u8]> {
        substitute(name, &self.names)
    }
}

fn substitute<'a>(data: &'a [u8], replacements: &[Replacement]) -> Cow<'a, [u8]> {
    if replacements.is_empty() {
        return Cow::Borrowed(data);
    }
    let mut out: Option<Vec<u8>> = None;
    let mut copied = 0;
    let mut i = 0;
    while i < data.len() {
        let rest = &data[i..];
        match replacements.iter().find(|r| rest.starts_with(&r.from)) {
            Some(r) => {
                let buf = out.get_or_insert_with(|| Vec::with_capacity(data.len()));
                buf.extend_from_slice(&data[copied..i]);
                buf.extend_from_slice(&r.to);
                i += r.from.len();
                copied = i;
            }
            None => i += 1,
        }
    }
    match out {
        Some(mut buf) => {
            buf.extend_from_slice(&data[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(data),
    }
}

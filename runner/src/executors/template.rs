//! Minimal `{placeholder}` templates for job scripts
//!
//! `{{` and `}}` produce literal braces, a lone `}` is kept as is.

use itertools::Itertools;
use std::{borrow::Cow, collections::BTreeMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    /// inserted verbatim, never quoted
    Raw(String),
    Text(String),
    /// space separated, every element quoted on its own
    List(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    All,
    None,
}

pub type TemplateContext = BTreeMap<String, TemplateValue>;

/// name of the placeholder that could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPlaceholder(pub String);

pub fn render(
    template: &str,
    context: &TemplateContext,
    quoting: Quoting,
) -> Result<String, MissingPlaceholder> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;

                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }

                let name = name.trim();
                if !closed {
                    return Err(MissingPlaceholder(name.to_owned()));
                }

                match context.get(name) {
                    Some(value) => output.push_str(&format_value(value, quoting)),
                    None => return Err(MissingPlaceholder(name.to_owned())),
                }
            }
            c => output.push(c),
        }
    }

    Ok(output)
}

fn format_value(value: &TemplateValue, quoting: Quoting) -> Cow<'_, str> {
    match (value, quoting) {
        (TemplateValue::Raw(raw), _) | (TemplateValue::Text(raw), Quoting::None) => {
            Cow::from(raw.as_str())
        }
        (TemplateValue::Text(text), Quoting::All) => quote(text),
        (TemplateValue::List(items), Quoting::None) => Cow::from(items.iter().join(" ")),
        (TemplateValue::List(items), Quoting::All) => {
            Cow::from(items.iter().map(|item| quote(item)).join(" "))
        }
    }
}

/// quote a value so a POSIX shell reads it back as exactly one word
pub fn quote(value: &str) -> Cow<'_, str> {
    let safe = |c: char| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c);

    if !value.is_empty() && value.chars().all(safe) {
        Cow::from(value)
    } else {
        Cow::from(format!("'{}'", value.replace('\'', r"'\''")))
    }
}

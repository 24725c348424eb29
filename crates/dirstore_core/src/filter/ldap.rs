//! RFC 4515 string filters.

use std::fmt::Write as _;

use dirstore_model::{time, Filter, Value};

use super::{check_attribute, FilterTranslator, Translated};
use crate::error::{PersistError, PersistResult};
use crate::hints::{AttributeHints, AttributeSyntax};

/// Translates filters to RFC 4515 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapFilterTranslator;

/// Escape an assertion value: `\ * ( )` and NUL become `\XX`.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\5c"),
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        let _ = write!(out, "\\{b:02x}");
    }
    out
}

impl LdapFilterTranslator {
    fn render(
        &self,
        filter: &Filter,
        hints: &dyn AttributeHints,
        out: &mut String,
        consistency: &mut bool,
    ) -> PersistResult<()> {
        match filter {
            Filter::And(children) | Filter::Or(children) => {
                if children.is_empty() {
                    return Err(PersistError::filter("empty AND/OR filter"));
                }
                out.push('(');
                out.push(if matches!(filter, Filter::And(_)) { '&' } else { '|' });
                for child in children {
                    self.render(child, hints, out, consistency)?;
                }
                out.push(')');
            }
            Filter::Not(child) => {
                out.push_str("(!");
                self.render(child, hints, out, consistency)?;
                out.push(')');
            }
            Filter::Equality { attribute, value } => {
                self.leaf(attribute, "=", value, false, hints, out, consistency)?;
            }
            Filter::GreaterOrEqual { attribute, value } => {
                self.leaf(attribute, ">=", value, true, hints, out, consistency)?;
            }
            Filter::LessOrEqual { attribute, value } => {
                self.leaf(attribute, "<=", value, true, hints, out, consistency)?;
            }
            Filter::Presence { attribute } => {
                check_attribute(attribute)?;
                *consistency |= hints.hint(attribute).consistency;
                let _ = write!(out, "({attribute}=*)");
            }
            Filter::Substring {
                attribute,
                initial,
                any,
                last,
            } => {
                check_attribute(attribute)?;
                *consistency |= hints.hint(attribute).consistency;
                let inner: Vec<&String> = any.iter().filter(|s| !s.is_empty()).collect();
                let initial = initial.as_deref().filter(|s| !s.is_empty());
                let last = last.as_deref().filter(|s| !s.is_empty());
                if initial.is_none() && inner.is_empty() && last.is_none() {
                    return Err(PersistError::filter(format!(
                        "substring filter on {attribute} has no components"
                    )));
                }
                let _ = write!(out, "({attribute}=");
                if let Some(initial) = initial {
                    out.push_str(&escape_filter_value(initial));
                }
                out.push('*');
                for part in inner {
                    out.push_str(&escape_filter_value(part));
                    out.push('*');
                }
                if let Some(last) = last {
                    out.push_str(&escape_filter_value(last));
                }
                out.push(')');
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn leaf(
        &self,
        attribute: &str,
        op: &str,
        value: &Value,
        ordering: bool,
        hints: &dyn AttributeHints,
        out: &mut String,
        consistency: &mut bool,
    ) -> PersistResult<()> {
        check_attribute(attribute)?;
        let hint = hints.hint(attribute);
        *consistency |= hint.consistency;

        let rendered = match (hint.syntax, value) {
            (_, Value::Bytes(bytes)) => escape_bytes(bytes),
            (_, Value::Integer(n)) => n.to_string(),
            (_, Value::Bool(b)) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            (_, Value::Timestamp(t)) => time::format_generalized_time(t),
            (AttributeSyntax::Integer, Value::Text(text)) => match value.as_integer() {
                Some(n) => n.to_string(),
                None if ordering => {
                    return Err(PersistError::filter(format!(
                        "{attribute} is an integer attribute, got {text:?}"
                    )))
                }
                None => escape_filter_value(text),
            },
            (AttributeSyntax::Boolean, Value::Text(text)) => match value.as_bool() {
                Some(true) => "TRUE".to_string(),
                Some(false) => "FALSE".to_string(),
                None => escape_filter_value(text),
            },
            (AttributeSyntax::Timestamp, Value::Text(text)) => match value.as_timestamp() {
                Some(t) => time::format_generalized_time(&t),
                None => escape_filter_value(text),
            },
            (_, Value::Text(text)) => escape_filter_value(text),
        };
        let _ = write!(out, "({attribute}{op}{rendered})");
        Ok(())
    }
}

impl FilterTranslator for LdapFilterTranslator {
    type Output = String;

    fn translate(
        &self,
        filter: &Filter,
        hints: &dyn AttributeHints,
    ) -> PersistResult<Translated<String>> {
        let mut expression = String::new();
        let mut consistency_required = false;
        self.render(filter, hints, &mut expression, &mut consistency_required)?;
        Ok(Translated {
            expression,
            consistency_required,
        })
    }
}

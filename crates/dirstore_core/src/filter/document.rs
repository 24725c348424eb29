//! Document store query expressions.

use std::cmp::Ordering;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dirstore_model::{time, Filter, Value};
use serde_json::{Map, Value as Json};

use super::{check_attribute, FilterTranslator, Translated};
use crate::error::{PersistError, PersistResult};
use crate::hints::{AttributeHints, AttributeSyntax};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `>=`
    Ge,
    /// `<=`
    Le,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }
}

/// A document query predicate.
///
/// Multi-valued fields are arrays; their predicates match when any element
/// does.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentExpression {
    /// All must hold.
    And(Vec<DocumentExpression>),
    /// One must hold.
    Or(Vec<DocumentExpression>),
    /// Must not hold.
    Not(Box<DocumentExpression>),
    /// Compare a field with a JSON literal.
    Compare {
        /// Field name.
        field: String,
        /// Operator.
        op: CompareOp,
        /// Typed operand.
        literal: Json,
        /// The field is an array.
        multi_valued: bool,
    },
    /// `LIKE` pattern match. `%` and `_` in literal parts are escaped with `\`.
    Like {
        /// Field name.
        field: String,
        /// Pattern.
        pattern: String,
        /// The field is an array.
        multi_valued: bool,
    },
    /// The field is present.
    Exists {
        /// Field name.
        field: String,
    },
}

impl DocumentExpression {
    /// Query language text, N1QL style.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Evaluate against a document body, for stores that filter in process.
    ///
    /// Array fields match when any element does. Values of different JSON
    /// types never compare.
    pub fn matches(&self, body: &Map<String, Json>) -> bool {
        match self {
            DocumentExpression::And(children) => children.iter().all(|c| c.matches(body)),
            DocumentExpression::Or(children) => children.iter().any(|c| c.matches(body)),
            DocumentExpression::Not(child) => !child.matches(body),
            DocumentExpression::Compare {
                field, op, literal, ..
            } => field_values(body, field)
                .any(|v| compare_json(v, literal).is_some_and(|o| op.accepts(o))),
            DocumentExpression::Like { field, pattern, .. } => field_values(body, field)
                .filter_map(Json::as_str)
                .any(|text| like_matches(pattern, text)),
            DocumentExpression::Exists { field } => body.get(field).is_some_and(|v| !v.is_null()),
        }
    }
}

fn field_values<'a>(body: &'a Map<String, Json>, field: &str) -> Box<dyn Iterator<Item = &'a Json> + 'a> {
    match body.get(field) {
        Some(Json::Array(items)) => Box::new(items.iter()),
        Some(Json::Null) | None => Box::new(std::iter::empty()),
        Some(value) => Box::new(std::iter::once(value)),
    }
}

fn compare_json(value: &Json, literal: &Json) -> Option<Ordering> {
    match (value, literal) {
        (Json::String(a), Json::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Json::Bool(a), Json::Bool(b)) => Some(a.cmp(b)),
        (Json::Number(a), Json::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        _ => None,
    }
}

/// `LIKE` matching: `%` is any run, `_` one character, `\` escapes.
fn like_matches(pattern: &str, text: &str) -> bool {
    enum Token {
        Any,
        One,
        Char(char),
    }
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        tokens.push(match ch {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => Token::Char(chars.next().unwrap_or('\\')),
            other => Token::Char(other),
        });
    }

    let text: Vec<char> = text.chars().collect();
    // matched[j]: the tokens seen so far match text[..j]
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            Token::Any => {
                let mut reachable = false;
                for j in 0..=text.len() {
                    reachable |= matched[j];
                    next[j] = reachable;
                }
            }
            Token::One => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1];
                }
            }
            Token::Char(c) => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1] && text[j - 1] == *c;
                }
            }
        }
        matched = next;
    }
    matched[text.len()]
}

impl fmt::Display for DocumentExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentExpression::And(children) | DocumentExpression::Or(children) => {
                let joiner = if matches!(self, DocumentExpression::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                f.write_str("(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(joiner)?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            DocumentExpression::Not(child) => write!(f, "NOT ({child})"),
            DocumentExpression::Compare {
                field,
                op,
                literal,
                multi_valued: false,
            } => write!(f, "`{field}` {} {literal}", op.symbol()),
            DocumentExpression::Compare {
                field,
                op,
                literal,
                multi_valued: true,
            } => write!(
                f,
                "ANY v IN `{field}` SATISFIES v {} {literal} END",
                op.symbol()
            ),
            DocumentExpression::Like {
                field,
                pattern,
                multi_valued,
            } => {
                let quoted = Json::String(pattern.clone());
                if *multi_valued {
                    write!(f, "ANY v IN `{field}` SATISFIES v LIKE {quoted} END")
                } else {
                    write!(f, "`{field}` LIKE {quoted}")
                }
            }
            DocumentExpression::Exists { field } => write!(f, "`{field}` IS NOT MISSING"),
        }
    }
}

/// Translates filters to [`DocumentExpression`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentFilterTranslator;

/// Escape `%`, `_` and `\` for a `LIKE` pattern.
pub(crate) fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

impl DocumentFilterTranslator {
    fn lower(
        &self,
        filter: &Filter,
        hints: &dyn AttributeHints,
        consistency: &mut bool,
    ) -> PersistResult<DocumentExpression> {
        match filter {
            Filter::And(children) | Filter::Or(children) => {
                if children.is_empty() {
                    return Err(PersistError::filter("empty AND/OR filter"));
                }
                let lowered = children
                    .iter()
                    .map(|c| self.lower(c, hints, consistency))
                    .collect::<PersistResult<Vec<_>>>()?;
                Ok(if matches!(filter, Filter::And(_)) {
                    DocumentExpression::And(lowered)
                } else {
                    DocumentExpression::Or(lowered)
                })
            }
            Filter::Not(child) => Ok(DocumentExpression::Not(Box::new(
                self.lower(child, hints, consistency)?,
            ))),
            Filter::Equality { attribute, value } => {
                self.compare(attribute, CompareOp::Eq, value, hints, consistency)
            }
            Filter::GreaterOrEqual { attribute, value } => {
                self.compare(attribute, CompareOp::Ge, value, hints, consistency)
            }
            Filter::LessOrEqual { attribute, value } => {
                self.compare(attribute, CompareOp::Le, value, hints, consistency)
            }
            Filter::Presence { attribute } => {
                check_attribute(attribute)?;
                *consistency |= hints.hint(attribute).consistency;
                Ok(DocumentExpression::Exists {
                    field: attribute.clone(),
                })
            }
            Filter::Substring {
                attribute,
                initial,
                any,
                last,
            } => {
                check_attribute(attribute)?;
                let hint = hints.hint(attribute);
                *consistency |= hint.consistency;

                let inner: Vec<&String> = any.iter().filter(|s| !s.is_empty()).collect();
                let initial = initial.as_deref().filter(|s| !s.is_empty());
                let last = last.as_deref().filter(|s| !s.is_empty());
                if initial.is_none() && inner.is_empty() && last.is_none() {
                    return Err(PersistError::filter(format!(
                        "substring filter on {attribute} has no components"
                    )));
                }

                let mut pattern = String::new();
                if let Some(initial) = initial {
                    pattern.push_str(&escape_like(initial));
                }
                pattern.push('%');
                for part in inner {
                    pattern.push_str(&escape_like(part));
                    pattern.push('%');
                }
                if let Some(last) = last {
                    pattern.push_str(&escape_like(last));
                }
                Ok(DocumentExpression::Like {
                    field: attribute.clone(),
                    pattern,
                    multi_valued: hint.multi_valued,
                })
            }
        }
    }

    fn compare(
        &self,
        attribute: &str,
        op: CompareOp,
        value: &Value,
        hints: &dyn AttributeHints,
        consistency: &mut bool,
    ) -> PersistResult<DocumentExpression> {
        check_attribute(attribute)?;
        let hint = hints.hint(attribute);
        *consistency |= hint.consistency;

        let literal = match (hint.syntax, value) {
            (_, Value::Integer(n)) => Json::from(*n),
            (_, Value::Bool(b)) => Json::Bool(*b),
            (_, Value::Timestamp(t)) => Json::String(time::format_document_time(t)),
            (_, Value::Bytes(bytes)) => Json::String(STANDARD.encode(bytes)),
            (AttributeSyntax::Integer, Value::Text(text)) => match value.as_integer() {
                Some(n) => Json::from(n),
                None if op != CompareOp::Eq => {
                    return Err(PersistError::filter(format!(
                        "{attribute} is an integer attribute, got {text:?}"
                    )))
                }
                None => Json::String(text.clone()),
            },
            (AttributeSyntax::Boolean, Value::Text(text)) => value
                .as_bool()
                .map_or_else(|| Json::String(text.clone()), Json::Bool),
            (AttributeSyntax::Timestamp, Value::Text(text)) => Json::String(
                value
                    .as_timestamp()
                    .map_or_else(|| text.clone(), |t| time::format_document_time(&t)),
            ),
            (_, Value::Text(text)) => Json::String(text.clone()),
        };

        Ok(DocumentExpression::Compare {
            field: attribute.to_string(),
            op,
            literal,
            multi_valued: hint.multi_valued,
        })
    }
}

impl FilterTranslator for DocumentFilterTranslator {
    type Output = DocumentExpression;

    fn translate(
        &self,
        filter: &Filter,
        hints: &dyn AttributeHints,
    ) -> PersistResult<Translated<DocumentExpression>> {
        let mut consistency_required = false;
        let expression = self.lower(filter, hints, &mut consistency_required)?;
        Ok(Translated {
            expression,
            consistency_required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::{AttributeHint, SchemaHints};

    fn hints() -> SchemaHints {
        SchemaHints::empty()
            .with(
                "age",
                AttributeHint {
                    syntax: AttributeSyntax::Integer,
                    ..AttributeHint::default()
                },
            )
            .with(
                "mail",
                AttributeHint {
                    multi_valued: true,
                    ..AttributeHint::default()
                },
            )
            .with(
                "jansId",
                AttributeHint {
                    consistency: true,
                    ..AttributeHint::default()
                },
            )
    }

    fn render(filter: &Filter) -> String {
        DocumentFilterTranslator
            .translate(filter, &hints())
            .unwrap()
            .expression
            .render()
    }

    #[test]
    fn renders_every_variant() {
        let filter = Filter::and(vec![
            Filter::equality("uid", "alice"),
            Filter::or(vec![
                Filter::presence("displayName"),
                Filter::not(Filter::greater_or_equal("age", "30")),
            ]),
            Filter::less_or_equal("age", 60),
        ]);
        assert_eq!(
            render(&filter),
            "(`uid` = \"alice\" AND (`displayName` IS NOT MISSING OR NOT (`age` >= 30)) AND `age` <= 60)"
        );
    }

    #[test]
    fn multi_valued_fields_use_any() {
        assert_eq!(
            render(&Filter::equality("mail", "a@b")),
            "ANY v IN `mail` SATISFIES v = \"a@b\" END"
        );
        assert_eq!(
            render(&Filter::substring("mail", None, &[], Some("@example.org"))),
            "ANY v IN `mail` SATISFIES v LIKE \"%@example.org\" END"
        );
    }

    #[test]
    fn like_patterns_escape_wildcards() {
        assert_eq!(
            render(&Filter::substring("cn", Some("50%"), &["a_b"], None)),
            "`cn` LIKE \"50\\\\%%a\\\\_b%\""
        );
        assert_eq!(escape_like("50%_\\"), "50\\%\\_\\\\");
    }

    #[test]
    fn literals_are_json() {
        assert_eq!(render(&Filter::equality("cn", "say \"hi\"")), "`cn` = \"say \\\"hi\\\"\"");
        assert_eq!(render(&Filter::equality("active", true)), "`active` = true");
    }

    #[test]
    fn errors_and_consistency() {
        let translator = DocumentFilterTranslator;
        assert!(translator.translate(&Filter::or(vec![]), &hints()).is_err());
        assert!(translator
            .translate(&Filter::greater_or_equal("age", "old"), &hints())
            .is_err());
        assert!(translator.translate(&Filter::presence("a`b"), &hints()).is_err());
        let t = translator
            .translate(&Filter::equality("jansId", "1"), &hints())
            .unwrap();
        assert!(t.consistency_required);
    }

    #[test]
    fn evaluates_against_bodies() {
        let body: Map<String, Json> = serde_json::from_str(
            r#"{"uid": "alice", "age": 42, "mail": ["a@example.org", "alice@corp.test"], "note": null}"#,
        )
        .unwrap();
        let matches = |filter: Filter| {
            DocumentFilterTranslator
                .translate(&filter, &hints())
                .unwrap()
                .expression
                .matches(&body)
        };

        assert!(matches(Filter::equality("uid", "alice")));
        assert!(!matches(Filter::equality("uid", "Alice")));
        assert!(matches(Filter::greater_or_equal("age", 40)));
        assert!(!matches(Filter::less_or_equal("age", 41)));
        assert!(matches(Filter::equality("mail", "alice@corp.test")));
        assert!(matches(Filter::substring("mail", None, &[], Some("@corp.test"))));
        assert!(matches(Filter::substring("uid", Some("al"), &["ic"], None)));
        assert!(!matches(Filter::presence("note")));
        assert!(matches(Filter::not(Filter::presence("missing"))));
        // "42" as text never equals the number 42
        assert!(!matches(Filter::equality("uid", 42)));
    }

    #[test]
    fn like_semantics() {
        assert!(like_matches("a%c", "abbbc"));
        assert!(like_matches("a_c", "abc"));
        assert!(!like_matches("a_c", "abbc"));
        assert!(like_matches("50\\%%", "50% off"));
        assert!(!like_matches("50\\%%", "500 off"));
        assert!(like_matches("%", ""));
    }
}

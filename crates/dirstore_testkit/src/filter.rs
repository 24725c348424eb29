//! RFC 4515 filter parsing and evaluation for the simulated directory.
//!
//! The parser accepts what the directory translator emits: `&`, `|`, `!`,
//! equality, presence, substrings, `>=` and `<=`, with `\xx` escapes.
//! Evaluation follows the usual matching rules of a directory server closely
//! enough for tests: integers compare numerically, everything else compares
//! as case-insensitive text.

use std::cmp::Ordering;

use dirstore_core::strip_binary_option;
use dirstore_model::{Entry, Filter, Value};

/// Parse a filter string.
///
/// # Errors
///
/// Returns a description of the first syntax error.
pub fn parse_filter(text: &str) -> Result<Filter, String> {
    let mut parser = Parser {
        input: text.trim().as_bytes(),
        pos: 0,
    };
    let filter = parser.filter()?;
    if parser.pos != parser.input.len() {
        return Err(format!("trailing input at offset {} in {text:?}", parser.pos));
    }
    Ok(filter)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), String> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected '{}' at offset {}", byte as char, self.pos))
        }
    }

    fn filter(&mut self) -> Result<Filter, String> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::not(self.filter()?)
            }
            Some(_) => self.item()?,
            None => return Err("unexpected end of filter".to_string()),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<Filter>, String> {
        let mut children = Vec::new();
        while self.peek() == Some(b'(') {
            children.push(self.filter()?);
        }
        if children.is_empty() {
            return Err(format!("empty filter list at offset {}", self.pos));
        }
        Ok(children)
    }

    fn item(&mut self) -> Result<Filter, String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'=' | b'>' | b'<' | b'~') {
                break;
            }
            self.pos += 1;
        }
        let attribute = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| "attribute is not UTF-8".to_string())?
            .trim()
            .to_string();
        if attribute.is_empty() {
            return Err(format!("missing attribute at offset {start}"));
        }

        let op = match self.peek() {
            Some(b'=') => "=",
            Some(b'>') => ">=",
            Some(b'<') => "<=",
            Some(b'~') => "~=",
            _ => return Err(format!("missing operator after {attribute}")),
        };
        self.pos += op.len();
        if op.len() == 2 && self.input.get(self.pos - 1) != Some(&b'=') {
            return Err(format!("malformed operator after {attribute}"));
        }

        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b')' {
                break;
            }
            self.pos += 1;
        }
        let raw = &self.input[start..self.pos];

        match op {
            ">=" => Ok(Filter::GreaterOrEqual {
                attribute,
                value: unescape(raw)?,
            }),
            "<=" => Ok(Filter::LessOrEqual {
                attribute,
                value: unescape(raw)?,
            }),
            _ if raw == b"*" => Ok(Filter::Presence { attribute }),
            _ if raw.contains(&b'*') => {
                let parts: Vec<&[u8]> = raw.split(|b| *b == b'*').collect();
                let text = |part: &[u8]| -> Result<Option<String>, String> {
                    if part.is_empty() {
                        return Ok(None);
                    }
                    Ok(Some(unescape(part)?.to_text().into_owned()))
                };
                let initial = text(parts[0])?;
                let last = text(parts[parts.len() - 1])?;
                let mut any = Vec::new();
                for part in &parts[1..parts.len() - 1] {
                    if let Some(s) = text(part)? {
                        any.push(s);
                    }
                }
                Ok(Filter::Substring {
                    attribute,
                    initial,
                    any,
                    last,
                })
            }
            _ => Ok(Filter::Equality {
                attribute,
                value: unescape(raw)?,
            }),
        }
    }
}

fn unescape(raw: &[u8]) -> Result<Value, String> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' {
            let hex = raw
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| "malformed escape".to_string())?;
            out.push(hex);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    Ok(match String::from_utf8(out) {
        Ok(text) => Value::Text(text),
        Err(err) => Value::Bytes(err.into_bytes()),
    })
}

fn values_of<'e>(entry: &'e Entry, attribute: &str) -> impl Iterator<Item = &'e Value> + 'e {
    let wanted = strip_binary_option(attribute).to_ascii_lowercase();
    entry
        .attributes
        .iter()
        .filter(move |a| strip_binary_option(&a.name).eq_ignore_ascii_case(&wanted))
        .flat_map(|a| a.values.iter())
}

fn compare(stored: &Value, asserted: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (stored.as_integer(), asserted.as_integer()) {
        return Some(a.cmp(&b));
    }
    if stored.is_binary() || asserted.is_binary() {
        return Some(stored.as_bytes().as_ref().cmp(asserted.as_bytes().as_ref()));
    }
    Some(
        stored
            .to_text()
            .to_lowercase()
            .cmp(&asserted.to_text().to_lowercase()),
    )
}

fn substring_matches(text: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let text = text.to_lowercase();
    let mut rest = text.as_str();
    if let Some(initial) = initial {
        match rest.strip_prefix(initial.to_lowercase().as_str()) {
            Some(tail) => rest = tail,
            None => return false,
        }
    }
    for part in any {
        let part = part.to_lowercase();
        match rest.find(&part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(&last.to_lowercase()),
        None => true,
    }
}

/// Returns true if `entry` satisfies `filter`.
pub fn entry_matches(filter: &Filter, entry: &Entry) -> bool {
    match filter {
        Filter::And(children) => children.iter().all(|c| entry_matches(c, entry)),
        Filter::Or(children) => children.iter().any(|c| entry_matches(c, entry)),
        Filter::Not(child) => !entry_matches(child, entry),
        Filter::Presence { attribute } => values_of(entry, attribute).next().is_some(),
        Filter::Equality { attribute, value } => {
            values_of(entry, attribute).any(|v| compare(v, value) == Some(Ordering::Equal))
        }
        Filter::GreaterOrEqual { attribute, value } => values_of(entry, attribute)
            .any(|v| matches!(compare(v, value), Some(Ordering::Greater | Ordering::Equal))),
        Filter::LessOrEqual { attribute, value } => values_of(entry, attribute)
            .any(|v| matches!(compare(v, value), Some(Ordering::Less | Ordering::Equal))),
        Filter::Substring {
            attribute,
            initial,
            any,
            last,
        } => values_of(entry, attribute).any(|v| {
            substring_matches(&v.to_text(), initial.as_deref(), any, last.as_deref())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirstore_model::Attribute;

    fn alice() -> Entry {
        Entry::with_attributes(
            "uid=alice,ou=people,o=example",
            vec![
                Attribute::multi("objectClass", ["top", "person"]),
                Attribute::single("uid", "alice"),
                Attribute::single("cn", "Alice Liddell"),
                Attribute::single("age", 31i64),
            ],
        )
    }

    #[test]
    fn parses_nested_filters() {
        let f = parse_filter("(&(objectClass=person)(|(uid=alice)(!(age>=40))))").unwrap();
        assert_eq!(
            f,
            Filter::and(vec![
                Filter::equality("objectClass", "person"),
                Filter::or(vec![
                    Filter::equality("uid", "alice"),
                    Filter::not(Filter::greater_or_equal("age", "40")),
                ]),
            ])
        );
    }

    #[test]
    fn parses_substrings_and_escapes() {
        assert_eq!(
            parse_filter("(cn=Al*ce*Lid\\2a*)").unwrap(),
            Filter::substring("cn", Some("Al"), &["ce", "Lid*"], None)
        );
        assert_eq!(
            parse_filter("(cn=a\\28b\\29)").unwrap(),
            Filter::equality("cn", "a(b)")
        );
        assert_eq!(parse_filter("(mail=*)").unwrap(), Filter::presence("mail"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_filter("(uid=alice").is_err());
        assert!(parse_filter("(&)").is_err());
        assert!(parse_filter("uid=alice").is_err());
        assert!(parse_filter("(=x)").is_err());
    }

    #[test]
    fn evaluation() {
        let e = alice();
        let yes = |s: &str| entry_matches(&parse_filter(s).unwrap(), &e);
        assert!(yes("(UID=ALICE)"));
        assert!(yes("(cn=*liddell)"));
        assert!(yes("(age>=31)"));
        assert!(yes("(age<=100)"));
        assert!(yes("(age>=4)"));
        assert!(!yes("(mail=*)"));
        assert!(yes("(!(uid=bob))"));
    }
}

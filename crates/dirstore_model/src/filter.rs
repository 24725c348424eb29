//! Backend-neutral filter expressions.

use crate::Value;

/// A query filter.
///
/// Leaf values are stored unescaped; each backend translator escapes them
/// for its own syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All children must match.
    And(Vec<Filter>),
    /// At least one child must match.
    Or(Vec<Filter>),
    /// The child must not match.
    Not(Box<Filter>),
    /// Attribute has a value equal to `value`.
    Equality {
        /// Attribute name.
        attribute: String,
        /// Operand.
        value: Value,
    },
    /// Attribute has a value matching `initial*any*...*last`.
    Substring {
        /// Attribute name.
        attribute: String,
        /// Leading component.
        initial: Option<String>,
        /// Inner components, in order.
        any: Vec<String>,
        /// Trailing component.
        last: Option<String>,
    },
    /// Attribute has at least one value.
    Presence {
        /// Attribute name.
        attribute: String,
    },
    /// Attribute has a value greater than or equal to `value`.
    GreaterOrEqual {
        /// Attribute name.
        attribute: String,
        /// Operand.
        value: Value,
    },
    /// Attribute has a value less than or equal to `value`.
    LessOrEqual {
        /// Attribute name.
        attribute: String,
        /// Operand.
        value: Value,
    },
}

impl Filter {
    /// Conjunction.
    pub fn and(children: Vec<Filter>) -> Self {
        Filter::And(children)
    }

    /// Disjunction.
    pub fn or(children: Vec<Filter>) -> Self {
        Filter::Or(children)
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Filter) -> Self {
        Filter::Not(Box::new(child))
    }

    /// Equality match.
    pub fn equality(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equality {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Presence match.
    pub fn presence(attribute: impl Into<String>) -> Self {
        Filter::Presence {
            attribute: attribute.into(),
        }
    }

    /// Substring match.
    pub fn substring(
        attribute: impl Into<String>,
        initial: Option<&str>,
        any: &[&str],
        last: Option<&str>,
    ) -> Self {
        Filter::Substring {
            attribute: attribute.into(),
            initial: initial.map(str::to_string),
            any: any.iter().map(|s| s.to_string()).collect(),
            last: last.map(str::to_string),
        }
    }

    /// Greater-or-equal comparison.
    pub fn greater_or_equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::GreaterOrEqual {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Less-or-equal comparison.
    pub fn less_or_equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::LessOrEqual {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Match every entry carrying an object class.
    pub fn any_entry() -> Self {
        Filter::presence(crate::entry::OBJECT_CLASS)
    }

    /// Combine with another filter, flattening nested conjunctions.
    pub fn and_also(self, other: Filter) -> Self {
        match self {
            Filter::And(mut children) => {
                children.push(other);
                Filter::And(children)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Attribute names referenced by the filter, in first-use order.
    pub fn attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        self.collect_attributes(&mut names);
        names
    }

    fn collect_attributes<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_attributes(names);
                }
            }
            Filter::Not(child) => child.collect_attributes(names),
            Filter::Equality { attribute, .. }
            | Filter::Substring { attribute, .. }
            | Filter::Presence { attribute }
            | Filter::GreaterOrEqual { attribute, .. }
            | Filter::LessOrEqual { attribute, .. } => {
                if !names.iter().any(|n| n.eq_ignore_ascii_case(attribute)) {
                    names.push(attribute);
                }
            }
        }
    }
}

//! Rule-string parsing
//!
//! A rule string is a pipe-delimited list of named constraints, each with an
//! optional comma-separated parameter list after the first colon:
//!
//! ```text
//! required|max:20|foreign_int:users,id
//! ```
//!
//! A `regex` rule keeps everything after its colon as one parameter, since a
//! pattern may contain commas.
//!
//! Parsing never fails. A malformed or unknown rule is kept as written and
//! reported by the [`ValidationEngine`](super::ValidationEngine) against the
//! one attribute that declared it.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// One named constraint with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub parameters: Vec<String>,
}

impl Rule {
    #[must_use]
    pub fn new(name: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// Parameter at `index`, if present.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&str> {
        self.parameters.get(index).map(String::as_str)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parameters.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.parameters.join(","))
        }
    }
}

/// Ordered rules parsed from one rule string. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleDescriptor {
    rules: Vec<Rule>,
}

impl RuleDescriptor {
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// First rule named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

impl<'a> IntoIterator for &'a RuleDescriptor {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl fmt::Display for RuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .rules
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|");
        f.write_str(&joined)
    }
}

impl FromStr for RuleDescriptor {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse(s))
    }
}

/// Parses a pipe-delimited rule string.
///
/// Whitespace around `|`, `:` and `,` is ignored and empty segments are
/// skipped. A rule without parameters gets an empty parameter list.
#[must_use]
pub fn parse(rule_string: &str) -> RuleDescriptor {
    let rules = rule_string
        .split('|')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(parse_segment)
        .collect();
    RuleDescriptor { rules }
}

/// Rules whose parameter text is taken whole.
const UNSPLIT_RULES: &[&str] = &["regex"];

fn parse_segment(segment: &str) -> Rule {
    match segment.split_once(':') {
        Some((name, parameters)) => {
            let parameters = if parameters.trim().is_empty() {
                Vec::new()
            } else if UNSPLIT_RULES.contains(&name.trim()) {
                vec![parameters.trim().to_string()]
            } else {
                parameters
                    .split(',')
                    .map(|parameter| parameter.trim().to_string())
                    .collect()
            };
            Rule::new(name.trim(), parameters)
        }
        None => Rule::new(segment, Vec::new()),
    }
}

//! Lexer output shared by every markup dialect.

use crate::succinct::{Token, TokenKind};

/// A marker name as written, e.g. `\+q2` or `\toc1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagName {
    /// Name without level or nesting marker
    pub name: String,
    /// Name with level, except that level 1 is dropped
    pub full_name: String,
    pub level: u32,
    pub nested: bool,
}

impl TagName {
    /// Build from the raw name (optionally `+`-prefixed) and level suffix
    pub fn new(raw: &str, level: &str) -> Self {
        let (name, nested) = match raw.strip_prefix('+') {
            Some(rest) => (rest.to_string(), true),
            None => (raw.to_string(), false),
        };
        let full_name = if level == "1" {
            name.clone()
        } else {
            format!("{}{}", name, level)
        };
        let numeric = level
            .split('-')
            .next()
            .and_then(|l| l.parse().ok())
            .unwrap_or(1);
        Self {
            name,
            full_name,
            level: numeric,
            nested,
        }
    }

    /// Split a USX style such as `q2` or `toc1` into name and level
    pub fn from_style(style: &str) -> Self {
        let split = style
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(style.len());
        let (name, level) = style.split_at(split);
        Self::new(name, level)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneEdge {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreToken {
    Chapter {
        number: String,
    },
    PubChapter {
        number: String,
    },
    Verses {
        number: String,
        numbers: Vec<u32>,
    },
    Attribute {
        key: String,
        values: Vec<String>,
    },
    StartTag(TagName),
    EndTag(TagName),
    StartMilestone {
        name: String,
        edge: MilestoneEdge,
    },
    EndMilestoneMarker,
    EmptyMilestone {
        name: String,
    },
    Printable(Token),
}

impl PreToken {
    pub fn printable(kind: TokenKind, chars: impl Into<String>) -> Self {
        PreToken::Printable(Token {
            kind,
            chars: chars.into(),
        })
    }

    pub fn verses(number: &str) -> Self {
        PreToken::Verses {
            number: number.to_string(),
            numbers: expand_verse_numbers(number),
        }
    }

    pub fn attribute(key: &str, value: &str) -> Self {
        let value = value.trim().replace('/', "÷");
        PreToken::Attribute {
            key: key.to_string(),
            values: value.split(',').map(|v| v.trim().to_string()).collect(),
        }
    }
}

/// `3` -> [3], `3-5` -> [3, 4, 5]
pub fn expand_verse_numbers(number: &str) -> Vec<u32> {
    match number.split_once('-') {
        Some((from, to)) => match (from.parse::<u32>(), to.parse::<u32>()) {
            (Ok(f), Ok(t)) if f <= t => (f..=t).collect(),
            (Ok(f), _) => vec![f],
            _ => Vec::new(),
        },
        None => number.parse().map(|n| vec![n]).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_name_levels() {
        let t = TagName::new("q", "1");
        assert_eq!(t.full_name, "q");
        assert_eq!(t.level, 1);

        let t = TagName::new("+q", "2");
        assert!(t.nested);
        assert_eq!(t.name, "q");
        assert_eq!(t.full_name, "q2");
        assert_eq!(t.level, 2);

        let t = TagName::new("p", "");
        assert_eq!(t.full_name, "p");
    }

    #[test]
    fn test_from_style() {
        assert_eq!(TagName::from_style("toc2").full_name, "toc2");
        assert_eq!(TagName::from_style("toc2").name, "toc");
        assert_eq!(TagName::from_style("mt1").full_name, "mt");
        assert_eq!(TagName::from_style("p").full_name, "p");
    }

    #[test]
    fn test_expand_verses() {
        assert_eq!(expand_verse_numbers("3"), vec![3]);
        assert_eq!(expand_verse_numbers("3-5"), vec![3, 4, 5]);
        assert_eq!(expand_verse_numbers("5-3"), vec![5]);
        assert!(expand_verse_numbers("x").is_empty());
    }

    #[test]
    fn test_attribute_values() {
        let pt = PreToken::attribute("lemma", " a/b, c ");
        assert_eq!(
            pt,
            PreToken::Attribute {
                key: "lemma".to_string(),
                values: vec!["a÷b".to_string(), "c".to_string()],
            }
        );
    }
}

//! Scope labels: `kind/component/...`

use crate::error::LookupError;

/// Closed set of scope kinds and the number of components each carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    BlockTag,
    Inline,
    Chapter,
    PubChapter,
    AltChapter,
    Verses,
    Verse,
    PubVerse,
    AltVerse,
    EsbCat,
    Span,
    SpanWithAtts,
    Attribute,
    Milestone,
    Table,
    Cell,
    OrphanTokens,
    HangingGraft,
}

const ALL_KINDS: [ScopeKind; 18] = [
    ScopeKind::BlockTag,
    ScopeKind::Inline,
    ScopeKind::Chapter,
    ScopeKind::PubChapter,
    ScopeKind::AltChapter,
    ScopeKind::Verses,
    ScopeKind::Verse,
    ScopeKind::PubVerse,
    ScopeKind::AltVerse,
    ScopeKind::EsbCat,
    ScopeKind::Span,
    ScopeKind::SpanWithAtts,
    ScopeKind::Attribute,
    ScopeKind::Milestone,
    ScopeKind::Table,
    ScopeKind::Cell,
    ScopeKind::OrphanTokens,
    ScopeKind::HangingGraft,
];

impl ScopeKind {
    pub fn name(self) -> &'static str {
        match self {
            ScopeKind::BlockTag => "blockTag",
            ScopeKind::Inline => "inline",
            ScopeKind::Chapter => "chapter",
            ScopeKind::PubChapter => "pubChapter",
            ScopeKind::AltChapter => "altChapter",
            ScopeKind::Verses => "verses",
            ScopeKind::Verse => "verse",
            ScopeKind::PubVerse => "pubVerse",
            ScopeKind::AltVerse => "altVerse",
            ScopeKind::EsbCat => "esbCat",
            ScopeKind::Span => "span",
            ScopeKind::SpanWithAtts => "spanWithAtts",
            ScopeKind::Attribute => "attribute",
            ScopeKind::Milestone => "milestone",
            ScopeKind::Table => "table",
            ScopeKind::Cell => "cell",
            ScopeKind::OrphanTokens => "orphanTokens",
            ScopeKind::HangingGraft => "hangingGraft",
        }
    }

    /// Components after the kind
    pub fn n_components(self) -> usize {
        match self {
            ScopeKind::Attribute => 5,
            ScopeKind::Cell => 3,
            ScopeKind::Table | ScopeKind::OrphanTokens | ScopeKind::HangingGraft => 0,
            _ => 1,
        }
    }

    pub fn code(self) -> u8 {
        ALL_KINDS.iter().position(|k| *k == self).unwrap_or(0) as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        ALL_KINDS.get(code as usize).copied()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_KINDS.iter().copied().find(|k| k.name() == name)
    }
}

/// A label split into its kind and components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeLabel<'a> {
    pub kind: ScopeKind,
    pub components: Vec<&'a str>,
}

impl<'a> ScopeLabel<'a> {
    pub fn parse(label: &'a str) -> Result<Self, LookupError> {
        let mut parts = label.split('/');
        let kind = parts
            .next()
            .and_then(ScopeKind::from_name)
            .ok_or_else(|| LookupError::UnknownScope(label.to_string()))?;
        let components: Vec<&str> = parts.collect();
        if components.len() != kind.n_components() {
            return Err(LookupError::UnknownScope(label.to_string()));
        }
        Ok(Self { kind, components })
    }
}

pub fn join_label(kind: ScopeKind, components: &[&str]) -> String {
    let mut label = kind.name().to_string();
    for c in components {
        label.push('/');
        label.push_str(c);
    }
    label
}

/// The first component of a label, e.g. `3` for `chapter/3`
pub fn label_payload(label: &str) -> Option<&str> {
    label.split_once('/').map(|(_, rest)| rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label() {
        let l = ScopeLabel::parse("chapter/3").unwrap();
        assert_eq!(l.kind, ScopeKind::Chapter);
        assert_eq!(l.components, vec!["3"]);

        let l = ScopeLabel::parse("attribute/spanWithAtts/w/lemma/0/grace").unwrap();
        assert_eq!(l.kind, ScopeKind::Attribute);
        assert_eq!(l.components.len(), 5);

        assert!(ScopeLabel::parse("table").is_ok());
    }

    #[test]
    fn test_parse_bad_label() {
        assert!(ScopeLabel::parse("nonsense/1").is_err());
        assert!(ScopeLabel::parse("chapter").is_err());
        assert!(ScopeLabel::parse("chapter/1/2").is_err());
    }

    #[test]
    fn test_kind_codes() {
        for kind in ALL_KINDS {
            assert_eq!(ScopeKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(join_label(ScopeKind::Verse, &["4"]), "verse/4");
        assert_eq!(label_payload("verses/1-2"), Some("1-2"));
    }
}

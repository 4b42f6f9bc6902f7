//! Regex lexer for USFM.
//!
//! One alternation, tried left to right at each position. Every character
//! matches some branch (the last one is a catch-all), so matches tile the
//! input.

use crate::error::ImportError;
use crate::parser::pretoken::{MilestoneEdge, PreToken, TagName};
use crate::parser::specs::TagTable;
use crate::succinct::TokenKind;
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Branches shared with the USX text lexer
macro_rules! printable_branches {
    () => {
        concat!(
            r"(?P<eol>[ \t]*[\r\n]+[ \t]*)",
            r"|(?P<nbsp>~)",
            r"|(?P<soft_break>//)",
            r"|(?P<word>[\p{L}\p{N}\p{M}\x{2060}]{1,127})",
            r"|(?P<space>[\p{Z}\t]{1,127})",
            r"|(?P<punct>[\p{P}\p{S}])",
            r"|(?P<unknown>(?s:.))",
        )
    };
}

static USFM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?P<chapter>[\r\n]*\\c[ \t]+(?P<c_num>\d+)[ \t\r\n]*)",
        r"|(?P<pubchapter>[\r\n]*\\cp[ \t]+(?P<cp_num>[^\r\n]+)[ \t\r\n]*)",
        r"|(?P<verses>\\v[ \t]+(?P<v_num>[\d\-]+)[ \t\r\n]*)",
        r#"|(?P<attribute>[ \t]*\|?[ \t]*(?P<a_key>[A-Za-z0-9\-]+)="(?P<a_val>[^"]*)"[ \t]?)"#,
        r"|(?P<empty_ms>\\(?P<em_name>[a-z1-9]+)\\\*)",
        r"|(?P<start_ms>\\(?P<sm_name>[a-z1-9]+)-(?P<sm_edge>[se]))",
        r"|(?P<end_ms>\\\*)",
        r"|(?P<end_tag>\\(?P<et_name>\+?[a-z\-]+)(?P<et_level>[1-9]?(?:-[1-9])?)\*)",
        r"|(?P<start_tag>\\(?P<st_name>\+?[a-z\-]+)(?P<st_level>[1-9]?(?:-[1-9])?)[ \t]?)",
        r"|(?P<bare_slash>\\)|",
        printable_branches!(),
    ))
    .expect("USFM lexer regex")
});

static TEXT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(printable_branches!()).expect("text lexer regex"));

/// Lex a USFM document into pre-tokens
pub fn lex_usfm(text: &str, table: &TagTable) -> Result<Vec<PreToken>, ImportError> {
    let mut tokens = Vec::new();
    for caps in USFM_REGEX.captures_iter(text) {
        if let Some(pt) = usfm_pretoken(&caps, table)? {
            tokens.push(pt);
        }
    }
    Ok(tokens)
}

fn usfm_pretoken(caps: &Captures<'_>, table: &TagTable) -> Result<Option<PreToken>, ImportError> {
    let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or("");
    let pos = caps.get(0).map(|m| m.start()).unwrap_or(0);

    if caps.name("chapter").is_some() {
        return Ok(Some(PreToken::Chapter {
            number: group("c_num").to_string(),
        }));
    }
    if caps.name("pubchapter").is_some() {
        return Ok(Some(PreToken::PubChapter {
            number: group("cp_num").trim().to_string(),
        }));
    }
    if caps.name("verses").is_some() {
        return Ok(Some(PreToken::verses(group("v_num"))));
    }
    if caps.name("attribute").is_some() {
        return Ok(Some(PreToken::attribute(group("a_key"), group("a_val"))));
    }
    if caps.name("empty_ms").is_some() {
        return Ok(Some(PreToken::EmptyMilestone {
            name: group("em_name").to_string(),
        }));
    }
    if caps.name("start_ms").is_some() {
        let edge = if group("sm_edge") == "s" {
            MilestoneEdge::Start
        } else {
            MilestoneEdge::End
        };
        return Ok(Some(PreToken::StartMilestone {
            name: group("sm_name").to_string(),
            edge,
        }));
    }
    if caps.name("end_ms").is_some() {
        return Ok(Some(PreToken::EndMilestoneMarker));
    }
    if caps.name("end_tag").is_some() {
        return Ok(Some(PreToken::EndTag(TagName::new(
            group("et_name"),
            group("et_level"),
        ))));
    }
    if caps.name("start_tag").is_some() {
        let tag = TagName::new(group("st_name"), group("st_level"));
        if !table.knows_start_tag(&tag.name) {
            return Err(ImportError::UnknownTag { tag: tag.name, pos });
        }
        return Ok(Some(PreToken::StartTag(tag)));
    }
    if caps.name("bare_slash").is_some() {
        return Ok(Some(PreToken::printable(TokenKind::BareSlash, "\\")));
    }
    Ok(printable_pretoken(caps))
}

fn printable_pretoken(caps: &Captures<'_>) -> Option<PreToken> {
    let text = caps.get(0)?.as_str();
    let kind = if caps.name("eol").is_some() {
        return Some(PreToken::printable(TokenKind::Eol, "\n"));
    } else if caps.name("nbsp").is_some() {
        TokenKind::NoBreakSpace
    } else if caps.name("soft_break").is_some() {
        TokenKind::SoftLineBreak
    } else if caps.name("word").is_some() {
        TokenKind::WordLike
    } else if caps.name("space").is_some() {
        TokenKind::LineSpace
    } else if caps.name("punct").is_some() {
        TokenKind::Punctuation
    } else {
        TokenKind::Unknown
    };
    Some(PreToken::printable(kind, text))
}

/// Lex character data (no markers) into printable pre-tokens
pub fn lex_text(text: &str) -> Vec<PreToken> {
    TEXT_REGEX
        .captures_iter(text)
        .filter(|caps| caps.get(0).is_some_and(|m| !m.is_empty()))
        .filter_map(|caps| printable_pretoken(&caps))
        .collect()
}

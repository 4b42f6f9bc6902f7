//! Event lexer for USX, driven by `quick-xml`.

use super::usfm::lex_text;
use crate::error::ImportError;
use crate::parser::pretoken::{MilestoneEdge, PreToken, TagName};
use crate::parser::specs::TagTable;
use crate::succinct::TokenKind;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::sync::LazyLock;
use tracing::warn;

static MILESTONE_STYLE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^([a-z1-9]+)-([se])$").expect("milestone style regex"));

const IGNORED_ATTRIBUTES: &[&str] = &[
    "sid",
    "eid",
    "style",
    "srcloc",
    "link-href",
    "link-title",
    "link-id",
    "closed",
];

type Attributes = Vec<(String, String)>;

struct UsxLexer<'t> {
    table: &'t TagTable,
    tokens: Vec<PreToken>,
    stack: Vec<(String, Attributes)>,
    para_text: String,
    pos: usize,
}

/// Lex a USX document into pre-tokens
pub fn lex_usx(text: &str, table: &TagTable) -> Result<Vec<PreToken>, ImportError> {
    let mut reader = Reader::from_str(text);
    let mut lexer = UsxLexer {
        table,
        tokens: Vec::new(),
        stack: Vec::new(),
        para_text: String::new(),
        pos: 0,
    };
    loop {
        lexer.pos = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(ref e)) => lexer.open(e)?,
            Ok(Event::Empty(ref e)) => {
                lexer.open(e)?;
                lexer.close()?;
            }
            Ok(Event::End(_)) => lexer.close()?,
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|e| ImportError::Xml(e.to_string()))?;
                lexer.text(&text);
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e).into_owned();
                lexer.text(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ImportError::Xml(e.to_string())),
            _ => {}
        }
    }
    Ok(lexer.tokens)
}

fn attributes(e: &BytesStart<'_>) -> Result<Attributes, ImportError> {
    let mut atts = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ImportError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ImportError::Xml(e.to_string()))?
            .into_owned();
        atts.push((key, value));
    }
    Ok(atts)
}

fn att<'a>(atts: &'a Attributes, key: &str) -> Option<&'a str> {
    atts.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

impl UsxLexer<'_> {
    fn push(&mut self, pt: PreToken) {
        self.tokens.push(pt);
    }

    fn start_tag(&mut self, style: &str, nested: bool) -> Result<(), ImportError> {
        let tag = TagName::from_style(style);
        if !self.table.knows_start_tag(&tag.name) {
            return Err(ImportError::UnknownTag {
                tag: tag.name,
                pos: self.pos,
            });
        }
        let tag = if nested {
            TagName { nested: true, ..tag }
        } else {
            tag
        };
        self.push(PreToken::StartTag(tag));
        Ok(())
    }

    fn end_tag(&mut self, style: &str, nested: bool) {
        let tag = TagName::from_style(style);
        self.push(PreToken::EndTag(TagName { nested, ..tag }));
    }

    /// `\tag value\tag*` around a single word
    fn wrapped_word(&mut self, style: &str, value: &str) -> Result<(), ImportError> {
        self.start_tag(style, true)?;
        self.push(PreToken::printable(TokenKind::WordLike, value));
        self.end_tag(style, true);
        Ok(())
    }

    fn attribute_tokens(&mut self, atts: &Attributes) {
        for (key, value) in atts {
            if !IGNORED_ATTRIBUTES.contains(&key.as_str()) {
                self.push(PreToken::attribute(key, value));
            }
        }
    }

    fn text(&mut self, text: &str) {
        if matches!(self.stack.last(), Some((name, _)) if name == "para") {
            self.para_text.push_str(text);
        }
        let in_cp = self
            .stack
            .last()
            .is_some_and(|(_, atts)| att(atts, "style") == Some("cp"));
        if in_cp {
            return;
        }
        let lexed = lex_text(text);
        self.tokens.extend(lexed);
    }

    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), ImportError> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let atts = attributes(e)?;
        let style = att(&atts, "style").unwrap_or("").to_string();
        match name.as_str() {
            "usx" | "table" | "ref" => {}
            "book" => {
                self.start_tag("id", false)?;
                let code = att(&atts, "code").unwrap_or("").to_string();
                self.push(PreToken::printable(TokenKind::WordLike, code));
                self.push(PreToken::printable(TokenKind::LineSpace, " "));
            }
            "chapter" => {
                if let Some(number) = att(&atts, "number") {
                    self.push(PreToken::Chapter {
                        number: number.to_string(),
                    });
                    if let Some(pub_number) = att(&atts, "pubnumber") {
                        self.push(PreToken::PubChapter {
                            number: pub_number.to_string(),
                        });
                    }
                    if let Some(alt) = att(&atts, "altnumber") {
                        let alt = alt.to_string();
                        self.wrapped_word("ca", &alt)?;
                    }
                }
            }
            "verse" => {
                if let Some(number) = att(&atts, "number") {
                    self.push(PreToken::verses(number));
                    if let Some(pub_number) = att(&atts, "pubnumber") {
                        let pub_number = pub_number.to_string();
                        self.wrapped_word("vp", &pub_number)?;
                    }
                    if let Some(alt) = att(&atts, "altnumber") {
                        let alt = alt.to_string();
                        self.wrapped_word("va", &alt)?;
                    }
                }
            }
            "para" => {
                self.para_text.clear();
                if style != "cp" {
                    self.start_tag(&style, false)?;
                }
            }
            "row" | "cell" => self.start_tag(&style, false)?,
            "char" => {
                self.start_tag(&style, true)?;
                self.attribute_tokens(&atts);
            }
            "ms" => match MILESTONE_STYLE.captures(&style) {
                Some(caps) => {
                    let edge = if &caps[2] == "s" {
                        MilestoneEdge::Start
                    } else {
                        MilestoneEdge::End
                    };
                    self.push(PreToken::StartMilestone {
                        name: caps[1].to_string(),
                        edge,
                    });
                    self.attribute_tokens(&atts);
                    self.push(PreToken::EndMilestoneMarker);
                }
                None => self.push(PreToken::EmptyMilestone {
                    name: style.clone(),
                }),
            },
            "note" => {
                self.start_tag(&style, false)?;
                let caller = att(&atts, "caller").unwrap_or("+").to_string();
                self.push(PreToken::printable(TokenKind::Punctuation, caller));
            }
            "sidebar" => {
                self.start_tag("esb", false)?;
                if let Some(category) = att(&atts, "category") {
                    let category = category.to_string();
                    self.start_tag("cat", false)?;
                    self.push(PreToken::printable(TokenKind::WordLike, category));
                    self.end_tag("cat", false);
                }
            }
            "figure" => {
                self.start_tag("fig", true)?;
                for (key, value) in &atts {
                    if key == "style" {
                        continue;
                    }
                    let key = if key == "file" { "src" } else { key.as_str() };
                    self.tokens.push(PreToken::attribute(key, value));
                }
            }
            "optbreak" => self.push(PreToken::printable(TokenKind::SoftLineBreak, "//")),
            "periph" => warn!(element = %name, "USX element not handled"),
            _ => {
                return Err(ImportError::UnknownTag {
                    tag: name,
                    pos: self.pos,
                });
            }
        }
        self.stack.push((name, atts));
        Ok(())
    }

    fn close(&mut self) -> Result<(), ImportError> {
        let Some((name, atts)) = self.stack.pop() else {
            return Err(ImportError::Xml("unbalanced close tag".to_string()));
        };
        let style = att(&atts, "style").unwrap_or("").to_string();
        match name.as_str() {
            "book" => self.end_tag("id", false),
            "para" => {
                if style == "cp" {
                    let number = self.para_text.trim().to_string();
                    self.push(PreToken::PubChapter { number });
                } else {
                    self.end_tag(&style, false);
                }
                self.para_text.clear();
            }
            "row" | "cell" => self.end_tag(&style, false),
            "char" => self.end_tag(&style, true),
            "note" => self.end_tag(&style, false),
            "sidebar" => self.start_tag("esbe", false)?,
            "figure" => self.end_tag("fig", true),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomTags;

    fn lex(text: &str) -> Result<Vec<PreToken>, ImportError> {
        let table = TagTable::new(&CustomTags::default()).unwrap();
        lex_usx(text, &table)
    }

    #[test]
    fn test_book_chapter_verse() {
        let pts = lex(concat!(
            r#"<usx version="3.0"><book code="GEN" style="id">Test</book>"#,
            r#"<chapter number="1" style="c"/><para style="p">"#,
            r#"<verse number="1" style="v"/>In the</para></usx>"#,
        ))
        .unwrap();
        assert!(matches!(&pts[0], PreToken::StartTag(t) if t.name == "id"));
        assert_eq!(pts[1], PreToken::printable(TokenKind::WordLike, "GEN"));
        assert!(pts.contains(&PreToken::Chapter {
            number: "1".to_string()
        }));
        assert!(pts.contains(&PreToken::verses("1")));
        assert!(pts.contains(&PreToken::printable(TokenKind::WordLike, "the")));
        assert!(matches!(pts.last(), Some(PreToken::EndTag(t)) if t.name == "p"));
    }

    #[test]
    fn test_char_attributes() {
        let pts = lex(r#"<usx><para style="p"><char style="w" lemma="arche">beginning</char></para></usx>"#)
            .unwrap();
        assert!(matches!(&pts[1], PreToken::StartTag(t) if t.name == "w" && t.nested));
        assert!(matches!(&pts[2], PreToken::Attribute { key, .. } if key == "lemma"));
        assert_eq!(pts[3], PreToken::printable(TokenKind::WordLike, "beginning"));
    }

    #[test]
    fn test_cp_paragraph() {
        let pts = lex(r#"<usx><chapter number="2" style="c"/><para style="cp">B</para></usx>"#).unwrap();
        assert_eq!(
            pts.last(),
            Some(&PreToken::PubChapter {
                number: "B".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_element() {
        let err = lex("<usx><bogus/></usx>").unwrap_err();
        assert!(matches!(err, ImportError::UnknownTag { ref tag, .. } if tag == "bogus"));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(lex("<usx><para style=\"p\"></usx>").is_err());
    }
}

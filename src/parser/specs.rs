//! Tag table: what each marker does to the parser.
//!
//! Lookup is keyed by the pre-token variant and, for markers, the tag name
//! without level. The answer is a closed [`Behavior`], which the parser turns
//! into a [`Descriptor`] of sequence changes, scopes and hooks.

use crate::config::CustomTags;
use crate::error::ConfigurationError;
use crate::parser::pretoken::{MilestoneEdge, PreToken};
use crate::succinct::ScopeKind;
use rustc_hash::FxHashMap;

/// Pre-token variant used as the first half of a lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    StartTag,
    EndTag,
    StartMilestone,
    EmptyMilestone,
    EndMilestoneMarker,
    Chapter,
    PubChapter,
    Verses,
    Attribute,
    Printable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRole {
    Heading,
    Body,
}

impl CellRole {
    pub fn name(self) -> &'static str {
        match self {
            CellRole::Heading => "heading",
            CellRole::Body => "body",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellAlign {
    Start,
    Center,
    End,
}

impl CellAlign {
    pub fn name(self) -> &'static str {
        match self {
            CellAlign::Start => "start",
            CellAlign::Center => "center",
            CellAlign::End => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Header,
    Remark,
    Introduction,
    IntroTitle,
    IntroEndTitle,
    Title,
    EndTitle,
    Heading,
    Paragraph,
    TableRow,
    Cell { role: CellRole, align: CellAlign },
    Character,
    SpanWithAtts,
    Note { sequence: &'static str },
    NumberDigression { sequence: &'static str, kind: ScopeKind },
    EndDigression,
    Chapter,
    PubChapter,
    Verses,
    MilestoneStart,
    EmptyMilestone,
    Attribute,
    EndMilestoneMarker,
    SidebarStart,
    SidebarEnd,
    Text,
}

/// Which sequence a behavior makes current
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseTarget {
    /// `main`, or the open sidebar
    MainLike,
    Named(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    OpenChapter,
    OpenPubChapter,
    OpenVerses,
    OpenCell(CellRole, CellAlign),
    SetAttributeContext,
    ClearAttributeContext,
    OpenAttributes,
    AddEmptyMilestone,
    ReturnToBase,
    OpenNumberScope(ScopeKind),
    StartSidebar,
    EndSidebar,
    AddToken,
}

/// A scope opened in the current sequence.
///
/// `$fullTagName$` and `$tagName$` are substituted from the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeTemplate {
    pub label: &'static str,
    pub ended_by: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor {
    pub base: Option<BaseTarget>,
    /// Start a new sequence even when the base type is unchanged
    pub force_new_sequence: bool,
    pub inline: Option<&'static str>,
    pub new_block: bool,
    pub scopes: &'static [ScopeTemplate],
    pub during: Option<Hook>,
    pub after: Option<Hook>,
}

const SPAN_ENDINGS: &[&str] = &[
    "endTag/$fullTagName$",
    "endBlock",
    "implicitEnd",
    "baseSequenceChange",
];

const SPAN_SCOPES: &[ScopeTemplate] = &[ScopeTemplate {
    label: "span/$fullTagName$",
    ended_by: SPAN_ENDINGS,
}];

const SPAN_WITH_ATTS_SCOPES: &[ScopeTemplate] = &[ScopeTemplate {
    label: "spanWithAtts/$fullTagName$",
    ended_by: SPAN_ENDINGS,
}];

const NOTE_SCOPES: &[ScopeTemplate] = &[ScopeTemplate {
    label: "inline/$fullTagName$",
    ended_by: &[],
}];

const MILESTONE_SCOPES: &[ScopeTemplate] = &[ScopeTemplate {
    label: "milestone/$tagName$",
    ended_by: &["endMilestone/$tagName$"],
}];

impl Behavior {
    pub fn is_digression(self) -> bool {
        matches!(
            self,
            Behavior::Note { .. } | Behavior::NumberDigression { .. }
        )
    }

    pub fn descriptor(self) -> Descriptor {
        let block = |base| Descriptor {
            base: Some(base),
            new_block: true,
            ..Descriptor::default()
        };
        let forced = |base| Descriptor {
            force_new_sequence: true,
            ..block(base)
        };
        let hook = |h| Descriptor {
            during: Some(h),
            ..Descriptor::default()
        };
        match self {
            Behavior::Header => block(BaseTarget::Named("header")),
            Behavior::Remark => forced(BaseTarget::Named("remark")),
            Behavior::Introduction => block(BaseTarget::Named("introduction")),
            Behavior::IntroTitle => block(BaseTarget::Named("introTitle")),
            Behavior::IntroEndTitle => block(BaseTarget::Named("introEndTitle")),
            Behavior::Title => block(BaseTarget::Named("title")),
            Behavior::EndTitle => block(BaseTarget::Named("endTitle")),
            Behavior::Heading => forced(BaseTarget::Named("heading")),
            Behavior::Paragraph | Behavior::TableRow => block(BaseTarget::MainLike),
            Behavior::Cell { role, align } => hook(Hook::OpenCell(role, align)),
            Behavior::Character => Descriptor {
                scopes: SPAN_SCOPES,
                ..Descriptor::default()
            },
            Behavior::SpanWithAtts => Descriptor {
                scopes: SPAN_WITH_ATTS_SCOPES,
                after: Some(Hook::SetAttributeContext),
                ..Descriptor::default()
            },
            Behavior::Note { sequence } => Descriptor {
                inline: Some(sequence),
                scopes: NOTE_SCOPES,
                ..Descriptor::default()
            },
            Behavior::NumberDigression { sequence, kind } => Descriptor {
                inline: Some(sequence),
                after: Some(Hook::OpenNumberScope(kind)),
                ..Descriptor::default()
            },
            Behavior::EndDigression => Descriptor {
                after: Some(Hook::ReturnToBase),
                ..Descriptor::default()
            },
            Behavior::Chapter => hook(Hook::OpenChapter),
            Behavior::PubChapter => hook(Hook::OpenPubChapter),
            Behavior::Verses => hook(Hook::OpenVerses),
            Behavior::MilestoneStart => Descriptor {
                scopes: MILESTONE_SCOPES,
                after: Some(Hook::SetAttributeContext),
                ..Descriptor::default()
            },
            Behavior::EmptyMilestone => hook(Hook::AddEmptyMilestone),
            Behavior::Attribute => hook(Hook::OpenAttributes),
            Behavior::EndMilestoneMarker => hook(Hook::ClearAttributeContext),
            Behavior::SidebarStart => Descriptor {
                base: Some(BaseTarget::Named("sidebar")),
                force_new_sequence: true,
                during: Some(Hook::StartSidebar),
                ..Descriptor::default()
            },
            Behavior::SidebarEnd => hook(Hook::EndSidebar),
            Behavior::Text => hook(Hook::AddToken),
        }
    }
}

const HEADER_TAGS: &[&str] = &["id", "usfm", "ide", "sts", "h", "toc", "toca"];

const INTRO_TAGS: &[&str] = &[
    "is", "ip", "ipi", "im", "imi", "ipq", "imq", "ipr", "iq", "ib", "ili", "iot", "io", "iex",
    "ie",
];

const HEADING_TAGS: &[&str] = &["s", "ms", "mr", "r", "d", "sp", "sr", "sd", "qa", "cl"];

const PARAGRAPH_TAGS: &[&str] = &[
    "p", "m", "po", "pr", "cls", "pmo", "pm", "pmc", "pmr", "pi", "mi", "nb", "pc", "ph", "b",
    "q", "qr", "qc", "qm", "qd", "lh", "li", "lf", "lim", "lit",
];

const CHARACTER_TAGS: &[&str] = &[
    "add", "bk", "dc", "k", "nd", "ord", "pn", "png", "addpn", "qt", "sig", "sls", "tl", "wj",
    "em", "bd", "it", "bdit", "no", "sc", "sup", "ndx", "wg", "wh", "wa", "pro", "qs", "qac",
    "litl", "lik", "liv", "fr", "fq", "fqa", "fk", "ft", "fl", "fw", "fp", "fv", "fdc", "fm",
    "xo", "xk", "xq", "xt", "xta", "xop", "xot", "xnt", "xdc", "ior", "iqt", "rq", "efm",
];

const SPAN_WITH_ATTS_TAGS: &[&str] = &["w", "rb", "jmp", "fig"];

const CELLS: &[(&str, CellRole, CellAlign)] = &[
    ("th", CellRole::Heading, CellAlign::Start),
    ("thr", CellRole::Heading, CellAlign::End),
    ("thc", CellRole::Heading, CellAlign::Center),
    ("tc", CellRole::Body, CellAlign::Start),
    ("tcr", CellRole::Body, CellAlign::End),
    ("tcc", CellRole::Body, CellAlign::Center),
];

const NOTES: &[(&str, &str)] = &[
    ("f", "footnote"),
    ("fe", "footnote"),
    ("ef", "footnote"),
    ("x", "xref"),
    ("ex", "xref"),
];

const NUMBER_DIGRESSIONS: &[(&str, &str, ScopeKind)] = &[
    ("vp", "pubNumber", ScopeKind::PubVerse),
    ("va", "altNumber", ScopeKind::AltVerse),
    ("ca", "altNumber", ScopeKind::AltChapter),
    ("cat", "esbCat", ScopeKind::EsbCat),
];

/// Tag name to behavior, per pre-token context
#[derive(Debug, Clone)]
pub struct TagTable {
    entries: FxHashMap<(Context, String), Behavior>,
    fixed: FxHashMap<Context, Behavior>,
}

impl TagTable {
    pub fn new(custom: &CustomTags) -> Result<Self, ConfigurationError> {
        let mut table = TagTable {
            entries: FxHashMap::default(),
            fixed: FxHashMap::default(),
        };
        table.insert_starts(HEADER_TAGS, Behavior::Header);
        table.insert_starts(&["rem"], Behavior::Remark);
        table.insert_starts(INTRO_TAGS, Behavior::Introduction);
        table.insert_starts(&["imt"], Behavior::IntroTitle);
        table.insert_starts(&["imte"], Behavior::IntroEndTitle);
        table.insert_starts(&["mt"], Behavior::Title);
        table.insert_starts(&["mte"], Behavior::EndTitle);
        table.insert_starts(HEADING_TAGS, Behavior::Heading);
        table.insert_starts(PARAGRAPH_TAGS, Behavior::Paragraph);
        table.insert_starts(&["tr"], Behavior::TableRow);
        table.insert_starts(CHARACTER_TAGS, Behavior::Character);
        table.insert_starts(SPAN_WITH_ATTS_TAGS, Behavior::SpanWithAtts);
        table.insert_starts(&["esb"], Behavior::SidebarStart);
        table.insert_starts(&["esbe"], Behavior::SidebarEnd);
        for (tag, role, align) in CELLS {
            table.insert(
                Context::StartTag,
                tag,
                Behavior::Cell {
                    role: *role,
                    align: *align,
                },
            );
        }
        for (tag, sequence) in NOTES {
            table.insert(
                Context::StartTag,
                tag,
                Behavior::Note {
                    sequence: *sequence,
                },
            );
            table.insert(Context::EndTag, tag, Behavior::EndDigression);
        }
        for (tag, sequence, kind) in NUMBER_DIGRESSIONS {
            table.insert(
                Context::StartTag,
                tag,
                Behavior::NumberDigression {
                    sequence: *sequence,
                    kind: *kind,
                },
            );
            table.insert(Context::EndTag, tag, Behavior::EndDigression);
        }

        for tag in custom.all() {
            if table.knows_start_tag(tag) {
                return Err(ConfigurationError::BadCustomTag(tag.clone()));
            }
        }
        for tag in &custom.heading {
            table.insert(Context::StartTag, tag, Behavior::Heading);
        }
        for tag in &custom.paragraph {
            table.insert(Context::StartTag, tag, Behavior::Paragraph);
        }
        for tag in &custom.character {
            table.insert(Context::StartTag, tag, Behavior::Character);
        }
        for tag in &custom.word {
            table.insert(Context::StartTag, tag, Behavior::SpanWithAtts);
        }

        table.fixed.insert(Context::Chapter, Behavior::Chapter);
        table.fixed.insert(Context::PubChapter, Behavior::PubChapter);
        table.fixed.insert(Context::Verses, Behavior::Verses);
        table.fixed.insert(Context::Attribute, Behavior::Attribute);
        table.fixed.insert(Context::EmptyMilestone, Behavior::EmptyMilestone);
        table
            .fixed
            .insert(Context::EndMilestoneMarker, Behavior::EndMilestoneMarker);
        table.fixed.insert(Context::Printable, Behavior::Text);
        Ok(table)
    }

    fn insert_starts(&mut self, tags: &[&str], behavior: Behavior) {
        for tag in tags {
            self.insert(Context::StartTag, tag, behavior);
        }
    }

    fn insert(&mut self, context: Context, tag: &str, behavior: Behavior) {
        self.entries.insert((context, tag.to_string()), behavior);
    }

    pub fn knows_start_tag(&self, name: &str) -> bool {
        self.entries
            .contains_key(&(Context::StartTag, name.to_string()))
    }

    /// Behavior for a pre-token, or `None` when it is inert
    pub fn lookup(&self, pt: &PreToken) -> Option<Behavior> {
        let keyed = |context: Context, name: &str| {
            self.entries.get(&(context, name.to_string())).copied()
        };
        match pt {
            PreToken::StartTag(tag) => keyed(Context::StartTag, &tag.name),
            PreToken::EndTag(tag) => keyed(Context::EndTag, &tag.name),
            PreToken::StartMilestone { edge, .. } => match edge {
                MilestoneEdge::Start => Some(Behavior::MilestoneStart),
                MilestoneEdge::End => None,
            },
            PreToken::Chapter { .. } => self.fixed.get(&Context::Chapter).copied(),
            PreToken::PubChapter { .. } => self.fixed.get(&Context::PubChapter).copied(),
            PreToken::Verses { .. } => self.fixed.get(&Context::Verses).copied(),
            PreToken::Attribute { .. } => self.fixed.get(&Context::Attribute).copied(),
            PreToken::EmptyMilestone { .. } => self.fixed.get(&Context::EmptyMilestone).copied(),
            PreToken::EndMilestoneMarker => self.fixed.get(&Context::EndMilestoneMarker).copied(),
            PreToken::Printable(_) => self.fixed.get(&Context::Printable).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::pretoken::TagName;

    fn table() -> TagTable {
        TagTable::new(&CustomTags::default()).unwrap()
    }

    fn start(name: &str) -> PreToken {
        PreToken::StartTag(TagName::new(name, ""))
    }

    #[test]
    fn test_core_lookups() {
        let t = table();
        assert_eq!(t.lookup(&start("p")), Some(Behavior::Paragraph));
        assert_eq!(t.lookup(&start("toc")), Some(Behavior::Header));
        assert_eq!(
            t.lookup(&start("f")),
            Some(Behavior::Note {
                sequence: "footnote"
            })
        );
        assert_eq!(
            t.lookup(&PreToken::EndTag(TagName::new("x", ""))),
            Some(Behavior::EndDigression)
        );
        assert_eq!(t.lookup(&PreToken::EndTag(TagName::new("bd", ""))), None);
        assert_eq!(
            t.lookup(&PreToken::verses("1")),
            Some(Behavior::Verses)
        );
    }

    #[test]
    fn test_milestone_edges() {
        let t = table();
        let s = PreToken::StartMilestone {
            name: "qt".to_string(),
            edge: MilestoneEdge::Start,
        };
        let e = PreToken::StartMilestone {
            name: "qt".to_string(),
            edge: MilestoneEdge::End,
        };
        assert_eq!(t.lookup(&s), Some(Behavior::MilestoneStart));
        assert_eq!(t.lookup(&e), None);
    }

    #[test]
    fn test_custom_tags() {
        let custom = CustomTags {
            heading: vec!["zh".to_string()],
            word: vec!["zw".to_string()],
            ..CustomTags::default()
        };
        let t = TagTable::new(&custom).unwrap();
        assert_eq!(t.lookup(&start("zh")), Some(Behavior::Heading));
        assert_eq!(t.lookup(&start("zw")), Some(Behavior::SpanWithAtts));

        let clash = CustomTags {
            paragraph: vec!["bd".to_string()],
            ..CustomTags::default()
        };
        assert!(TagTable::new(&clash).is_err());
    }

    #[test]
    fn test_descriptors() {
        let d = Behavior::Heading.descriptor();
        assert_eq!(d.base, Some(BaseTarget::Named("heading")));
        assert!(d.force_new_sequence && d.new_block);
        let d = Behavior::Note {
            sequence: "xref",
        }
        .descriptor();
        assert_eq!(d.inline, Some("xref"));
        assert_eq!(d.scopes[0].label, "inline/$fullTagName$");
        assert!(Behavior::Paragraph.descriptor().scopes.is_empty());
    }
}

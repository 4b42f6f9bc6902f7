//! Per-docSet string interning.
//!
//! Each category is a table of counted strings; a code is the position of a
//! string in its table. Building is two-phase: values are first recorded
//! into a staging map with frequencies, then frozen into the tables. Codes
//! are stable until a rehash.

use crate::error::{LookupError, Result, StructuralError};
use crate::utils::ByteArray;
use regex::Regex;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnumCategory {
    Ids,
    WordLike,
    NotWordLike,
    ScopeBits,
    GraftTypes,
}

impl EnumCategory {
    pub const ALL: [EnumCategory; 5] = [
        EnumCategory::Ids,
        EnumCategory::WordLike,
        EnumCategory::NotWordLike,
        EnumCategory::ScopeBits,
        EnumCategory::GraftTypes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EnumCategory::Ids => "ids",
            EnumCategory::WordLike => "wordLike",
            EnumCategory::NotWordLike => "notWordLike",
            EnumCategory::ScopeBits => "scopeBits",
            EnumCategory::GraftTypes => "graftTypes",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone)]
struct PreEnumEntry {
    value: String,
    frequency: u32,
}

/// Insertion-ordered staging map for one category
#[derive(Debug, Clone, Default)]
struct PreEnum {
    lookup: FxHashMap<String, usize>,
    entries: Vec<PreEnumEntry>,
}

impl PreEnum {
    fn record(&mut self, value: &str, frequency: u32) {
        match self.lookup.get(value) {
            Some(&i) => self.entries[i].frequency += frequency,
            None => {
                self.lookup.insert(value.to_string(), self.entries.len());
                self.entries.push(PreEnumEntry {
                    value: value.to_string(),
                    frequency,
                });
            }
        }
    }

    fn sort(&mut self) {
        // stable: ties keep insertion order
        self.entries.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        self.lookup = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.value.clone(), i))
            .collect();
    }
}

/// The five enum tables of a docSet
#[derive(Debug, Clone, Default)]
pub struct EnumDictionary {
    tables: [ByteArray; 5],
    offsets: [Vec<u32>; 5],
    pre_enums: Option<Box<[PreEnum; 5]>>,
}

impl EnumDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted tables
    pub fn from_tables(tables: [ByteArray; 5]) -> Result<Self> {
        let mut dict = Self {
            tables,
            ..Self::default()
        };
        for category in EnumCategory::ALL {
            dict.build_enum_index(category)?;
        }
        Ok(dict)
    }

    pub fn table(&self, category: EnumCategory) -> &ByteArray {
        &self.tables[category.slot()]
    }

    /// Number of codes in a category
    pub fn len(&self, category: EnumCategory) -> usize {
        self.offsets[category.slot()].len()
    }

    pub fn is_empty(&self, category: EnumCategory) -> bool {
        self.len(category) == 0
    }

    pub fn has_pre_enums(&self) -> bool {
        self.pre_enums.is_some()
    }

    /// Stage every existing table value with frequency 0
    pub fn build_pre_enums(&mut self) -> Result<()> {
        let mut staged: Box<[PreEnum; 5]> = Box::default();
        for category in EnumCategory::ALL {
            for value in self.values(category)? {
                staged[category.slot()].record(value, 0);
            }
        }
        self.pre_enums = Some(staged);
        Ok(())
    }

    pub fn maybe_build_pre_enums(&mut self) -> Result<()> {
        if self.pre_enums.is_none() {
            self.build_pre_enums()?;
        }
        Ok(())
    }

    /// Start a staging area with no entries at all
    pub fn build_empty_pre_enums(&mut self) {
        self.pre_enums = Some(Box::default());
    }

    pub fn clear_pre_enums(&mut self) {
        self.pre_enums = None;
    }

    fn staged_mut(&mut self, category: EnumCategory) -> Result<&mut PreEnum> {
        match self.pre_enums.as_deref_mut() {
            Some(staged) => Ok(&mut staged[category.slot()]),
            None => Err(LookupError::UnknownCategory(category.name().to_string()).into()),
        }
    }

    pub fn record_pre_enum(&mut self, category: EnumCategory, value: &str) -> Result<()> {
        self.staged_mut(category)?.record(value, 1);
        Ok(())
    }

    /// Reassign staged codes by descending frequency
    pub fn sort_pre_enums(&mut self) {
        if let Some(staged) = self.pre_enums.as_deref_mut() {
            for pre in staged.iter_mut() {
                pre.sort();
            }
        }
    }

    /// Freeze staged values into the tables, in staging order
    pub fn build_enums(&mut self) -> Result<()> {
        let Some(staged) = self.pre_enums.as_deref() else {
            return Err(LookupError::UnknownCategory("*".to_string()).into());
        };
        let mut tables: [ByteArray; 5] = Default::default();
        for category in EnumCategory::ALL {
            let table = &mut tables[category.slot()];
            for entry in &staged[category.slot()].entries {
                table.push_counted_string(&entry.value)?;
            }
            table.trim();
        }
        self.tables = tables;
        for category in EnumCategory::ALL {
            self.build_enum_index(category)?;
        }
        Ok(())
    }

    fn build_enum_index(&mut self, category: EnumCategory) -> Result<()> {
        let table = &self.tables[category.slot()];
        let mut offsets = Vec::new();
        let mut pos = 0;
        while pos < table.len() {
            offsets.push(pos as u32);
            pos += table.byte(pos)? as usize + 1;
        }
        if pos != table.len() {
            return Err(StructuralError::CorruptBytes {
                pos,
                reason: format!("enum table '{}' truncated", category.name()),
            }
            .into());
        }
        self.offsets[category.slot()] = offsets;
        Ok(())
    }

    /// Code for a value; with `add_if_missing` unseen values are appended
    pub fn code_for(
        &mut self,
        category: EnumCategory,
        value: &str,
        add_if_missing: bool,
    ) -> Result<u32> {
        let staged = self.staged_mut(category)?;
        if let Some(&code) = staged.lookup.get(value) {
            return Ok(code as u32);
        }
        if !add_if_missing {
            return Err(LookupError::UnknownValue {
                category: category.name().to_string(),
                value: value.to_string(),
            }
            .into());
        }
        let code = staged.entries.len();
        staged.record(value, 0);
        let table = &mut self.tables[category.slot()];
        let offset = table.len() as u32;
        table.push_counted_string(value)?;
        self.offsets[category.slot()].push(offset);
        Ok(code as u32)
    }

    /// Lookup without staging; scans the table when nothing is staged
    pub fn code_of(&self, category: EnumCategory, value: &str) -> Option<u32> {
        if let Some(staged) = self.pre_enums.as_deref() {
            return staged[category.slot()]
                .lookup
                .get(value)
                .map(|&c| c as u32);
        }
        let table = &self.tables[category.slot()];
        self.offsets[category.slot()]
            .iter()
            .position(|&off| table.counted_str(off as usize).is_ok_and(|s| s == value))
            .map(|p| p as u32)
    }

    pub fn string_for(&self, category: EnumCategory, code: u32) -> Result<&str> {
        let offset = self.offsets[category.slot()]
            .get(code as usize)
            .ok_or_else(|| LookupError::UnknownCode {
                category: category.name().to_string(),
                code,
            })?;
        Ok(self.tables[category.slot()].counted_str(*offset as usize)?)
    }

    pub fn values(&self, category: EnumCategory) -> Result<Vec<&str>> {
        let table = &self.tables[category.slot()];
        let mut values = Vec::with_capacity(self.len(category));
        let mut pos = 0;
        while pos < table.len() {
            let s = table.counted_str(pos)?;
            pos += s.len() + 1;
            values.push(s);
        }
        Ok(values)
    }

    /// Codes whose string matches a pattern
    pub fn codes_matching(&self, category: EnumCategory, pattern: &Regex) -> Result<Vec<u32>> {
        Ok(self
            .values(category)?
            .into_iter()
            .enumerate()
            .filter(|(_, v)| pattern.is_match(v))
            .map(|(i, _)| i as u32)
            .collect())
    }

    /// Old code to new code per category, `None` where the value is gone
    pub fn code_map_to(&self, fresh: &EnumDictionary) -> Result<CodeMap> {
        let mut map = CodeMap::default();
        for category in EnumCategory::ALL {
            map.codes[category.slot()] = self
                .values(category)?
                .into_iter()
                .map(|v| fresh.code_of(category, v))
                .collect();
        }
        Ok(map)
    }
}

/// Translation table produced by a rehash
#[derive(Debug, Clone, Default)]
pub struct CodeMap {
    codes: [Vec<Option<u32>>; 5],
}

impl CodeMap {
    pub fn get(&self, category: EnumCategory, old: u32) -> Option<u32> {
        self.codes[category.slot()]
            .get(old as usize)
            .copied()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged() -> EnumDictionary {
        let mut d = EnumDictionary::new();
        d.build_pre_enums().unwrap();
        d
    }

    #[test]
    fn test_record_without_staging_fails() {
        let mut d = EnumDictionary::new();
        let err = d.record_pre_enum(EnumCategory::WordLike, "in").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Lookup(LookupError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_sort_by_frequency_stable() {
        let mut d = staged();
        for w in ["the", "beginning", "the", "God", "the", "God", "created"] {
            d.record_pre_enum(EnumCategory::WordLike, w).unwrap();
        }
        d.sort_pre_enums();
        d.build_enums().unwrap();
        let values = d.values(EnumCategory::WordLike).unwrap();
        assert_eq!(values, vec!["the", "God", "beginning", "created"]);
        assert_eq!(d.string_for(EnumCategory::WordLike, 2).unwrap(), "beginning");
    }

    #[test]
    fn test_code_for_unknown_value() {
        let mut d = staged();
        d.record_pre_enum(EnumCategory::ScopeBits, "1").unwrap();
        d.build_enums().unwrap();
        assert_eq!(d.code_for(EnumCategory::ScopeBits, "1", false).unwrap(), 0);
        assert!(matches!(
            d.code_for(EnumCategory::ScopeBits, "2", false),
            Err(crate::Error::Lookup(LookupError::UnknownValue { .. }))
        ));
    }

    #[test]
    fn test_code_for_adds_without_sorting() {
        let mut d = staged();
        d.record_pre_enum(EnumCategory::WordLike, "a").unwrap();
        d.record_pre_enum(EnumCategory::WordLike, "b").unwrap();
        d.build_enums().unwrap();
        let c = d.code_for(EnumCategory::WordLike, "zzz", true).unwrap();
        assert_eq!(c, 2);
        assert_eq!(d.string_for(EnumCategory::WordLike, c).unwrap(), "zzz");
        assert_eq!(d.code_for(EnumCategory::WordLike, "zzz", false).unwrap(), 2);
        assert_eq!(d.len(EnumCategory::WordLike), 3);
    }

    #[test]
    fn test_codes_stable_across_rebuild() {
        let mut d = staged();
        for w in ["x", "y", "y"] {
            d.record_pre_enum(EnumCategory::WordLike, w).unwrap();
        }
        d.sort_pre_enums();
        d.build_enums().unwrap();
        d.clear_pre_enums();
        let before = d.code_of(EnumCategory::WordLike, "x");

        // a second import appends without re-sorting
        d.build_pre_enums().unwrap();
        for w in ["z", "z", "z", "x"] {
            d.record_pre_enum(EnumCategory::WordLike, w).unwrap();
        }
        d.build_enums().unwrap();
        d.clear_pre_enums();
        assert_eq!(d.code_of(EnumCategory::WordLike, "x"), before);
        assert_eq!(d.code_of(EnumCategory::WordLike, "z"), Some(2));
    }

    #[test]
    fn test_code_map() {
        let mut old = staged();
        for w in ["a", "b", "c"] {
            old.record_pre_enum(EnumCategory::WordLike, w).unwrap();
        }
        old.build_enums().unwrap();
        old.clear_pre_enums();

        let mut fresh = EnumDictionary::new();
        fresh.build_empty_pre_enums();
        for w in ["c", "a", "c"] {
            fresh.record_pre_enum(EnumCategory::WordLike, w).unwrap();
        }
        fresh.sort_pre_enums();
        fresh.build_enums().unwrap();

        let map = old.code_map_to(&fresh).unwrap();
        assert_eq!(map.get(EnumCategory::WordLike, 0), Some(1));
        assert_eq!(map.get(EnumCategory::WordLike, 1), None);
        assert_eq!(map.get(EnumCategory::WordLike, 2), Some(0));
    }

    #[test]
    fn test_from_tables() {
        let mut d = staged();
        d.record_pre_enum(EnumCategory::Ids, "main1").unwrap();
        d.build_enums().unwrap();
        let tables = EnumCategory::ALL.map(|c| d.table(c).clone());
        let restored = EnumDictionary::from_tables(tables).unwrap();
        assert_eq!(restored.string_for(EnumCategory::Ids, 0).unwrap(), "main1");
        assert_eq!(restored.code_of(EnumCategory::Ids, "main1"), Some(0));
    }
}

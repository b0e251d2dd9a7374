//! Column type inference.
//!
//! Runs once per file over a buffered sample. A column gets a scored type
//! when its header names the type (through the alias table or a keyword)
//! and enough sampled values clean successfully as that type. Types are
//! tried in priority order PHONE → DATE → ADDRESS → NUMBER; anything else
//! is TEXT.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::clean::{is_blank, matches_type};
use crate::config::InferenceConfig;
use crate::models::{ColumnType, ColumnTypeMap, RawRow};

// =============================================================================
// Header aliases
// =============================================================================

/// Well-known logical field a header can stand for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalField {
    Name,
    Phone,
    Address,
    Date,
}

impl CanonicalField {
    /// Type suggested by the header alone.
    pub fn type_hint(&self) -> ColumnType {
        match self {
            CanonicalField::Name => ColumnType::Text,
            CanonicalField::Phone => ColumnType::Phone,
            CanonicalField::Address => ColumnType::Address,
            CanonicalField::Date => ColumnType::Date,
        }
    }
}

/// Exact header spelling → canonical field, matched case-insensitively.
#[derive(Debug, Clone)]
pub struct AliasTable {
    aliases: HashMap<String, CanonicalField>,
}

const STANDARD_ALIASES: &[(&str, CanonicalField)] = &[
    ("姓名", CanonicalField::Name),
    ("名字", CanonicalField::Name),
    ("name", CanonicalField::Name),
    ("full name", CanonicalField::Name),
    ("手机号码", CanonicalField::Phone),
    ("手机号", CanonicalField::Phone),
    ("手机", CanonicalField::Phone),
    ("电话", CanonicalField::Phone),
    ("联系电话", CanonicalField::Phone),
    ("phone", CanonicalField::Phone),
    ("mobile", CanonicalField::Phone),
    ("tel", CanonicalField::Phone),
    ("地址", CanonicalField::Address),
    ("住址", CanonicalField::Address),
    ("家庭住址", CanonicalField::Address),
    ("address", CanonicalField::Address),
    ("入职日期", CanonicalField::Date),
    ("日期", CanonicalField::Date),
    ("出生日期", CanonicalField::Date),
    ("date", CanonicalField::Date),
];

static STANDARD_TABLE: Lazy<AliasTable> = Lazy::new(AliasTable::standard);

impl AliasTable {
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Built-in spellings for name, phone, address and date columns.
    pub fn standard() -> Self {
        STANDARD_ALIASES
            .iter()
            .fold(Self::empty(), |table, (alias, field)| table.with_alias(alias, *field))
    }

    pub fn with_alias(mut self, alias: &str, field: CanonicalField) -> Self {
        self.aliases.insert(normalize_header(alias), field);
        self
    }

    pub fn resolve(&self, header: &str) -> Option<CanonicalField> {
        self.aliases.get(&normalize_header(header)).copied()
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        STANDARD_TABLE.clone()
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

// =============================================================================
// Header keywords
// =============================================================================

const PHONE_KEYWORDS: &[&str] = &["phone", "mobile", "tel", "cell", "电话", "手机", "联系方式", "号码"];
const DATE_KEYWORDS: &[&str] = &["date", "time", "day", "birthday", "日期", "时间", "生日"];
const ADDRESS_KEYWORDS: &[&str] = &["address", "addr", "location", "地址", "住址", "地点"];
const NUMBER_KEYWORDS: &[&str] = &[
    "amount", "price", "qty", "quantity", "count", "total", "salary", "age", "score", "金额", "数量", "价格",
    "工资", "年龄", "分数",
];

fn keywords(column_type: ColumnType) -> &'static [&'static str] {
    match column_type {
        ColumnType::Phone => PHONE_KEYWORDS,
        ColumnType::Date => DATE_KEYWORDS,
        ColumnType::Address => ADDRESS_KEYWORDS,
        ColumnType::Number => NUMBER_KEYWORDS,
        ColumnType::Text => &[],
    }
}

/// Whether the header names `column_type`, by alias or by keyword.
fn header_matches(header: &str, canonical: Option<CanonicalField>, column_type: ColumnType) -> bool {
    if canonical.map(|c| c.type_hint()) == Some(column_type) {
        return true;
    }
    let lower = normalize_header(header);
    keywords(column_type).iter().any(|kw| lower.contains(kw))
}

// =============================================================================
// Inference
// =============================================================================

/// What inference saw for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub column: String,
    pub canonical: Option<CanonicalField>,
    pub inferred: ColumnType,
    /// Rows in the sample.
    pub sampled: usize,
    pub non_empty: usize,
    /// Share of non-empty values that clean as `inferred` (1.0 for TEXT).
    pub match_ratio: f64,
}

/// Frozen type map plus per-column evidence, in header order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceReport {
    pub type_map: ColumnTypeMap,
    pub profiles: Vec<ColumnProfile>,
}

impl InferenceReport {
    pub fn profile(&self, column: &str) -> Option<&ColumnProfile> {
        self.profiles.iter().find(|p| p.column == column)
    }
}

/// Assigns one [`ColumnType`] per column from headers and a row sample.
#[derive(Debug, Clone, Default)]
pub struct ColumnInferencer {
    config: InferenceConfig,
    aliases: AliasTable,
}

impl ColumnInferencer {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            config,
            aliases: AliasTable::default(),
        }
    }

    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Infer every header's type. Pure: the same input gives the same report.
    pub fn infer(&self, headers: &[String], sample: &[RawRow]) -> InferenceReport {
        let profiles: Vec<ColumnProfile> = headers
            .iter()
            .map(|header| self.profile_column(header, sample))
            .collect();
        let type_map = profiles
            .iter()
            .map(|p| (p.column.clone(), p.inferred))
            .collect();
        InferenceReport { type_map, profiles }
    }

    fn profile_column(&self, header: &str, sample: &[RawRow]) -> ColumnProfile {
        let canonical = self.aliases.resolve(header);
        let values: Vec<_> = sample
            .iter()
            .filter_map(|row| row.fields.get(header))
            .filter(|v| !is_blank(v))
            .collect();

        let mut profile = ColumnProfile {
            column: header.to_string(),
            canonical,
            inferred: ColumnType::Text,
            sampled: sample.len(),
            non_empty: values.len(),
            match_ratio: 1.0,
        };
        if values.is_empty() {
            return profile;
        }

        for column_type in ColumnType::SCORED {
            if self.config.require_header_match && !header_matches(header, canonical, column_type) {
                continue;
            }
            let matched = values.iter().filter(|v| matches_type(column_type, v)).count();
            let ratio = matched as f64 / values.len() as f64;
            if ratio >= self.config.threshold(column_type) {
                profile.inferred = column_type;
                profile.match_ratio = ratio;
                return profile;
            }
        }
        profile
    }
}

/// Infer with the built-in alias table.
pub fn infer_column_types(headers: &[String], sample: &[RawRow], config: &InferenceConfig) -> InferenceReport {
    ColumnInferencer::new(config.clone()).infer(headers, sample)
}

//! Address parsing for mainland China, Hong Kong, Macau and Taiwan.
//!
//! An address is accepted when it starts with a province-level unit and
//! continues with at least a city- or district-level fragment. Anything
//! shallower is an "incomplete address".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::cell_text;
use crate::models::CleanResult;

/// Province-level unit: official name and common short form.
struct Province {
    full: &'static str,
    short: &'static str,
    kind: ProvinceKind,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ProvinceKind {
    Province,
    Municipality,
    AutonomousRegion,
    SpecialRegion,
}

const fn p(full: &'static str, short: &'static str, kind: ProvinceKind) -> Province {
    Province { full, short, kind }
}

static PROVINCES: [Province; 34] = [
    p("北京市", "北京", ProvinceKind::Municipality),
    p("天津市", "天津", ProvinceKind::Municipality),
    p("上海市", "上海", ProvinceKind::Municipality),
    p("重庆市", "重庆", ProvinceKind::Municipality),
    p("河北省", "河北", ProvinceKind::Province),
    p("山西省", "山西", ProvinceKind::Province),
    p("辽宁省", "辽宁", ProvinceKind::Province),
    p("吉林省", "吉林", ProvinceKind::Province),
    p("黑龙江省", "黑龙江", ProvinceKind::Province),
    p("江苏省", "江苏", ProvinceKind::Province),
    p("浙江省", "浙江", ProvinceKind::Province),
    p("安徽省", "安徽", ProvinceKind::Province),
    p("福建省", "福建", ProvinceKind::Province),
    p("江西省", "江西", ProvinceKind::Province),
    p("山东省", "山东", ProvinceKind::Province),
    p("河南省", "河南", ProvinceKind::Province),
    p("湖北省", "湖北", ProvinceKind::Province),
    p("湖南省", "湖南", ProvinceKind::Province),
    p("广东省", "广东", ProvinceKind::Province),
    p("海南省", "海南", ProvinceKind::Province),
    p("四川省", "四川", ProvinceKind::Province),
    p("贵州省", "贵州", ProvinceKind::Province),
    p("云南省", "云南", ProvinceKind::Province),
    p("陕西省", "陕西", ProvinceKind::Province),
    p("甘肃省", "甘肃", ProvinceKind::Province),
    p("青海省", "青海", ProvinceKind::Province),
    p("台湾省", "台湾", ProvinceKind::Province),
    p("内蒙古自治区", "内蒙古", ProvinceKind::AutonomousRegion),
    p("广西壮族自治区", "广西", ProvinceKind::AutonomousRegion),
    p("西藏自治区", "西藏", ProvinceKind::AutonomousRegion),
    p("宁夏回族自治区", "宁夏", ProvinceKind::AutonomousRegion),
    p("新疆维吾尔自治区", "新疆", ProvinceKind::AutonomousRegion),
    p("香港特别行政区", "香港", ProvinceKind::SpecialRegion),
    p("澳门特别行政区", "澳门", ProvinceKind::SpecialRegion),
];

/// Suffixes tolerated after a short province name ("广西自治区", "广东省").
const SHORT_SUFFIXES: [&str; 3] = ["自治区", "省", "市"];

static CITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^省市区县\s]{1,12}?(?:自治州|地区|市|盟))").expect("valid regex"));
static DISTRICT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^省市区县\s]{1,12}?(?:区|县|市|旗))").expect("valid regex"));

/// Parsed address. For municipalities and special regions `city` repeats
/// the province name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressParts {
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail: String,
}

impl AddressParts {
    pub fn is_empty(&self) -> bool {
        self.province.is_empty() && self.city.is_empty() && self.district.is_empty() && self.detail.is_empty()
    }
}

impl fmt::Display for AddressParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.province)?;
        if self.city != self.province {
            f.write_str(&self.city)?;
        }
        f.write_str(&self.district)?;
        f.write_str(&self.detail)
    }
}

/// Parse a free-text address cell.
pub fn clean_address(value: &Value) -> CleanResult<AddressParts> {
    let raw = match cell_text(value) {
        Ok(Some(raw)) => raw,
        Ok(None) => return CleanResult::success(AddressParts::default()),
        Err(e) => return CleanResult::failure(e),
    };

    match parse_address(&raw) {
        Ok(parts) => CleanResult::success(parts),
        Err(e) => CleanResult::failure(e),
    }
}

fn parse_address(raw: &str) -> Result<AddressParts, String> {
    let compact = raw.trim();
    let compact = compact.strip_prefix("中国").unwrap_or(compact).trim_start();

    let (province, rest) = match_province(compact)
        .ok_or_else(|| format!("incomplete address: no province-level region in '{}'", raw))?;
    let mut rest = rest.trim_start();

    let mut parts = AddressParts {
        province: province.full.to_string(),
        ..AddressParts::default()
    };

    match province.kind {
        ProvinceKind::Municipality | ProvinceKind::SpecialRegion => {
            parts.city = province.full.to_string();
            // "北京市北京市朝阳区" style repetition
            rest = rest.strip_prefix(province.full).unwrap_or(rest).trim_start();
        }
        ProvinceKind::Province | ProvinceKind::AutonomousRegion => {
            if let Some(m) = CITY_RE.find(rest) {
                parts.city = m.as_str().to_string();
                rest = rest[m.end()..].trim_start();
            }
        }
    }

    if let Some(m) = DISTRICT_RE.find(rest) {
        parts.district = m.as_str().to_string();
        rest = rest[m.end()..].trim_start();
    }

    let has_depth = match province.kind {
        ProvinceKind::Municipality | ProvinceKind::SpecialRegion => !parts.district.is_empty(),
        ProvinceKind::Province | ProvinceKind::AutonomousRegion => {
            !parts.city.is_empty() || !parts.district.is_empty()
        }
    };
    if !has_depth {
        return Err(format!(
            "incomplete address: '{}' has no city or district after {}",
            raw, parts.province
        ));
    }

    parts.detail = rest.split_whitespace().collect::<Vec<_>>().join("");
    Ok(parts)
}

/// Match a province at the start of `text`, returning it and the remainder.
fn match_province(text: &str) -> Option<(&'static Province, &str)> {
    for province in PROVINCES.iter() {
        if let Some(rest) = text.strip_prefix(province.full) {
            return Some((province, rest));
        }
    }
    for province in PROVINCES.iter() {
        if let Some(rest) = text.strip_prefix(province.short) {
            let rest = SHORT_SUFFIXES
                .iter()
                .find_map(|suffix| rest.strip_prefix(suffix))
                .unwrap_or(rest);
            return Some((province, rest));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: &str) -> AddressParts {
        match clean_address(&json!(raw)) {
            CleanResult::Success { value } => value,
            CleanResult::Failure { error } => panic!("{raw}: {error}"),
        }
    }

    fn error(raw: &str) -> String {
        clean_address(&json!(raw)).error().map(str::to_string).unwrap_or_default()
    }

    #[test]
    fn test_full_province_address() {
        let parts = parse("广东省深圳市南山区科技园路1号");
        assert_eq!(parts.province, "广东省");
        assert_eq!(parts.city, "深圳市");
        assert_eq!(parts.district, "南山区");
        assert_eq!(parts.detail, "科技园路1号");
        assert_eq!(parts.to_string(), "广东省深圳市南山区科技园路1号");
    }

    #[test]
    fn test_short_province_and_spaces() {
        let parts = parse("广东 深圳市 南山区 科技园路 1号");
        assert_eq!(parts.province, "广东省");
        assert_eq!(parts.to_string(), "广东省深圳市南山区科技园路1号");
    }

    #[test]
    fn test_municipality() {
        let parts = parse("北京市朝阳区建国路88号");
        assert_eq!(parts.province, "北京市");
        assert_eq!(parts.city, "北京市");
        assert_eq!(parts.district, "朝阳区");
        assert_eq!(parts.to_string(), "北京市朝阳区建国路88号");

        let repeated = parse("上海上海市浦东新区世纪大道100号");
        assert_eq!(repeated.district, "浦东新区");
    }

    #[test]
    fn test_autonomous_region() {
        let parts = parse("广西南宁市青秀区民族大道");
        assert_eq!(parts.province, "广西壮族自治区");
        assert_eq!(parts.city, "南宁市");
        let parts = parse("新疆维吾尔自治区乌鲁木齐市天山区");
        assert_eq!(parts.district, "天山区");
    }

    #[test]
    fn test_prefecture_and_county() {
        let parts = parse("四川省凉山彝族自治州西昌市");
        assert_eq!(parts.city, "凉山彝族自治州");
        assert_eq!(parts.district, "西昌市");
    }

    #[test]
    fn test_country_prefix() {
        assert_eq!(parse("中国浙江省杭州市西湖区").province, "浙江省");
    }

    #[test]
    fn test_incomplete_addresses() {
        assert!(error("广东省").contains("incomplete address"));
        assert!(error("北京市").contains("incomplete address"));
        assert!(error("科技园路1号").contains("incomplete address"));
        assert!(error("广东省科技园路1号").contains("incomplete address"));
    }

    #[test]
    fn test_empty() {
        assert!(parse("").is_empty());
    }
}

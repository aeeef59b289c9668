//! Country labels and flag rendering

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Flag CDN used by [`FlagStyle::ImageUrl`] when none is configured
pub const DEFAULT_FLAG_CDN: &str = "https://flagcdn.com/24x18";

/// Emoji returned when no valid country code is available
pub const PLACEHOLDER_FLAG: &str = "🌐";

/// Label used for addresses whose country could not be determined
pub const UNKNOWN_LABEL: &str = "全球";

/// (ISO code, English name, localized label)
const COUNTRIES: &[(&str, &str, &str)] = &[
    ("US", "United States", "美国"),
    ("CA", "Canada", "加拿大"),
    ("MX", "Mexico", "墨西哥"),
    ("BR", "Brazil", "巴西"),
    ("AR", "Argentina", "阿根廷"),
    ("CL", "Chile", "智利"),
    ("GB", "United Kingdom", "英国"),
    ("IE", "Ireland", "爱尔兰"),
    ("FR", "France", "法国"),
    ("DE", "Germany", "德国"),
    ("NL", "Netherlands", "荷兰"),
    ("BE", "Belgium", "比利时"),
    ("CH", "Switzerland", "瑞士"),
    ("AT", "Austria", "奥地利"),
    ("IT", "Italy", "意大利"),
    ("ES", "Spain", "西班牙"),
    ("PT", "Portugal", "葡萄牙"),
    ("SE", "Sweden", "瑞典"),
    ("NO", "Norway", "挪威"),
    ("FI", "Finland", "芬兰"),
    ("DK", "Denmark", "丹麦"),
    ("PL", "Poland", "波兰"),
    ("CZ", "Czechia", "捷克"),
    ("RO", "Romania", "罗马尼亚"),
    ("UA", "Ukraine", "乌克兰"),
    ("RU", "Russia", "俄罗斯"),
    ("TR", "Turkey", "土耳其"),
    ("IL", "Israel", "以色列"),
    ("AE", "United Arab Emirates", "阿联酋"),
    ("SA", "Saudi Arabia", "沙特阿拉伯"),
    ("IN", "India", "印度"),
    ("CN", "China", "中国"),
    ("HK", "Hong Kong", "香港"),
    ("MO", "Macao", "澳门"),
    ("TW", "Taiwan", "台湾"),
    ("JP", "Japan", "日本"),
    ("KR", "South Korea", "韩国"),
    ("SG", "Singapore", "新加坡"),
    ("MY", "Malaysia", "马来西亚"),
    ("TH", "Thailand", "泰国"),
    ("VN", "Vietnam", "越南"),
    ("PH", "Philippines", "菲律宾"),
    ("ID", "Indonesia", "印度尼西亚"),
    ("AU", "Australia", "澳大利亚"),
    ("NZ", "New Zealand", "新西兰"),
    ("ZA", "South Africa", "南非"),
    ("EG", "Egypt", "埃及"),
    ("NG", "Nigeria", "尼日利亚"),
];

/// Lookup keyed by uppercased ISO code and by uppercased English name
static LABELS: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(COUNTRIES.len() * 2);
    for (code, name, label) in COUNTRIES {
        map.insert(code.to_string(), *label);
        map.insert(name.to_uppercase(), *label);
    }
    // Aliases some providers use
    map.insert("UNITED STATES OF AMERICA".to_string(), "美国");
    map.insert("KOREA, REPUBLIC OF".to_string(), "韩国");
    map.insert("RUSSIAN FEDERATION".to_string(), "俄罗斯");
    map.insert("THE NETHERLANDS".to_string(), "荷兰");
    map
});

/// Map an ISO code or English country name to the localized label.
///
/// Unmapped identifiers are returned unchanged.
pub fn localized_label(identifier: &str) -> String {
    let key = identifier.trim().to_uppercase();
    match LABELS.get(&key) {
        Some(label) => label.to_string(),
        None => identifier.trim().to_string(),
    }
}

/// English name for an ISO code, if known
pub fn english_name(code: &str) -> Option<&'static str> {
    let code = code.trim().to_uppercase();
    COUNTRIES
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, name, _)| *name)
}

/// ISO code for an English country name, if known
pub fn code_for_name(name: &str) -> Option<&'static str> {
    let name = name.trim();
    COUNTRIES
        .iter()
        .find(|(_, n, _)| n.eq_ignore_ascii_case(name))
        .map(|(code, _, _)| *code)
}

/// Validated uppercase two-letter code
fn normalize_code(code: Option<&str>) -> Option<[u8; 2]> {
    let bytes = code?.trim().as_bytes();
    match bytes {
        [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
            Some([a.to_ascii_uppercase(), b.to_ascii_uppercase()])
        }
        _ => None,
    }
}

/// Flag emoji built from two regional indicator symbols
pub fn flag_emoji(code: Option<&str>) -> String {
    let Some(letters) = normalize_code(code) else {
        return PLACEHOLDER_FLAG.to_string();
    };
    letters
        .iter()
        .filter_map(|&c| char::from_u32(0x1F1E6 + u32::from(c - b'A')))
        .collect()
}

/// Flag image URL on `cdn`, keyed by the lowercased code
pub fn flag_image_url(cdn: &str, code: Option<&str>) -> String {
    let cdn = cdn.trim_end_matches('/');
    match normalize_code(code) {
        Some([a, b]) => format!(
            "{}/{}{}.png",
            cdn,
            char::from(a).to_ascii_lowercase(),
            char::from(b).to_ascii_lowercase()
        ),
        None => format!("{}/un.png", cdn),
    }
}

/// How the flag column of a report is rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FlagStyle {
    #[default]
    Emoji,
    ImageUrl(String),
    /// Use the localized country label in place of a flag
    Label,
}

impl FlagStyle {
    pub fn image(cdn: impl Into<String>) -> Self {
        FlagStyle::ImageUrl(cdn.into())
    }

    /// Render the flag for `code`
    pub fn render(&self, code: Option<&str>) -> String {
        match self {
            FlagStyle::Emoji => flag_emoji(code),
            FlagStyle::ImageUrl(cdn) => flag_image_url(cdn, code),
            FlagStyle::Label => match normalize_code(code) {
                Some(_) => code.map(localized_label).unwrap_or_default(),
                None => UNKNOWN_LABEL.to_string(),
            },
        }
    }
}

//! Field Normalizer - deterministic cleanup of months, years, companies and strings
//!
//! These rules run before name correction and completeness scoring. Everything
//! here is a pure function of its input plus fixed tables; nothing touches the
//! registry or the warehouse.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::record::{RawServiceGroup, ServiceLine};

/// Sentinel the extractor and the company aliaser use for "no value"
pub const NA: &str = "N/A";

const MONTH_NAMES: [&str; 12] = [
    "JANUARY",
    "FEBRUARY",
    "MARCH",
    "APRIL",
    "MAY",
    "JUNE",
    "JULY",
    "AUGUST",
    "SEPTEMBER",
    "OCTOBER",
    "NOVEMBER",
    "DECEMBER",
];

/// Company alias table: case-insensitive keyword, first match wins.
/// Order matters; more specific aliases come before their prefixes.
const COMPANY_ALIASES: [(&str, &str); 6] = [
    ("AE3", "AE3 Excavating"),
    ("AES", "AE3 Excavating"),
    ("AEON", "Aeon Landscaping"),
    ("ADEO", "ADEO Contracting"),
    ("ADO", "ADEO Contracting"),
    ("ANTHONY", "ANTHONY'S EXCAVATING & GRADING"),
];

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref PHASE_BOILERPLATE: Regex = Regex::new(r"(?i)project\s*/\s*phase").unwrap();

    /// 3-letter, 4-letter and full spellings of the twelve months
    static ref MONTHS: HashMap<String, &'static str> = {
        let mut m = HashMap::new();
        for name in MONTH_NAMES {
            m.insert(name.to_string(), name);
            m.insert(name[..3].to_string(), name);
            if name.len() > 4 {
                m.insert(name[..4].to_string(), name);
            }
        }
        m
    };
}

/// Trim and collapse internal whitespace, case preserved.
pub fn clean_text(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").to_string()
}

/// Cleanup for fields treated as categorical keys (builder, company).
pub fn clean_categorical(s: &str) -> String {
    clean_text(s).to_uppercase()
}

/// Project names keep their case but lose `Project/Phase` boilerplate;
/// `PH <n>` phase segments survive.
pub fn clean_project_name(s: &str) -> String {
    let stripped = PHASE_BOILERPLATE.replace_all(s, " ");
    clean_text(&stripped)
}

/// True when a value is empty or the extractor's "N/A" placeholder.
pub fn is_absent(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(s) => {
            let t = s.trim();
            t.is_empty() || t.eq_ignore_ascii_case(NA)
        }
    }
}

/// Result of month normalization
#[derive(Clone, Debug, PartialEq)]
pub struct MonthNorm {
    /// Canonical full month name, or the uppercased input if unrecognized
    pub value: String,
    /// Set when the input was outside the known month table
    pub uncertain: bool,
}

/// Normalize a month string against the fixed abbreviation table.
/// Inputs outside the table pass through uppercased and flagged.
pub fn normalize_month(raw: Option<&str>) -> Option<MonthNorm> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(NA) {
        return None;
    }
    let key = raw.to_uppercase();
    match MONTHS.get(&key) {
        Some(full) => Some(MonthNorm {
            value: (*full).to_string(),
            uncertain: false,
        }),
        None => Some(MonthNorm {
            value: key,
            uncertain: true,
        }),
    }
}

/// 1-based month number for a canonical full month name.
pub fn month_number(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|m| *m == name)
        .map(|i| i as u32 + 1)
}

/// Two-digit years are mapped into the configured century; values >= 100
/// pass through unchanged. Negative values are treated as absent.
pub fn normalize_year(raw: Option<i32>, century_base: i32) -> Option<i32> {
    match raw {
        Some(y) if y < 0 => None,
        Some(y) if y < 100 => Some(y + century_base),
        Some(y) => Some(y),
        None => None,
    }
}

/// Result of company standardization
#[derive(Clone, Debug, PartialEq)]
pub struct CompanyNorm {
    /// Standardized company name, or "N/A" when no alias matched
    pub standardized: String,
    pub matched: bool,
}

/// Standardize a company name via the keyword alias table. The caller keeps
/// the raw value for audit; unknown companies become the "N/A" sentinel.
pub fn standardize_company(raw: Option<&str>) -> CompanyNorm {
    let Some(raw) = raw else {
        return CompanyNorm {
            standardized: NA.to_string(),
            matched: false,
        };
    };
    let haystack = clean_categorical(raw);
    if haystack.is_empty() || haystack == NA {
        return CompanyNorm {
            standardized: NA.to_string(),
            matched: false,
        };
    }
    for (keyword, canonical) in COMPANY_ALIASES {
        if haystack.contains(keyword) {
            return CompanyNorm {
                standardized: (*canonical).to_string(),
                matched: true,
            };
        }
    }
    CompanyNorm {
        standardized: NA.to_string(),
        matched: false,
    }
}

/// Strip the unit suffixes the extractor leaves on hours values
/// ("8 each", "10/man") before numeric parsing.
pub fn clean_hours(value: &str) -> String {
    value
        .replace(" /each", "")
        .replace("/each", "")
        .replace(" each", "")
        .replace(" /man", "")
        .replace("/man", "")
        .replace(" man", "")
}

/// Lenient float parse: empty and "N/A" become None, as does anything
/// non-numeric.
pub fn safe_float(value: Option<&str>) -> Option<f64> {
    let v = value?.trim();
    if v.is_empty() || v.eq_ignore_ascii_case(NA) {
        return None;
    }
    v.parse::<f64>().ok()
}

/// Flatten raw service groups into one line per date entry, with hours
/// cleanup applied. Groups with an absent service type are dropped.
pub fn normalize_services(groups: &[RawServiceGroup]) -> Vec<ServiceLine> {
    let mut lines = Vec::new();
    for group in groups {
        let service_type = match group.service_type.as_deref() {
            Some(s) if !is_absent(Some(s)) => clean_text(s),
            _ => continue,
        };
        for entry in &group.entries {
            if is_absent(entry.date.as_deref())
                && is_absent(entry.quantity.as_deref())
                && is_absent(entry.hours.as_deref())
            {
                continue;
            }
            let hours = entry
                .hours
                .as_deref()
                .map(clean_hours)
                .and_then(|h| safe_float(Some(&h)));
            lines.push(ServiceLine {
                service_type: service_type.clone(),
                date: entry
                    .date
                    .as_deref()
                    .filter(|d| !is_absent(Some(d)))
                    .map(clean_text),
                quantity: safe_float(entry.quantity.as_deref()),
                hours,
            });
        }
    }
    lines
}

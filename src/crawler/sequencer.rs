//! Chapter sequencing
//!
//! Derives the canonical chapter number of a fetched page from its title.
//! Source titles are inconsistently formatted and the site occasionally skips
//! or repeats pages, so a number declared in the title always beats the
//! positional counter.

use regex::Regex;
use std::sync::LazyLock;

/// `第N章`, with N in Arabic (ASCII or full-width) or Chinese numerals
static CHAPTER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"第\s*([0-9０-９]+|[零〇一二两三四五六七八九十百千万]+)\s*章").unwrap()
});

/// Leading integer token followed by whitespace, e.g. `"123 Title"`
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([0-9]+)\s").unwrap());

/// Returns the chapter number for a page title
///
/// Resolution order:
/// 1. the `第N章` marker, if present and parseable
/// 2. a leading integer token at the very start of the title
/// 3. `fallback`, the caller's running counter
///
/// # Example
///
/// ```
/// use manov_ingest::derive_chapter_number;
///
/// assert_eq!(derive_chapter_number("第12章 风暴将至", 5), 12);
/// assert_eq!(derive_chapter_number("Prologue", 1), 1);
/// ```
pub fn derive_chapter_number(title: &str, fallback: u32) -> u32 {
    declared_chapter_number(title).unwrap_or(fallback)
}

/// Returns the number the title itself declares, if any
pub fn declared_chapter_number(title: &str) -> Option<u32> {
    if let Some(number) = CHAPTER_MARKER
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_marker_number(m.as_str()))
    {
        return Some(number);
    }

    LEADING_NUMBER
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn parse_marker_number(raw: &str) -> Option<u32> {
    if raw.chars().all(|c| arabic_digit(c).is_some()) {
        parse_arabic(raw)
    } else {
        parse_chinese_numeral(raw)
    }
}

fn arabic_digit(c: char) -> Option<u32> {
    match c {
        '0'..='9' => Some(c as u32 - '0' as u32),
        '０'..='９' => Some(c as u32 - '０' as u32),
        _ => None,
    }
}

fn parse_arabic(raw: &str) -> Option<u32> {
    raw.chars().try_fold(0u32, |acc, c| {
        acc.checked_mul(10)?.checked_add(arabic_digit(c)?)
    })
}

fn chinese_digit(c: char) -> Option<u64> {
    match c {
        '零' | '〇' => Some(0),
        '一' => Some(1),
        '二' | '两' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        _ => None,
    }
}

/// Parses Chinese numerals such as `十二`, `一百零五` or `一〇五`
fn parse_chinese_numeral(raw: &str) -> Option<u32> {
    if raw.is_empty() {
        return None;
    }

    // Positional form: digits only, no unit characters
    if !raw.chars().any(|c| matches!(c, '十' | '百' | '千' | '万')) {
        let value = raw.chars().try_fold(0u64, |acc, c| {
            acc.checked_mul(10)?.checked_add(chinese_digit(c)?)
        })?;
        return u32::try_from(value).ok();
    }

    let mut total: u64 = 0;
    let mut section: u64 = 0;
    let mut pending: Option<u64> = None;

    for c in raw.chars() {
        if let Some(digit) = chinese_digit(c) {
            pending = Some(digit);
            continue;
        }

        match c {
            '万' => {
                let part = section + pending.take().unwrap_or(0);
                total = total.checked_add(part.max(1).checked_mul(10_000)?)?;
                section = 0;
            }
            '十' | '百' | '千' => {
                let unit = match c {
                    '十' => 10,
                    '百' => 100,
                    _ => 1000,
                };
                // A bare unit (十二) counts as one of that unit
                section += pending.take().unwrap_or(1) * unit;
            }
            _ => return None,
        }
    }

    let value = total + section + pending.unwrap_or(0);
    u32::try_from(value).ok()
}

//! Sheet and file name sanitisation under Excel's 31-character limit.

use std::collections::HashSet;

/// Maximum length Excel accepts for a sheet name.
pub const MAX_SHEET_NAME: usize = 31;

const ILLEGAL: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

/// Cleans a raw value into a legal sheet name.
///
/// Trims whitespace, replaces control characters and `\ / : ? * [ ]` with
/// `_`, collapses internal whitespace runs to one space, truncates to 31
/// characters, and strips leading underscores. Empty input yields `Empty`;
/// input that sanitises away entirely yields `Sheet`.
pub fn sanitize(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "Empty".to_string();
    }

    let replaced: String = trimmed
        .chars()
        .map(|ch| {
            if ILLEGAL.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    let mut in_space = false;
    for ch in replaced.chars() {
        if ch.is_whitespace() {
            if !in_space {
                collapsed.push(' ');
            }
            in_space = true;
        } else {
            collapsed.push(ch);
            in_space = false;
        }
    }

    let truncated: String = collapsed.trim().chars().take(MAX_SHEET_NAME).collect();
    let stripped = truncated.trim_start_matches('_').to_string();
    if stripped.is_empty() {
        return "Sheet".to_string();
    }
    stripped
}

/// Makes `base` unique within `seen`, reserving the returned name.
///
/// Collisions are resolved by appending `_2`, `_3`, … and truncating the base
/// (never the suffix) so the result stays within `max_length`. Pass `None` to
/// disable truncation, which filesystem names use.
pub fn dedupe(base: &str, seen: &mut HashSet<String>, max_length: Option<usize>) -> String {
    let capped: String = match max_length {
        Some(max) => base.chars().take(max).collect(),
        None => base.to_string(),
    };
    if seen.insert(capped.clone()) {
        return capped;
    }

    let mut counter = 2u64;
    loop {
        let suffix = format!("_{counter}");
        let candidate = match max_length {
            Some(max) => {
                let room = max.saturating_sub(suffix.len());
                let core: String = capped.chars().take(room).collect();
                format!("{core}{suffix}")
            }
            None => format!("{capped}{suffix}"),
        };
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

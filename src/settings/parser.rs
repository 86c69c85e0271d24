//! Settings mini-language splitter.
//!
//! ```text
//! "all:heat_map; {1,2}:stalls ;{0,0}:{3,1}:execution"
//!     -> [["all","heat_map"], ["{1,2}","stalls"], ["{0,0}","{3,1}","execution"]]
//! ```
//!
//! No validation happens here. Each resolution pass checks the field count it
//! expects and skips entries that do not fit.

/// One `;`-separated entry split into its `:`-separated fields.
pub type SettingFields = Vec<String>;

/// Split a settings string into entries and fields.
///
/// All whitespace is removed first. Empty entries (`"a:b;;"`) are dropped.
pub fn parse_settings(settings: &str) -> Vec<SettingFields> {
    let compact: String = settings.chars().filter(|c| !c.is_whitespace()).collect();
    split_entries(&compact)
        .into_iter()
        .map(|entry| entry.split(':').map(str::to_string).collect())
        .collect()
}

/// Split a settings string into whole entries without splitting fields.
pub fn split_entries(settings: &str) -> Vec<&str> {
    settings.split(';').filter(|e| !e.is_empty()).collect()
}

/// Parse `{col,row}` into its two numbers.
///
/// Braces are optional; anything else, including out-of-range numbers,
/// yields `None`.
pub fn parse_tile_coords(field: &str) -> Option<(u8, u8)> {
    let inner = field.trim_start_matches('{').trim_end_matches('}');
    let (col, row) = inner.split_once(',')?;
    Some((col.parse().ok()?, row.parse().ok()?))
}

/// True when `field` is a plain unsigned integer.
pub fn is_integer(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit())
}

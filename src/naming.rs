//! Filename conventions.
//!
//! Source filenames double as a fallback for everything a human has not
//! written yet. Three helpers live here:
//!
//! - [`parse_entry_name`]: split an optional `NNN-` ordering prefix from a stem.
//!   Photographers often number their exports (`001-dawn.jpg`); the number is
//!   noise in a title.
//! - [`display_title`]: the human-readable title shown when the metadata store
//!   has none, e.g. `001-harbour_at-dusk.jpg` → "Harbour At Dusk".
//! - [`sanitize_slug`]: URL/HTML-id safe identifiers.

use std::path::Path;

/// Result of parsing a numbered entry name like `020-My-Best-Photos`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Number prefix if present (e.g., `20` from `020-My-Best-Photos`)
    pub number: Option<u32>,
    /// Raw name part after `NNN-`, separators preserved. Empty if number-only.
    /// For unnumbered entries, this is the full input.
    pub name: String,
}

/// Parse an entry name following the `NNN-name` convention.
///
/// - `"020-My-Best-Photos"` → number=Some(20), name="My-Best-Photos"
/// - `"001"` → number=Some(1), name=""
/// - `"wip-drafts"` → number=None, name="wip-drafts"
pub fn parse_entry_name(name: &str) -> ParsedName {
    if let Some((prefix, rest)) = name.split_once('-')
        && let Ok(num) = prefix.parse::<u32>()
    {
        return ParsedName {
            number: Some(num),
            name: rest.to_string(),
        };
    }
    if let Ok(num) = name.parse::<u32>() {
        return ParsedName {
            number: Some(num),
            name: String::new(),
        };
    }
    ParsedName {
        number: None,
        name: name.to_string(),
    }
}

/// Human-readable title derived from a filename.
///
/// The extension and any `NNN-` prefix are dropped, dashes and underscores
/// become spaces, runs of whitespace collapse, and each word gets an upper
/// case first letter. The rest of each word is left alone so acronyms like
/// `NYC` survive. A number-only name falls back to the bare stem.
pub fn display_title(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());

    let parsed = parse_entry_name(&stem);
    let words = title_words(&parsed.name);
    if words.is_empty() {
        stem
    } else {
        words
    }
}

fn title_words(raw: &str) -> String {
    raw.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

const MAX_SLUG_LEN: usize = 80;

/// Sanitize a string for use as a URL segment or HTML id.
///
/// - Lowercases ASCII letters
/// - Replaces anything that is not alphanumeric with a dash
/// - Collapses consecutive dashes and strips them from both ends
/// - Truncates to `MAX_SLUG_LEN` characters, breaking at the last dash
pub fn sanitize_slug(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut prev_dash = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }
    let trimmed = slug.trim_end_matches('-');

    if trimmed.len() <= MAX_SLUG_LEN {
        trimmed.to_string()
    } else {
        let truncated = &trimmed[..MAX_SLUG_LEN];
        match truncated.rfind('-') {
            Some(pos) => truncated[..pos].to_string(),
            None => truncated.to_string(),
        }
    }
}

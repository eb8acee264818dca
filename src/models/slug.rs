//! Slug generation for titles and entity names.

use deunicode::deunicode_with_tofu;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static NON_WORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[^\w\s-]").ok());
static SEPARATORS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[-_\s]+").ok());

/// Transliterates text to ASCII.
///
/// Diacritics fold to their base letters, ligatures expand, and non-Latin
/// scripts romanize. Characters with no ASCII rendering drop; the output
/// is always pure ASCII.
#[must_use]
pub fn fold_diacritics(text: &str) -> String {
    deunicode_with_tofu(text, "")
}

fn strip_non_word(text: &str) -> Cow<'_, str> {
    match NON_WORD.as_ref() {
        Some(re) => re.replace_all(text, ""),
        None => Cow::Borrowed(text),
    }
}

fn collapse_separators(text: &str) -> Cow<'_, str> {
    match SEPARATORS.as_ref() {
        Some(re) => re.replace_all(text, "-"),
        None => Cow::Borrowed(text),
    }
}

/// Turns a title into a URL-safe slug.
///
/// Text transliterates to ASCII and lowercases, punctuation drops, and
/// runs of whitespace, underscores, or hyphens collapse to a single
/// hyphen. A title made entirely of punctuation slugs to the empty string.
#[must_use]
pub fn slugify(text: &str) -> String {
    let folded = fold_diacritics(text).to_lowercase();
    let stripped = strip_non_word(&folded);
    let collapsed = collapse_separators(&stripped);
    collapsed.trim_matches('-').to_string()
}

/// Slugifies `text`, then appends `-1`, `-2`, … until `is_taken` says no.
///
/// The caller supplies the collision check so the uniqueness scope (per
/// parent, per work) stays a storage concern.
pub fn unique_slug(text: &str, mut is_taken: impl FnMut(&str) -> bool) -> String {
    let base = slugify(text);
    if !is_taken(&base) {
        return base;
    }
    let mut count = 1u32;
    loop {
        let candidate = format!("{base}-{count}");
        if !is_taken(&candidate) {
            return candidate;
        }
        count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("The Gray Warden"), "the-gray-warden");
        assert_eq!(slugify("  Chapter   12:  Embers! "), "chapter-12-embers");
    }

    #[test]
    fn test_slugify_folds_diacritics() {
        assert_eq!(slugify("Chloë Brontë"), "chloe-bronte");
        assert_eq!(slugify("Señor Peña"), "senor-pena");
        assert_eq!(slugify("Œuvre über Straße"), "oeuvre-uber-strasse");
    }

    #[test]
    fn test_slugify_pure_punctuation_is_empty() {
        assert_eq!(slugify("?!?"), "");
    }

    #[test]
    fn test_slugify_treats_underscores_as_separators() {
        assert_eq!(slugify("draft_chapter_01"), "draft-chapter-01");
        assert_eq!(slugify("___"), "");
    }

    #[test]
    fn test_slugify_transliterates_beyond_latin() {
        assert_eq!(slugify("ﬀoulkes"), "ffoulkes");
        assert_eq!(slugify("Москва"), "moskva");
        assert!(slugify("安和 Peña ﬁeld").is_ascii());
    }

    #[test]
    fn test_fold_output_is_ascii() {
        for name in ["Chloë", "Ælfric", "Ελένη", "雪の女王", "ﬀ", "Þórr"] {
            assert!(fold_diacritics(name).is_ascii(), "{name}");
        }
    }

    #[test]
    fn test_unique_slug_suffixes_until_free() {
        let taken: HashSet<&str> = ["mira-kessler", "mira-kessler-1"].into_iter().collect();
        let slug = unique_slug("Mira Kessler", |candidate| taken.contains(candidate));
        assert_eq!(slug, "mira-kessler-2");
    }

    #[test]
    fn test_unique_slug_no_collision() {
        assert_eq!(unique_slug("Mira Kessler", |_| false), "mira-kessler");
    }
}

// 🔤 Text helpers shared by discovery, table parsing and slug generation

use fancy_regex::Regex;
use once_cell::sync::Lazy;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static tag pattern"));

/// Lowercase with the Turkish dotted capital folded first.
///
/// `'İ'.to_lowercase()` yields `i` + U+0307, which breaks substring checks
/// against plain keywords like "üniversite".
pub fn fold_lower(s: &str) -> String {
    s.chars()
        .map(|c| if c == 'İ' { 'i' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// Case-insensitive substring check on folded text.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    fold_lower(haystack).contains(&fold_lower(needle))
}

/// Map Turkish letters onto their ASCII base letter.
pub fn fold_turkish(c: char) -> char {
    match c {
        'ç' | 'Ç' => 'c',
        'ğ' | 'Ğ' => 'g',
        'ı' | 'İ' => 'i',
        'ö' | 'Ö' => 'o',
        'ş' | 'Ş' => 's',
        'ü' | 'Ü' => 'u',
        'â' | 'Â' => 'a',
        'î' | 'Î' => 'i',
        'û' | 'Û' => 'u',
        _ => c,
    }
}

/// Remove markup tags from a single line and trim the remainder.
pub fn strip_tags(line: &str) -> String {
    TAG.replace_all(line, "").trim().to_string()
}

/// Collapse whitespace runs (including NBSP) to single spaces.
pub fn normalize_ws(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_lower_handles_dotted_capital() {
        assert_eq!(fold_lower("İSTANBUL ÜNİVERSİTESİ"), "istanbul üniversitesi");
        assert!(contains_ci("ANKARA ÜNİVERSİTESİ", "üniversitesi"));
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(
            strip_tags("  <li class=\"x\"><a href=\"#\">Ege Üniversitesi</a></li> "),
            "Ege Üniversitesi"
        );
    }

    #[test]
    fn test_normalize_ws() {
        assert_eq!(normalize_ws(" 1.234\u{a0} \n"), "1.234");
        assert_eq!(normalize_ws("Toplam   öğrenci\tsayısı"), "Toplam öğrenci sayısı");
    }
}

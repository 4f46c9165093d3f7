use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(amp|nbsp|lt|gt|quot|apos|#39);").expect("entity regex should parse"));

/// Collapses every run of whitespace (NBSP included) to a single space and
/// trims the ends.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The parser already decodes entities once; Banner double-escapes some
/// titles (`&amp;amp;`) so a literal entity can survive into the text.
pub fn decode_residual_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    ENTITY.replace_all(s, |caps: &regex::Captures| {
        match &caps[1] {
            "amp" => "&",
            "nbsp" => " ",
            "lt" => "<",
            "gt" => ">",
            "quot" => "\"",
            _ => "'",
        }
        .to_string()
    })
}

/// Cleans text pulled out of a cell: entities decoded, whitespace collapsed
pub fn clean(s: &str) -> String {
    normalize_ws(&decode_residual_entities(s))
}

/// `"Date Range"` -> `"dateRange"`, `"Course #"` -> `"course"`
pub fn camel_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for (i, word) in label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.extend(first.to_lowercase());
            } else {
                out.extend(first.to_uppercase());
            }
            out.extend(chars.flat_map(char::to_lowercase));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_ws("  Intro\n\t to\u{a0}\u{a0}C  "), "Intro to C");
        assert_eq!(normalize_ws(" \n "), "");
    }

    #[test]
    fn decodes_leftover_entities() {
        assert_eq!(clean("Science &amp; Society&nbsp;"), "Science & Society");
        assert_eq!(clean("&lt;Topics&gt; &quot;Special&quot;"), "<Topics> \"Special\"");
        assert_eq!(clean("R&D"), "R&D");
    }

    #[test_case("Date Range", "dateRange" ; "two words")]
    #[test_case("Associated Term", "associatedTerm" ; "label")]
    #[test_case("Course #", "course" ; "trailing symbol")]
    #[test_case("CRN", "crn" ; "acronym")]
    #[test_case("Schedule  Type", "scheduleType" ; "double space")]
    fn camel_cases_labels(label: &str, expected: &str) {
        assert_eq!(camel_case(label), expected);
    }
}

//! Pulls the UTM attribution parameters out of a landing-page URL.

use url::Url;

/// The three UTM parameters a lead URL can carry. A field is `None` when the
/// parameter is absent or has an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtmTriple {
    pub term: Option<String>,
    pub campaign: Option<String>,
    pub content: Option<String>,
}

/// Extracts `utm_term`, `utm_campaign` and `utm_content` from a URL string.
///
/// Never fails: malformed, empty or unparseable input yields an all-`None`
/// triple. When a parameter appears more than once, the first non-empty
/// occurrence wins (standard query-string decoding applies, including
/// percent-escapes and `+` as space).
#[must_use]
pub fn extract_utm(raw: &str) -> UtmTriple {
    let Some(url) = parse_lenient(raw) else {
        return UtmTriple::default();
    };

    let mut triple = UtmTriple::default();
    for (key, value) in url.query_pairs() {
        let slot = match key.as_ref() {
            "utm_term" => &mut triple.term,
            "utm_campaign" => &mut triple.campaign,
            "utm_content" => &mut triple.content,
            _ => continue,
        };
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value.into_owned());
        }
    }
    triple
}

/// Parses absolute URLs directly and falls back to resolving relative input
/// (`"?utm_term=x"`, `"/landing?utm_term=x"`, `"example.com/?utm_term=x"`)
/// against a dummy base, so query-only strings still carry their parameters.
fn parse_lenient(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(raw) {
        return Some(url);
    }
    let base = Url::parse("http://localhost/").ok()?;
    base.join(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_extracts_all_three() {
        let triple = extract_utm(
            "https://example.com/landing?utm_campaign=spring&utm_term=kw-1&utm_content=ad-blue",
        );
        assert_eq!(triple.term.as_deref(), Some("kw-1"));
        assert_eq!(triple.campaign.as_deref(), Some("spring"));
        assert_eq!(triple.content.as_deref(), Some("ad-blue"));
    }

    #[test]
    fn url_without_utm_term_is_empty_for_that_field() {
        let triple = extract_utm("https://example.com/?ref=newsletter");
        assert_eq!(triple, UtmTriple::default());
    }

    #[test]
    fn query_only_string_is_parsed() {
        let triple = extract_utm("?utm_term=A&utm_content=X");
        assert_eq!(triple.term.as_deref(), Some("A"));
        assert_eq!(triple.content.as_deref(), Some("X"));
        assert_eq!(triple.campaign, None);
    }

    #[test]
    fn schemeless_host_is_parsed() {
        let triple = extract_utm("example.com/p?utm_term=kw");
        assert_eq!(triple.term.as_deref(), Some("kw"));
    }

    #[test]
    fn first_non_empty_occurrence_wins() {
        let triple = extract_utm("https://e.com/?utm_term=&utm_term=first&utm_term=second");
        assert_eq!(triple.term.as_deref(), Some("first"));
    }

    #[test]
    fn empty_value_is_treated_as_absent() {
        let triple = extract_utm("https://e.com/?utm_term=&utm_content=");
        assert_eq!(triple, UtmTriple::default());
    }

    #[test]
    fn percent_encoding_and_plus_are_decoded() {
        let triple = extract_utm("https://e.com/?utm_content=ad+blue%20v2&utm_term=kw%2F1");
        assert_eq!(triple.content.as_deref(), Some("ad blue v2"));
        assert_eq!(triple.term.as_deref(), Some("kw/1"));
    }

    #[test]
    fn garbage_input_is_empty() {
        assert_eq!(extract_utm(""), UtmTriple::default());
        assert_eq!(extract_utm("   "), UtmTriple::default());
        assert_eq!(extract_utm("http://"), UtmTriple::default());
    }
}

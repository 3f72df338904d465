//! Link extraction from catalog HTML
//!
//! The catalog is scraped with two kinds of regular expressions:
//! - the discovery pattern, matching `/videos/play/<event><year>/<id>/` links
//!   on the year index page, capturing the session id
//! - one asset pattern per [`AssetKind`], matching the download anchor on a
//!   session page, capturing its href
//!
//! These patterns are tied to the catalog markup. The tests below pin them to
//! representative fixture pages; update both together when the markup changes.

use crate::error::Result;
use crate::types::{AssetKind, Resolution, SessionId};
use regex::Regex;
use std::collections::BTreeSet;

/// Apply `pattern` to `text` and collect its first capture group
///
/// Matches whose first group is absent or empty are skipped. The result is
/// deduplicated and sorted by byte order, so identical input always yields
/// identical output. A pattern that matches nothing yields an empty vector.
pub fn extract(pattern: &Regex, text: &str) -> Vec<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Compile `pattern` and apply it to `text`
///
/// # Errors
/// Returns [`crate::Error::Pattern`] if the pattern does not compile.
pub fn extract_with(pattern: &str, text: &str) -> Result<Vec<String>> {
    let regex = Regex::new(pattern)?;
    Ok(extract(&regex, text))
}

/// Discovery pattern for session links of one event
pub fn session_pattern(event: &str) -> String {
    format!(r#"/videos/play/{}/([0-9]+)/"#, regex::escape(event))
}

/// Download anchor pattern for a video of the given resolution
///
/// Matches `<a ... href="...?dl=1">HD Video</a>` and captures the href.
pub fn video_link_pattern(resolution: Resolution) -> String {
    format!(
        r#"(?i)<a\s[^>]*?href="([^"]*(?:[?&]|&amp;)dl=1[^"]*)"[^>]*>\s*{}\s*</a>"#,
        regex::escape(resolution.label())
    )
}

/// Download anchor pattern for the slides PDF
///
/// Matches an anchor whose href is a `.pdf` (optionally with a query) and
/// whose label mentions "PDF".
pub fn pdf_link_pattern() -> String {
    r#"(?i)<a\s[^>]*?href="([^"]*\.pdf(?:\?[^"]*)?)"[^>]*>[^<]*PDF[^<]*</a>"#.to_string()
}

/// Compiled extraction patterns for one run
#[derive(Clone, Debug)]
pub struct LinkExtractor {
    sessions: Regex,
    video: Regex,
    pdf: Regex,
}

impl LinkExtractor {
    /// Compile the patterns for an event slug and video resolution
    ///
    /// # Errors
    /// Returns [`crate::Error::Pattern`] if a pattern fails to compile, which
    /// indicates a bug rather than bad input.
    pub fn new(event: &str, resolution: Resolution) -> Result<Self> {
        Ok(Self {
            sessions: Regex::new(&session_pattern(event))?,
            video: Regex::new(&video_link_pattern(resolution))?,
            pdf: Regex::new(&pdf_link_pattern())?,
        })
    }

    /// Session identifiers linked from an index page, sorted and unique
    pub fn session_ids(&self, html: &str) -> Vec<SessionId> {
        extract(&self.sessions, html)
            .into_iter()
            .map(SessionId::from)
            .collect()
    }

    /// Download URLs for an asset kind on a session page, sorted and unique
    pub fn asset_links(&self, kind: AssetKind, html: &str) -> Vec<String> {
        let pattern = match kind {
            AssetKind::Video => &self.video,
            AssetKind::Pdf => &self.pdf,
        };
        let links: BTreeSet<String> = extract(pattern, html)
            .into_iter()
            .map(|href| unescape_href(&href))
            .collect();
        links.into_iter().collect()
    }
}

/// Undo the HTML escaping of `&` in attribute values
fn unescape_href(href: &str) -> String {
    href.replace("&amp;", "&")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const INDEX_FIXTURE: &str = r#"
<section class="all-content">
  <ul class="collection-items">
    <li><a href="/videos/play/wwdc2016/205/"><h5>Optimizing Web Content</h5></a></li>
    <li><a href="/videos/play/wwdc2016/101/"><img src="/thumb/101.jpg"></a></li>
    <li><a href="/videos/play/wwdc2016/101/"><h5>Platforms State of the Union</h5></a></li>
    <li><a href="/videos/play/wwdc2015/101/">Last year</a></li>
    <li><a href="/videos/play/wwdc2016/">Index</a></li>
  </ul>
</section>
"#;

    const SESSION_FIXTURE: &str = r#"
<ul class="links small">
  <li class="download">
    <a href="https://cdn.example.com/s101_hd.mov?dl=1">HD Video</a>
  </li>
  <li class="download">
    <a href="https://cdn.example.com/s101_sd.mov?dl=1">SD Video</a>
  </li>
  <li class="document">
    <a href="https://cdn.example.com/101_platforms_state_of_the_union.pdf">Presentation Slides (PDF)</a>
  </li>
  <li><a href="https://cdn.example.com/s101_hd.mov">HD Video</a></li>
</ul>
"#;

    fn extractor(resolution: Resolution) -> LinkExtractor {
        LinkExtractor::new("wwdc2016", resolution).unwrap()
    }

    #[test]
    fn test_no_matches_is_empty_not_error() {
        let ex = extractor(Resolution::Hd);
        assert!(ex.session_ids("<html><body>nothing</body></html>").is_empty());
        assert!(ex.asset_links(AssetKind::Video, "").is_empty());
        assert!(extract_with(r"(\d+)", "no digits here").unwrap().is_empty());
    }

    #[test]
    fn test_session_discovery_dedups_and_sorts() {
        let ids = extractor(Resolution::Sd).session_ids(INDEX_FIXTURE);
        assert_eq!(ids, vec![SessionId::from("101"), SessionId::from("205")]);
    }

    #[test]
    fn test_output_is_lexical_not_numeric() {
        let html = r#"<a href="/videos/play/wwdc2016/9/"></a><a href="/videos/play/wwdc2016/10/"></a>"#;
        let ids = extractor(Resolution::Sd).session_ids(html);
        assert_eq!(ids, vec![SessionId::from("10"), SessionId::from("9")]);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let ex = extractor(Resolution::Sd);
        let first = ex.session_ids(INDEX_FIXTURE);
        for _ in 0..5 {
            assert_eq!(ex.session_ids(INDEX_FIXTURE), first);
        }
    }

    #[test]
    fn test_hd_link_keeps_query_suffix() {
        let links = extractor(Resolution::Hd).asset_links(AssetKind::Video, SESSION_FIXTURE);
        assert_eq!(links, vec!["https://cdn.example.com/s101_hd.mov?dl=1".to_string()]);
    }

    #[test]
    fn test_sd_link_selected_by_label() {
        let links = extractor(Resolution::Sd).asset_links(AssetKind::Video, SESSION_FIXTURE);
        assert_eq!(links, vec!["https://cdn.example.com/s101_sd.mov?dl=1".to_string()]);
    }

    #[test]
    fn test_pdf_link() {
        let links = extractor(Resolution::Hd).asset_links(AssetKind::Pdf, SESSION_FIXTURE);
        assert_eq!(
            links,
            vec!["https://cdn.example.com/101_platforms_state_of_the_union.pdf".to_string()]
        );
    }

    #[test]
    fn test_href_ampersand_unescaped() {
        let html = r#"<a class="x" href="https://cdn.example.com/a.mp4?token=1&amp;dl=1">HD Video</a>"#;
        let links = extractor(Resolution::Hd).asset_links(AssetKind::Video, html);
        assert_eq!(links, vec!["https://cdn.example.com/a.mp4?token=1&dl=1".to_string()]);
    }

    #[test]
    fn test_empty_and_missing_groups_skipped() {
        assert_eq!(
            extract_with(r#"id="([a-z]*)""#, r#"id="" id="b" id="a" id="b""#).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        // Optional group that does not participate in the match
        assert_eq!(
            extract_with(r"x(y)?", "x xy x").unwrap(),
            vec!["y".to_string()]
        );
    }

    #[test]
    fn test_malformed_pattern_is_pattern_error() {
        assert!(matches!(extract_with("(unclosed", "text"), Err(Error::Pattern(_))));
    }

    #[test]
    fn test_event_is_escaped() {
        let pattern = session_pattern("wwdc.2016");
        let regex = Regex::new(&pattern).unwrap();
        assert!(extract(&regex, "/videos/play/wwdcX2016/1/").is_empty());
        assert_eq!(extract(&regex, "/videos/play/wwdc.2016/1/"), vec!["1".to_string()]);
    }
}

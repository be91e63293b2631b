// src/ingest/parse.rs
//! Sitemap / news-sitemap extraction.
//!
//! Publishers disagree on namespace prefixes and nesting, so matching is done
//! on lowercased local tag names by substring, driven by `FIELD_RULES`.
//! Any element whose name contains `url` is an item; its direct children (and
//! the children of a direct `news` wrapper) supply the URL and date.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::errors::ParseError;
use crate::ingest::types::RawEntry;

const ITEM_NEEDLE: &str = "url";
const NESTED_BLOCK: &str = "news";
const INDEX_ROOT: &str = "sitemapindex";
const INDEX_ITEM: &str = "sitemap";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Url,
    Date,
}

struct FieldRule {
    needle: &'static str,
    field: Field,
    /// Lower wins when several children map to the same field.
    rank: u8,
}

const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        needle: "loc",
        field: Field::Url,
        rank: 0,
    },
    FieldRule {
        needle: "lastmod",
        field: Field::Date,
        rank: 0,
    },
    FieldRule {
        needle: "publication_date",
        field: Field::Date,
        rank: 1,
    },
];

/// What one document contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub entries: Vec<RawEntry>,
    /// `<loc>` values of a `sitemapindex` document, in document order.
    pub child_sitemaps: Vec<String>,
}

#[derive(Debug, Default)]
struct Node {
    name: String, // local name, lowercased
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn named(local: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(local).to_ascii_lowercase(),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct Picks {
    url: Option<(u8, String)>,
    date: Option<(u8, String)>,
}

impl Picks {
    fn offer(&mut self, node: &Node) {
        let text = node.text.trim();
        if text.is_empty() {
            return;
        }
        if let Some(rule) = FIELD_RULES.iter().find(|r| node.name.contains(r.needle)) {
            let slot = match rule.field {
                Field::Url => &mut self.url,
                Field::Date => &mut self.date,
            };
            let better = slot.as_ref().map_or(true, |(rank, _)| rule.rank < *rank);
            if better {
                *slot = Some((rule.rank, text.to_string()));
            }
        }
    }
}

/// Parse one feed document into raw entries.
///
/// Malformed XML is an `Err`; the caller turns that into an empty
/// contribution plus a diagnostic, never into a failed run.
pub fn parse_feed(bytes: &[u8], source_name: &str) -> Result<ParsedFeed, ParseError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let root = build_tree(bytes)?;

    if root.name == "html" {
        return Err(ParseError::NotAFeed { root: root.name });
    }

    let mut out = ParsedFeed::default();

    if root.name.contains(INDEX_ROOT) {
        for sm in root.children.iter().filter(|c| c.name.contains(INDEX_ITEM)) {
            let loc = sm
                .children
                .iter()
                .find(|c| c.name.contains("loc") && !c.text.trim().is_empty());
            if let Some(loc) = loc {
                out.child_sitemaps.push(loc.text.trim().to_string());
            }
        }
    }

    // Pre-order walk keeps document order.
    let mut stack = vec![&root];
    while let Some(node) = stack.pop() {
        if node.name.contains(ITEM_NEEDLE) {
            if let Some(entry) = extract_item(node) {
                out.entries.push(entry);
            }
        }
        stack.extend(node.children.iter().rev());
    }

    debug!(
        source = source_name,
        root = %root.name,
        entries = out.entries.len(),
        children = out.child_sitemaps.len(),
        "feed parsed"
    );
    Ok(out)
}

fn extract_item(item: &Node) -> Option<RawEntry> {
    let mut picks = Picks::default();
    for child in &item.children {
        picks.offer(child);
        if child.name.contains(NESTED_BLOCK) {
            for grand in &child.children {
                picks.offer(grand);
            }
        }
    }
    let (_, url) = picks.url?;
    Some(RawEntry {
        url: Some(url),
        raw_date: picks.date.map(|(_, d)| d),
    })
}

fn build_tree(bytes: &[u8]) -> Result<Node, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Node::named(e.local_name().as_ref())),
            Ok(Event::Empty(e)) => attach(&mut stack, &mut root, Node::named(e.local_name().as_ref())),
            Ok(Event::End(_)) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    match t.unescape() {
                        Ok(s) => top.text.push_str(&s),
                        // undeclared HTML entities (&nbsp; etc.): keep raw text
                        Err(_) => top.text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Xml {
                    position: reader.error_position() as u64,
                    message: e.to_string(),
                })
            }
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Xml {
            position: reader.buffer_position() as u64,
            message: format!("unexpected end of document inside <{}>", open.name),
        });
    }
    root.ok_or(ParseError::NoRoot)
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(feed: &ParsedFeed) -> Vec<&str> {
        feed.entries
            .iter()
            .filter_map(|e| e.url.as_deref())
            .collect()
    }

    #[test]
    fn plain_urlset_yields_loc_and_lastmod() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://a.test/1</loc><lastmod>2025-01-05T10:00:00Z</lastmod></url>
  <url><loc>https://a.test/2</loc></url>
</urlset>"#;
        let feed = parse_feed(xml.as_bytes(), "t").unwrap();
        assert_eq!(
            feed.entries,
            vec![
                RawEntry {
                    url: Some("https://a.test/1".into()),
                    raw_date: Some("2025-01-05T10:00:00Z".into()),
                },
                RawEntry {
                    url: Some("https://a.test/2".into()),
                    raw_date: None,
                },
            ]
        );
        assert!(feed.child_sitemaps.is_empty());
    }

    #[test]
    fn item_without_loc_is_not_emitted() {
        let xml = r#"<urlset><url><lastmod>2025-01-05</lastmod></url><url><loc>x</loc></url></urlset>"#;
        let feed = parse_feed(xml.as_bytes(), "t").unwrap();
        assert_eq!(urls(&feed), vec!["x"]);
    }

    #[test]
    fn tag_matching_ignores_case_and_prefix() {
        let xml = r#"<s:URLSET xmlns:s="urn:s"><s:Url><s:LOC> https://a.test/caps </s:LOC><s:LastMod>2025-01-05</s:LastMod></s:Url></s:URLSET>"#;
        let feed = parse_feed(xml.as_bytes(), "t").unwrap();
        assert_eq!(urls(&feed), vec!["https://a.test/caps"]);
        assert_eq!(feed.entries[0].raw_date.as_deref(), Some("2025-01-05"));
    }

    #[test]
    fn lastmod_outranks_nested_publication_date() {
        let xml = r#"<urlset xmlns:news="urn:news">
  <url>
    <loc>https://a.test/1</loc>
    <news:news><news:publication_date>2025-01-04T08:00:00Z</news:publication_date></news:news>
    <lastmod>2025-01-05T10:00:00Z</lastmod>
  </url>
</urlset>"#;
        let feed = parse_feed(xml.as_bytes(), "t").unwrap();
        assert_eq!(
            feed.entries[0].raw_date.as_deref(),
            Some("2025-01-05T10:00:00Z")
        );
    }

    #[test]
    fn cdata_and_bom_are_handled() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(
            b"<urlset><url><loc><![CDATA[https://a.test/q?a=1&b=2]]></loc></url></urlset>",
        );
        let feed = parse_feed(&bytes, "t").unwrap();
        assert_eq!(urls(&feed), vec!["https://a.test/q?a=1&b=2"]);
    }

    #[test]
    fn escaped_ampersand_is_unescaped() {
        let xml = r#"<urlset><url><loc>https://a.test/q?a=1&amp;b=2</loc></url></urlset>"#;
        let feed = parse_feed(xml.as_bytes(), "t").unwrap();
        assert_eq!(urls(&feed), vec!["https://a.test/q?a=1&b=2"]);
    }

    #[test]
    fn sitemap_index_lists_children() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://a.test/s1.xml.gz</loc><lastmod>2025-01-05</lastmod></sitemap>
  <sitemap><loc>https://a.test/s2.xml</loc></sitemap>
</sitemapindex>"#;
        let feed = parse_feed(xml.as_bytes(), "t").unwrap();
        assert!(feed.entries.is_empty());
        assert_eq!(
            feed.child_sitemaps,
            vec!["https://a.test/s1.xml.gz", "https://a.test/s2.xml"]
        );
    }

    #[test]
    fn html_challenge_page_is_not_a_feed() {
        let xml = r#"<html><head><title>Just a moment...</title></head><body></body></html>"#;
        let err = parse_feed(xml.as_bytes(), "t").unwrap_err();
        assert!(matches!(err, ParseError::NotAFeed { ref root } if root == "html"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let xml = r#"<urlset><url><loc>https://a.test/1</loc></urlx></urlset>"#;
        assert!(matches!(
            parse_feed(xml.as_bytes(), "t"),
            Err(ParseError::Xml { .. })
        ));

        let truncated = r#"<urlset><url><loc>https://a.test/1</loc>"#;
        assert!(matches!(
            parse_feed(truncated.as_bytes(), "t"),
            Err(ParseError::Xml { .. })
        ));

        assert!(matches!(parse_feed(b"   ", "t"), Err(ParseError::NoRoot)));
    }
}

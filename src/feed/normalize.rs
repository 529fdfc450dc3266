//! Post-parse normalization: namespace flattening and derived timestamps.
use super::node::Node;
use super::Dialect;
use crate::util::parse_timestamp;

/// Copies namespaced children of `node` into plain `<prefix>:<localname>` tags.
///
/// Every non-default prefix in scope at `node` (inherited declarations
/// included) is visited in declaration order; each direct child in that
/// prefix's namespace becomes a plain sibling named after the prefix and
/// the child's local name. When two children produce the same synthetic
/// name the one visited last wins. Existing tags are never removed.
pub fn adjust_namespaces(node: &mut Node) {
    let additions: Vec<Node> = node
        .scope
        .iter()
        .filter(|(prefix, _)| !prefix.is_empty())
        .flat_map(|(prefix, uri)| {
            node.children_in(uri)
                .map(move |child| flattened(prefix, child))
        })
        .collect();

    for synthetic in additions {
        node.upsert_child(synthetic);
    }
}

fn flattened(prefix: &str, child: &Node) -> Node {
    let mut copy = child.clone();
    copy.name = format!("{prefix}:{}", child.name);
    copy.prefix = None;
    copy.namespace = None;
    copy
}

/// Adds a `timestamp` tag holding the item's date as epoch seconds.
///
/// RSS items read `dc:date` when present, otherwise `pubDate`; Atom
/// entries read `updated`. The first present field decides: if it does
/// not parse, no timestamp is added.
pub fn derive_timestamp(item: &mut Node, dialect: Dialect) {
    let source = match dialect {
        Dialect::Rss => item.child("dc:date").or_else(|| item.child("pubDate")),
        Dialect::Atom => item.child("updated"),
    };

    let Some(source) = source else {
        return;
    };

    match parse_timestamp(source.text()) {
        Some(epoch) => {
            let mut timestamp = Node::new("timestamp");
            timestamp.text = epoch.to_string();
            timestamp.scope = item.scope.clone();
            item.upsert_child(timestamp);
        }
        None => {
            tracing::debug!(field = %source.name(), value = %source.text().trim(), "Unparseable feed date");
        }
    }
}

/// Normalizes an RSS `channel` and each of its items.
pub fn normalize_rss(channel: &mut Node) {
    adjust_namespaces(channel);
    for item in channel
        .children
        .iter_mut()
        .filter(|c| c.prefix.is_none() && c.name == "item")
    {
        adjust_namespaces(item);
        derive_timestamp(item, Dialect::Rss);
    }
}

/// Adds timestamps to each `entry` of an Atom feed root.
pub fn normalize_atom(root: &mut Node) {
    for entry in root
        .children
        .iter_mut()
        .filter(|c| c.prefix.is_none() && c.name == "entry")
    {
        derive_timestamp(entry, Dialect::Atom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::parser::{parse_document, ParseOptions};
    use pretty_assertions::assert_eq;

    const DC: &str = "http://purl.org/dc/elements/1.1/";

    fn root_of(xml: &str) -> Node {
        parse_document(xml.as_bytes(), &ParseOptions::default())
            .unwrap()
            .into_root()
    }

    #[test]
    fn test_dc_date_is_flattened() {
        let mut item = root_of(&format!(
            r#"<item xmlns:dc="{DC}"><title>A</title><dc:date>2020-01-01T00:00:00Z</dc:date></item>"#
        ));
        adjust_namespaces(&mut item);

        assert_eq!(item.child_text("dc:date"), Some("2020-01-01T00:00:00Z"));
        // The original prefixed element is still there, untouched.
        assert_eq!(item.children_in(DC).count(), 1);
        assert_eq!(item.child_text("title"), Some("A"));
    }

    #[test]
    fn test_inherited_declarations_are_used() {
        let mut rss = root_of(&format!(
            r#"<rss xmlns:dc="{DC}"><channel><item><dc:creator>Ann</dc:creator></item></channel></rss>"#
        ));
        let channel = rss.children.iter_mut().next().unwrap();
        let item = channel.children.iter_mut().next().unwrap();
        adjust_namespaces(item);
        assert_eq!(item.child_text("dc:creator"), Some("Ann"));
    }

    #[test]
    fn test_flattened_copy_keeps_structure() {
        let mut item = root_of(
            r#"<item xmlns:media="http://search.yahoo.com/mrss/"><media:group><media:title>T</media:title></media:group></item>"#,
        );
        adjust_namespaces(&mut item);

        let group = item.child("media:group").unwrap();
        assert_eq!(group.prefix(), None);
        assert_eq!(group.children_in("http://search.yahoo.com/mrss/").count(), 1);
    }

    #[test]
    fn test_repeated_namespaced_children_last_wins() {
        let mut item = root_of(&format!(
            r#"<item xmlns:dc="{DC}"><dc:subject>one</dc:subject><dc:subject>two</dc:subject></item>"#
        ));
        adjust_namespaces(&mut item);

        let subjects: Vec<_> = item.children_named("dc:subject").map(Node::text).collect();
        assert_eq!(subjects, vec!["two"]);
    }

    #[test]
    fn test_two_prefixes_for_one_uri_both_flatten() {
        let mut item = root_of(&format!(
            r#"<item xmlns:dc="{DC}" xmlns:d="{DC}"><dc:date>2020</dc:date></item>"#
        ));
        adjust_namespaces(&mut item);

        assert_eq!(item.child_text("dc:date"), Some("2020"));
        assert_eq!(item.child_text("d:date"), Some("2020"));
    }

    #[test]
    fn test_default_namespace_is_not_flattened() {
        let mut feed = root_of(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>T</title></feed>"#,
        );
        let before = feed.children().count();
        adjust_namespaces(&mut feed);
        assert_eq!(feed.children().count(), before);
    }

    #[test]
    fn test_rss_prefers_dc_date_over_pub_date() {
        let mut item = root_of(&format!(
            r#"<item xmlns:dc="{DC}"><pubDate>Thu, 02 Jan 2020 00:00:00 GMT</pubDate><dc:date>2020-01-01T00:00:00Z</dc:date></item>"#
        ));
        adjust_namespaces(&mut item);
        derive_timestamp(&mut item, Dialect::Rss);
        assert_eq!(item.timestamp(), Some(1_577_836_800));
    }

    #[test]
    fn test_rss_pub_date_fallback() {
        let mut item = root_of("<item><pubDate>Wed, 01 Jan 2020 00:00:00 GMT</pubDate></item>");
        derive_timestamp(&mut item, Dialect::Rss);
        assert_eq!(item.child_text("timestamp"), Some("1577836800"));
    }

    #[test]
    fn test_unparseable_date_adds_nothing() {
        let mut item = root_of("<item><pubDate>someday</pubDate></item>");
        derive_timestamp(&mut item, Dialect::Rss);
        assert!(item.child("timestamp").is_none());

        let mut bare = root_of("<item><title>x</title></item>");
        derive_timestamp(&mut bare, Dialect::Rss);
        assert!(bare.child("timestamp").is_none());
    }

    #[test]
    fn test_timestamp_overwrites_existing_tag() {
        let mut entry = root_of(
            "<entry><timestamp>old</timestamp><updated>2020-01-01T00:00:00Z</updated></entry>",
        );
        derive_timestamp(&mut entry, Dialect::Atom);
        let stamps: Vec<_> = entry.children_named("timestamp").map(Node::text).collect();
        assert_eq!(stamps, vec!["1577836800"]);
    }

    #[test]
    fn test_atom_ignores_pub_date() {
        let mut entry = root_of("<entry><pubDate>Wed, 01 Jan 2020 00:00:00 GMT</pubDate></entry>");
        derive_timestamp(&mut entry, Dialect::Atom);
        assert_eq!(entry.timestamp(), None);
    }

    #[test]
    fn test_normalize_rss_touches_channel_and_items() {
        let mut rss = root_of(&format!(
            r#"<rss xmlns:dc="{DC}"><channel><dc:language>en</dc:language>
<item><dc:date>2020-01-01T00:00:00Z</dc:date></item>
<item><pubDate>Wed, 01 Jan 2020 00:00:00 GMT</pubDate></item>
</channel></rss>"#
        ));
        let channel = rss.children.iter_mut().next().unwrap();
        normalize_rss(channel);

        assert_eq!(channel.child_text("dc:language"), Some("en"));
        let stamps: Vec<_> = channel
            .children_named("item")
            .map(Node::timestamp)
            .collect();
        assert_eq!(stamps, vec![Some(1_577_836_800), Some(1_577_836_800)]);
    }

    #[test]
    fn test_normalize_atom_stamps_entries() {
        let mut feed = root_of(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><updated>2020-01-01T00:00:00Z</updated></entry><entry/></feed>"#,
        );
        normalize_atom(&mut feed);
        let stamps: Vec<_> = feed.children_named("entry").map(Node::timestamp).collect();
        assert_eq!(stamps, vec![Some(1_577_836_800), None]);
    }
}

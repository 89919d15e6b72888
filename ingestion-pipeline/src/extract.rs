use std::collections::HashMap;

use scraper::{ElementRef, Html};

use crate::types::Page;

/// Parent chains longer than this are cut off rather than followed, so a
/// cycle in upstream hierarchy data cannot hang the pipeline.
const MAX_PATH_DEPTH: usize = 10;

/// Elements whose text is never part of the extracted content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head"];

/// Elements that force a line break around their content.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "br", "li", "ul", "ol", "table", "tr", "h1", "h2", "h3",
    "h4", "h5", "h6", "blockquote", "pre",
];

/// Converts raw wiki HTML to plain text: script/style content is dropped,
/// block-level elements become line breaks, runs of blank lines collapse to
/// one, and the result is trimmed. An empty result means the page has no
/// ingestible content.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);

    let mut lines = Vec::new();
    let mut previous_blank = false;
    for line in raw.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            if !previous_blank {
                lines.push(String::new());
                previous_blank = true;
            }
        } else {
            lines.push(line.to_string());
            previous_blank = false;
        }
    }

    lines.join("\n").trim().to_string()
}

fn collect_text(element: ElementRef, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }

    let block = BLOCK_ELEMENTS.contains(&name);
    if block && !out.ends_with('\n') {
        out.push('\n');
    }

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }

    if block && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Reconstructs a page's hierarchy path (ancestor titles, root first) by
/// chasing parent ids through the sampled pages, bounded by
/// `MAX_PATH_DEPTH`. Parents missing from the sample end the chain.
pub fn build_page_path(page: &Page, pages_by_id: &HashMap<&str, &Page>) -> Vec<String> {
    let mut path = Vec::new();
    let mut current = page.parent_id.as_deref();
    let mut depth = 0;

    while let Some(parent_id) = current {
        if depth >= MAX_PATH_DEPTH {
            break;
        }
        let Some(parent) = pages_by_id.get(parent_id) else {
            break;
        };
        path.insert(0, parent.title.clone());
        current = parent.parent_id.as_deref();
        depth += 1;
    }

    path
}

/// Builds the human-facing page link recorded as provenance.
pub fn page_url(site_base_url: &str, page_id: &str) -> String {
    format!(
        "{}/pages/viewpage.action?pageId={page_id}",
        site_base_url.trim_end_matches('/')
    )
}

/// Prepends the provenance header the chat UI shows with retrieved chunks:
/// source space, title, URL, hierarchy path and last-updated timestamp.
pub fn compose_page_content(
    space_name: &str,
    space_key: &str,
    page: &Page,
    path: &[String],
    url: &str,
    extracted_text: &str,
) -> String {
    let mut full_path = vec![space_name.to_string()];
    full_path.extend_from_slice(path);
    full_path.push(page.title.clone());

    let mut header = String::new();
    header.push_str("---\n");
    header.push_str(&format!("Source: {space_name} ({space_key})\n"));
    header.push_str(&format!("Title: {}\n", page.title));
    header.push_str(&format!("URL: {url}\n"));
    header.push_str(&format!("Path: {}\n", full_path.join(" > ")));
    header.push_str(&format!("Last Updated: {}\n", page.updated));
    header.push_str("---\n\n");

    header + extracted_text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, title: &str, parent_id: Option<&str>) -> Page {
        Page {
            id: id.to_string(),
            title: title.to_string(),
            body: String::new(),
            updated: "2024-03-01T10:00:00Z".to_string(),
            update_count: 0,
            parent_id: parent_id.map(str::to_string),
            level: 0,
        }
    }

    #[test]
    fn extracts_simple_paragraph() {
        assert_eq!(html_to_text("<p>hello world</p>"), "hello world");
    }

    #[test]
    fn drops_script_and_style_content() {
        let html = r"<div><script>alert('x')</script><style>p{color:red}</style><p>kept</p></div>";
        assert_eq!(html_to_text(html), "kept");
    }

    #[test]
    fn block_elements_become_line_breaks() {
        let html = "<h1>Title</h1><p>first</p><p>second</p>";
        assert_eq!(html_to_text(html), "Title\nfirst\nsecond");
    }

    #[test]
    fn blank_lines_are_collapsed() {
        let html = "<p>a</p><p>  </p><p></p><p>b</p>";
        assert_eq!(html_to_text(html), "a\n\nb");
    }

    #[test]
    fn empty_html_yields_empty_text() {
        assert_eq!(html_to_text(""), "");
        assert_eq!(html_to_text("<p>   </p>"), "");
    }

    #[test]
    fn path_follows_parent_chain_root_first() {
        let root = page("1", "Root", None);
        let middle = page("2", "Middle", Some("1"));
        let leaf = page("3", "Leaf", Some("2"));

        let mut lookup: HashMap<&str, &Page> = HashMap::new();
        lookup.insert("1", &root);
        lookup.insert("2", &middle);
        lookup.insert("3", &leaf);

        assert_eq!(build_page_path(&leaf, &lookup), vec!["Root", "Middle"]);
    }

    #[test]
    fn path_is_cut_on_cycles() {
        let a = page("1", "A", Some("2"));
        let b = page("2", "B", Some("1"));

        let mut lookup: HashMap<&str, &Page> = HashMap::new();
        lookup.insert("1", &a);
        lookup.insert("2", &b);

        let path = build_page_path(&a, &lookup);
        assert_eq!(path.len(), MAX_PATH_DEPTH);
    }

    #[test]
    fn header_carries_provenance() {
        let leaf = page("3", "Leaf", Some("2"));
        let url = page_url("https://wiki.example.com/", "3");
        let content = compose_page_content(
            "Engineering",
            "ENG",
            &leaf,
            &["Root".to_string()],
            &url,
            "body text",
        );

        assert!(content.starts_with("---\n"));
        assert!(content.contains("Source: Engineering (ENG)\n"));
        assert!(content.contains("Title: Leaf\n"));
        assert!(content.contains("URL: https://wiki.example.com/pages/viewpage.action?pageId=3\n"));
        assert!(content.contains("Path: Engineering > Root > Leaf\n"));
        assert!(content.contains("Last Updated: 2024-03-01T10:00:00Z\n"));
        assert!(content.ends_with("---\n\nbody text"));
    }
}

//! HTML fragment helpers for descriptions

use scraper::{ElementRef, Html};

const ALLOWED_TAGS: &[&str] = &[
    "div", "p", "h1", "h2", "h3", "h4", "h5", "h6", "ol", "ul", "li", "strong", "a", "img", "i",
    "em", "section", "small", "main", "aside", "article", "b", "table", "thead", "tbody", "tfoot",
    "tr", "th", "td", "span",
];

// Content of these is dropped entirely rather than unwrapped.
const DROPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

fn allowed_attribute(tag: &str, attribute: &str) -> bool {
    matches!(
        (tag, attribute),
        ("a", "href" | "rel") | ("img", "src" | "alt")
    )
}

fn escape(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn write_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            escape(text, out);
        } else if let Some(child) = ElementRef::wrap(child) {
            write_element(child, out);
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let tag = element.value().name();
    if DROPPED_TAGS.contains(&tag) {
        return;
    }
    if !ALLOWED_TAGS.contains(&tag) {
        write_children(element, out);
        return;
    }

    out.push('<');
    out.push_str(tag);
    for (name, value) in element.value().attrs() {
        if allowed_attribute(tag, name) {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape(value, out);
            out.push('"');
        }
    }
    out.push('>');
    if tag != "img" {
        write_children(element, out);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

/// Rebuild a fragment keeping only allow-listed tags and attributes.
/// Disallowed tags are unwrapped, their text kept.
pub fn sanitize(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    let mut out = String::with_capacity(fragment.len());
    write_children(parsed.root_element(), &mut out);
    out.trim().to_string()
}

/// Visible text of a fragment with whitespace collapsed.
pub fn plain_text(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    let mut out = String::new();
    collect_text(parsed.root_element(), &mut out);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            if DROPPED_TAGS.contains(&child.value().name()) {
                continue;
            }
            out.push(' ');
            collect_text(child, out);
            out.push(' ');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_allowed_markup() {
        let html = r#"<div class="x"><p onclick="evil()">Hi <a href="/a" target="_blank">link</a></p><img src="/i.jpg" width="3"></div>"#;
        assert_eq!(
            sanitize(html),
            r#"<div><p>Hi <a href="/a">link</a></p><img src="/i.jpg"></div>"#
        );
    }

    #[test]
    fn sanitize_unwraps_unknown_tags_and_drops_scripts() {
        let html = "<font>Big</font><script>alert(1)</script> &amp; more";
        assert_eq!(sanitize(html), "Big &amp; more");
    }

    #[test]
    fn plain_text_collapses_whitespace() {
        let html = "<div><p>Fast\n   charger</p><ul><li>5V</li><li>2A</li></ul></div>";
        assert_eq!(plain_text(html), "Fast charger 5V 2A");
    }
}

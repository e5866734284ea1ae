use std::sync::LazyLock;

use scraper::{ElementRef, Node, Selector};

use crate::report::Issue;

static BOLD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("b").unwrap());

/// Text of an element and its descendants, skipping `<style>`/`<script>`.
/// `<br>` becomes a newline.
pub fn visible_text(el: ElementRef) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(t) => {
                let hidden = node.ancestors().any(|a| {
                    matches!(a.value(), Node::Element(e) if matches!(e.name(), "style" | "script"))
                });
                if !hidden {
                    out.push_str(t);
                }
            }
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

/// Like [`visible_text`] but leaves out nested `<ul>`/`<ol>` children.
pub fn own_text(el: ElementRef) -> String {
    let mut out = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if matches!(e.name(), "ul" | "ol") => {}
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    out.push_str(&visible_text(child));
                }
            }
            _ => {}
        }
    }
    out
}

/// Collapse whitespace runs (NBSP included) to single spaces and trim.
pub fn squash(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `<b>` under `root` whose text is `label`, ignoring a trailing colon.
pub fn find_label<'a>(root: ElementRef<'a>, label: &str) -> Option<ElementRef<'a>> {
    let want = label.trim().trim_end_matches(':');
    root.select(&BOLD)
        .find(|b| squash(&visible_text(*b)).trim_end_matches(':') == want)
}

/// Sibling content after `el` up to the next `<b>` label.
pub fn text_after(el: ElementRef) -> String {
    let mut out = String::new();
    for sib in el.next_siblings() {
        match sib.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if e.name() == "b" => break,
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            Node::Element(_) => {
                if let Some(sib) = ElementRef::wrap(sib) {
                    out.push_str(&visible_text(sib));
                }
            }
            _ => {}
        }
    }
    out
}

/// `Ok` with the squashed text, or `Issue::Missing` when nothing is left.
pub fn non_empty(raw: &str) -> Result<String, Issue> {
    let s = squash(raw);
    if s.is_empty() {
        Err(Issue::Missing)
    } else {
        Ok(s)
    }
}

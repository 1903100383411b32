//! Export rendering: corrected HTML (or raw text) to PDF and DOCX.
//!
//! Both renderers work from the same flattened view of the markup: one
//! block per `p`/`div`/`h1`-`h6`/`li` element, plain text only. Styling and
//! attributes are deliberately not preserved.

use scraper::{ElementRef, Html};

pub mod docx;
pub mod pdf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
    Bullet(String),
}

/// Flatten markup into renderable blocks with a tolerant parser. Elements
/// with no visible text are skipped.
pub fn extract_blocks(html: &str) -> Vec<Block> {
    let fragment = Html::parse_fragment(html);
    let mut blocks = Vec::new();

    for node in fragment.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };

        let name = element.value().name();
        let is_heading_shaped = name
            .strip_prefix('h')
            .map(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false);
        if !matches!(name, "p" | "div" | "li") && !is_heading_shaped {
            continue;
        }

        let text = collect_text(element);
        if text.is_empty() {
            continue;
        }

        let block = match name {
            "li" => Block::Bullet(text),
            "p" | "div" => Block::Paragraph(text),
            // A heading level outside 1-6 degrades to a plain paragraph.
            heading => match heading_level(heading) {
                Some(level) => Block::Heading { level, text },
                None => Block::Paragraph(text),
            },
        };
        blocks.push(block);
    }

    blocks
}

/// Bare fragments get wrapped so renderers always see a full document.
pub fn ensure_html_skeleton(html: &str) -> String {
    if html.contains("<html") {
        html.to_string()
    } else {
        format!("<html><body>{html}</body></html>")
    }
}

fn collect_text(element: ElementRef) -> String {
    let joined = element.text().collect::<String>();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn heading_level(name: &str) -> Option<u8> {
    let level: u8 = name.strip_prefix('h')?.parse().ok()?;
    (1..=6).contains(&level).then_some(level)
}

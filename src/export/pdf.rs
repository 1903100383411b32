use anyhow::{Context, Result};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument};

use super::{ensure_html_skeleton, extract_blocks, Block};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const BODY_SIZE_PT: f32 = 11.0;
const MAX_LINE_CHARS: usize = 90;

/// Render stored HTML (or plain text already wrapped by the caller) into
/// PDF bytes. Layout is intentionally plain: one text line per wrapped
/// line, headings larger, bullets prefixed.
pub fn render(title: &str, html: &str) -> Result<Vec<u8>> {
    let html = ensure_html_skeleton(html);
    let blocks = extract_blocks(&html);

    let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "body");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .context("failed to load builtin font")?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .context("failed to load builtin bold font")?;

    let mut layer_ref = doc.get_page(page).get_layer(layer);
    let mut cursor_mm = PAGE_HEIGHT_MM - MARGIN_MM;

    for block in &blocks {
        let (text, size, font): (&str, f32, &IndirectFontRef) = match block {
            Block::Heading { level, text } => {
                (text.as_str(), 20.0 - f32::from(*level), &bold)
            }
            Block::Paragraph(text) => (text.as_str(), BODY_SIZE_PT, &regular),
            Block::Bullet(text) => (text.as_str(), BODY_SIZE_PT, &regular),
        };
        let prefix = matches!(block, Block::Bullet(_)).then_some("- ").unwrap_or("");
        let line_height = size * 0.5;

        for line in wrap_line(&format!("{prefix}{text}"), MAX_LINE_CHARS) {
            if cursor_mm < MARGIN_MM + line_height {
                let (next_page, next_layer) =
                    doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "body");
                layer_ref = doc.get_page(next_page).get_layer(next_layer);
                cursor_mm = PAGE_HEIGHT_MM - MARGIN_MM;
            }
            layer_ref.use_text(line, size, Mm(MARGIN_MM), Mm(cursor_mm), font);
            cursor_mm -= line_height;
        }
        // Blank gap between blocks.
        cursor_mm -= line_height * 0.5;
    }

    doc.save_to_bytes().context("failed to serialize PDF")
}

fn wrap_line(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

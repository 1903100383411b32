use std::io::Cursor;

use anyhow::{anyhow, Result};
use docx_rs::{
    AbstractNumbering, Docx, IndentLevel, Level, LevelJc, LevelText, NumberFormat, Numbering,
    NumberingId, Paragraph, Run, Start, Style, StyleType,
};

use super::{extract_blocks, Block};

const BULLET_NUMBERING_ID: usize = 1;

/// Render stored HTML into DOCX bytes: a title heading followed by one
/// heading/paragraph/bullet per extracted block.
pub fn render(title: &str, html: &str) -> Result<Vec<u8>> {
    let blocks = extract_blocks(html);

    let mut docx = with_base_styles(Docx::new());
    docx = docx.add_paragraph(styled_paragraph(title, "Title"));

    for block in blocks {
        let paragraph = match block {
            Block::Heading { level, text } => {
                styled_paragraph(&text, &format!("Heading{level}"))
            }
            Block::Paragraph(text) => plain_paragraph(&text),
            Block::Bullet(text) => plain_paragraph(&text).numbering(
                NumberingId::new(BULLET_NUMBERING_ID),
                IndentLevel::new(0),
            ),
        };
        docx = docx.add_paragraph(paragraph);
    }

    let mut cursor = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut cursor)
        .map_err(|err| anyhow!("failed to pack DOCX archive: {err}"))?;
    Ok(cursor.into_inner())
}

fn with_base_styles(docx: Docx) -> Docx {
    let mut docx = docx
        .add_style(
            Style::new("Title", StyleType::Paragraph)
                .name("Title")
                .size(40)
                .bold(),
        )
        .add_abstract_numbering(AbstractNumbering::new(BULLET_NUMBERING_ID).add_level(
            Level::new(
                0,
                Start::new(1),
                NumberFormat::new("bullet"),
                LevelText::new("•"),
                LevelJc::new("left"),
            ),
        ))
        .add_numbering(Numbering::new(BULLET_NUMBERING_ID, BULLET_NUMBERING_ID));

    for level in 1..=6u8 {
        let size = 34 - usize::from(level) * 2;
        docx = docx.add_style(
            Style::new(format!("Heading{level}"), StyleType::Paragraph)
                .name(format!("heading {level}"))
                .size(size)
                .bold(),
        );
    }

    docx
}

fn styled_paragraph(text: &str, style: &str) -> Paragraph {
    Paragraph::new()
        .style(style)
        .add_run(Run::new().add_text(text))
}

fn plain_paragraph(text: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text))
}

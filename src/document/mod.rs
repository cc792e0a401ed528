use anyhow::{Context, Result};
use log::{debug, info, warn};
use lopdf::Document;

use crate::text::prefix_chars;

/// Characters shown in the document preview.
pub const PREVIEW_CHARS: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub text: String,
    pub page_count: usize,
}

/// Parses an in-memory PDF and joins the text of its pages with newlines.
/// Unreadable pages contribute an empty string.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<ExtractedDocument> {
    let doc = Document::load_mem(bytes).context("failed to parse uploaded bytes as a PDF")?;

    let pages: Vec<String> = doc
        .get_pages()
        .into_keys()
        .map(|page_num| match doc.extract_text(&[page_num]) {
            Ok(text) => strip_page_terminator(&text).to_string(),
            Err(e) => {
                warn!("Page {} yielded no text: {}", page_num, e);
                String::new()
            }
        })
        .collect();

    let page_count = pages.len();
    let text = join_pages(pages);
    info!(
        "Extracted {} characters from {} page(s)",
        text.chars().count(),
        page_count
    );
    debug!("Document text starts with: {:?}", prefix_chars(&text, 200));

    Ok(ExtractedDocument { text, page_count })
}

pub fn join_pages<I>(pages: I) -> String
where
    I: IntoIterator<Item = String>,
{
    pages.into_iter().collect::<Vec<_>>().join("\n")
}

// lopdf ends every text object with a newline
fn strip_page_terminator(text: &str) -> &str {
    text.trim_end_matches(|c| c == '\n' || c == '\r')
}

/// Short preview of the cached text, with an ellipsis marking the cut.
pub fn preview(text: &str) -> String {
    format!("{}…", prefix_chars(text, PREVIEW_CHARS))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Builds a PDF with one Helvetica text line per page.
    pub(crate) fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        pdf_with_content_streams(pages.iter().map(|text| pdf_page_stream(text)).collect())
    }

    fn pdf_page_stream(text: &str) -> Vec<u8> {
        Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        }
        .encode()
        .unwrap()
    }

    /// Builds a PDF whose pages use the given raw content streams.
    fn pdf_with_content_streams(streams: Vec<Vec<u8>>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for stream in streams {
            let content_id = doc.add_object(Stream::new(dictionary! {}, stream));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn pages_are_joined_with_newlines() {
        let extracted = extract_pdf_text(&pdf_with_pages(&["A", "B", "C"])).unwrap();
        assert_eq!(extracted.page_count, 3);
        assert_eq!(extracted.text, "A\nB\nC");
    }

    #[test]
    fn unreadable_page_counts_as_empty() {
        let streams = vec![
            pdf_page_stream("A"),
            b"BT ( unclosed [[[ <<".to_vec(),
            pdf_page_stream("C"),
        ];
        let extracted = extract_pdf_text(&pdf_with_content_streams(streams)).unwrap();
        assert_eq!(extracted.page_count, 3);
        assert_eq!(extracted.text, "A\n\nC");
    }

    #[test]
    fn empty_pages_still_take_a_slot() {
        let text = join_pages(vec!["A".to_string(), String::new(), "C".to_string()]);
        assert_eq!(text, "A\n\nC");
        assert_eq!(join_pages(Vec::<String>::new()), "");
    }

    #[test]
    fn non_pdf_bytes_are_rejected() {
        let err = extract_pdf_text(b"definitely not a pdf").unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn preview_is_capped_and_marked() {
        let long = "x".repeat(PREVIEW_CHARS + 50);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 1);
        assert!(shown.ends_with('…'));
        assert_eq!(preview("short"), "short…");
    }

    #[test]
    fn page_terminators_are_stripped() {
        assert_eq!(strip_page_terminator("A\n"), "A");
        assert_eq!(strip_page_terminator("A\r\n\n"), "A");
        assert_eq!(strip_page_terminator("line\nnext"), "line\nnext");
    }
}

//! Test helpers and fixtures.

use std::io::{Cursor, Write as _};

use libreria_core::{Book, BookId, Settings, Theme};
use zip::write::SimpleFileOptions;

pub fn make_book(id: i64, title: &str, file_path: &str) -> Book {
    Book {
        id: BookId(id),
        title: title.to_string(),
        author: "Gabriela Mistral".to_string(),
        category: "Poesía".to_string(),
        description: None,
        language: Some("es".to_string()),
        rating: None,
        is_read: false,
        file_path: file_path.to_string(),
        cover_image_url: None,
    }
}

/// The backend's JSON for `book`.
pub fn book_json(book: &Book) -> serde_json::Value {
    serde_json::json!({
        "id": book.id.0,
        "title": book.title,
        "author": book.author,
        "category": book.category,
        "description": book.description,
        "language": book.language,
        "rating": book.rating,
        "is_read": book.is_read,
        "file_path": book.file_path,
        "cover_image_url": book.cover_image_url,
    })
}

pub fn make_settings(api_url: &str) -> Settings {
    Settings {
        api_url: api_url.to_string(),
        download_dir: String::new(),
        theme: Theme::Dark,
    }
}

/// A minimal EPUB: one XHTML file per chapter body, in spine order.
pub fn build_epub(title: &str, chapters: &[&str]) -> anyhow::Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    writer.start_file("mimetype", options)?;
    writer.write_all(b"application/epub+zip")?;

    writer.start_file("META-INF/container.xml", options)?;
    writer.write_all(
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#,
    )?;

    let mut manifest = String::new();
    let mut spine = String::new();
    for idx in 0..chapters.len() {
        manifest.push_str(&format!(
            r#"<item id="c{idx}" href="c{idx}.xhtml" media-type="application/xhtml+xml"/>"#
        ));
        spine.push_str(&format!(r#"<itemref idref="c{idx}"/>"#));
    }
    writer.start_file("OEBPS/content.opf", options)?;
    write!(
        writer,
        r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{title}</dc:title></metadata>
  <manifest>{manifest}</manifest>
  <spine>{spine}</spine>
</package>"#
    )?;

    for (idx, body) in chapters.iter().enumerate() {
        writer.start_file(format!("OEBPS/c{idx}.xhtml"), options)?;
        write!(
            writer,
            r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><body>{body}</body></html>"#
        )?;
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_settings() {
        let settings = make_settings("http://127.0.0.1:9");
        assert_eq!(settings.api_url, "http://127.0.0.1:9");
        assert_eq!(settings.theme, Theme::Dark);
    }

    #[test]
    fn book_json_round_trips_through_core() -> anyhow::Result<()> {
        let mut book = make_book(5, "Desolación", "/libros/desolacion.pdf");
        book.rating = Some(7.5);
        let parsed: Book = serde_json::from_value(book_json(&book))?;
        assert_eq!(parsed, book);
        Ok(())
    }

    #[test]
    fn epub_fixture_is_a_zip() -> anyhow::Result<()> {
        let bytes = build_epub("Ternura", &["<p>Meciendo</p>"])?;
        assert_eq!(&bytes[..2], b"PK");
        Ok(())
    }
}

//! EPUB engine: turns raw book bytes into reflowed, paginated text.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use anyhow::Context as _;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use unicode_width::UnicodeWidthStr;
use zip::ZipArchive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubBook {
    pub title: Option<String>,
    pub chapters: Vec<Chapter>,
}

/// One screenful of wrapped lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub lines: Vec<String>,
}

/// Pages grouped by chapter; every chapter starts on a fresh page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    pub chapters: Vec<Vec<Page>>,
}

impl Pagination {
    pub fn page(&self, chapter: usize, page: usize) -> Option<&Page> {
        self.chapters.get(chapter)?.get(page)
    }

    pub fn page_counts(&self) -> Vec<usize> {
        self.chapters.iter().map(Vec::len).collect()
    }

    pub fn total_pages(&self) -> usize {
        self.chapters.iter().map(Vec::len).sum()
    }
}

struct ManifestItem {
    href: String,
    media_type: String,
}

impl EpubBook {
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).context("open epub archive")?;

        let container = read_entry(&mut archive, "META-INF/container.xml")?;
        let opf_path = find_rootfile(&container)?;
        let opf = read_entry(&mut archive, &opf_path)?;
        let package = parse_package(&opf).with_context(|| format!("parse {opf_path}"))?;

        let opf_dir = match opf_path.rfind('/') {
            Some(idx) => &opf_path[..idx],
            None => "",
        };

        let mut chapters = Vec::new();
        for idref in &package.spine {
            let Some(item) = package.manifest.get(idref) else {
                tracing::debug!(idref = %idref, "spine entry missing from manifest");
                continue;
            };
            if !is_document(&item.media_type) {
                continue;
            }
            let entry = resolve_href(opf_dir, &item.href);
            let xhtml = match read_entry(&mut archive, &entry) {
                Ok(xhtml) => xhtml,
                Err(err) => {
                    tracing::warn!(entry = %entry, "skip unreadable chapter: {err:#}");
                    continue;
                }
            };
            let text = xhtml_to_text(&xhtml);
            if text.trim().is_empty() {
                continue;
            }
            chapters.push(Chapter { href: entry, text });
        }

        if chapters.is_empty() {
            anyhow::bail!("epub has no readable chapters");
        }

        Ok(Self {
            title: package.title,
            chapters,
        })
    }

    pub fn paginate(&self, width: usize, height: usize) -> Pagination {
        let height = height.max(1);
        let chapters = self
            .chapters
            .iter()
            .map(|chapter| {
                let lines = wrap_preserving_paragraphs(&chapter.text, width);
                let mut pages: Vec<Page> = lines
                    .chunks(height)
                    .map(|chunk| Page {
                        lines: chunk.to_vec(),
                    })
                    .collect();
                if pages.is_empty() {
                    pages.push(Page::default());
                }
                pages
            })
            .collect();
        Pagination { chapters }
    }
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> anyhow::Result<String> {
    let mut file = archive
        .by_name(name)
        .with_context(|| format!("missing {name}"))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)
        .with_context(|| format!("read {name}"))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn is_document(media_type: &str) -> bool {
    matches!(
        media_type,
        "application/xhtml+xml" | "text/html" | "application/x-dtbook+xml"
    )
}

fn find_rootfile(container: &str) -> anyhow::Result<String> {
    let mut reader = Reader::from_str(container);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"full-path" {
                        return Ok(String::from_utf8_lossy(&attr.value).into_owned());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    anyhow::bail!("container.xml has no rootfile")
}

struct Package {
    title: Option<String>,
    manifest: HashMap<String, ManifestItem>,
    spine: Vec<String>,
}

fn parse_package(opf: &str) -> anyhow::Result<Package> {
    let mut reader = Reader::from_str(opf);
    let mut title = None;
    let mut in_title = false;
    let mut manifest = HashMap::new();
    let mut spine = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"title" => in_title = true,
            Event::End(e) if e.local_name().as_ref() == b"title" => in_title = false,
            Event::Text(t) if in_title && title.is_none() => {
                let text = t.unescape().map(|s| s.trim().to_string()).unwrap_or_default();
                if !text.is_empty() {
                    title = Some(text);
                }
            }
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"item" => {
                    let mut id = None;
                    let mut href = None;
                    let mut media_type = String::new();
                    for attr in e.attributes().flatten() {
                        let value = String::from_utf8_lossy(&attr.value).into_owned();
                        match attr.key.local_name().as_ref() {
                            b"id" => id = Some(value),
                            b"href" => href = Some(value),
                            b"media-type" => media_type = value,
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(href)) = (id, href) {
                        manifest.insert(id, ManifestItem { href, media_type });
                    }
                }
                b"itemref" => {
                    let mut idref = None;
                    let mut linear = true;
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"idref" => {
                                idref = Some(String::from_utf8_lossy(&attr.value).into_owned())
                            }
                            b"linear" => linear = attr.value.as_ref() != b"no",
                            _ => {}
                        }
                    }
                    if let Some(idref) = idref.filter(|_| linear) {
                        spine.push(idref);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(Package {
        title,
        manifest,
        spine,
    })
}

/// Joins a manifest href onto the package directory, dropping fragments and
/// resolving `..` segments the way zip entry names expect.
fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let href = urlencoding::decode(href)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| href.to_string());

    let mut parts: Vec<&str> = if href.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|p| !p.is_empty()).collect()
    };
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

const BLOCK_ELEMENTS: &[&[u8]] = &[
    b"p",
    b"div",
    b"h1",
    b"h2",
    b"h3",
    b"h4",
    b"h5",
    b"h6",
    b"li",
    b"blockquote",
    b"section",
    b"article",
    b"tr",
    b"pre",
    b"dt",
    b"dd",
    b"figcaption",
];

const SKIPPED_ELEMENTS: &[&[u8]] = &[b"head", b"script", b"style", b"svg"];

fn xhtml_to_text(xhtml: &str) -> String {
    let mut reader = Reader::from_str(xhtml);
    reader.config_mut().check_end_names = false;

    let mut raw = String::new();
    let mut skip_depth = 0usize;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!("stop parsing chapter at malformed markup: {err}");
                break;
            }
        };
        match event {
            Event::Start(e) => {
                let name = e.local_name();
                if SKIPPED_ELEMENTS.contains(&name.as_ref()) {
                    skip_depth += 1;
                } else if skip_depth == 0 && BLOCK_ELEMENTS.contains(&name.as_ref()) {
                    raw.push_str("\n\n");
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                if SKIPPED_ELEMENTS.contains(&name.as_ref()) {
                    skip_depth = skip_depth.saturating_sub(1);
                } else if skip_depth == 0 && BLOCK_ELEMENTS.contains(&name.as_ref()) {
                    raw.push_str("\n\n");
                }
            }
            Event::Empty(e) if skip_depth == 0 => {
                if e.local_name().as_ref() == b"br" {
                    raw.push('\n');
                }
            }
            Event::Text(t) if skip_depth == 0 => {
                let text = match t.unescape_with(resolve_html_entity) {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&t).into_owned(),
                };
                // Source line breaks are plain whitespace; only <br> and blocks break lines.
                raw.push_str(&text.replace(['\r', '\n'], " "));
            }
            Event::CData(t) if skip_depth == 0 => {
                raw.push_str(&String::from_utf8_lossy(&t).replace(['\r', '\n'], " "));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    normalize_paragraphs(&raw)
}

fn resolve_html_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "nbsp" => Some("\u{a0}"),
        "mdash" => Some("—"),
        "ndash" => Some("–"),
        "hellip" => Some("…"),
        "laquo" => Some("«"),
        "raquo" => Some("»"),
        "lsquo" => Some("‘"),
        "rsquo" => Some("’"),
        "ldquo" => Some("“"),
        "rdquo" => Some("”"),
        "shy" => Some("\u{ad}"),
        "copy" => Some("©"),
        _ => None,
    }
}

/// Collapses whitespace inside paragraphs; paragraphs are separated by one
/// blank line, forced `<br>` breaks survive as single newlines.
fn normalize_paragraphs(raw: &str) -> String {
    let mut out = String::new();
    for block in raw.split("\n\n") {
        let lines = block
            .split('\n')
            .map(normalize_line)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>();
        if lines.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&lines.join("\n"));
    }
    out
}

fn normalize_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last_was_space = false;

    for ch in line.chars() {
        if ch == '\u{00AD}' {
            continue;
        }

        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
            continue;
        }

        out.push(ch);
        last_was_space = false;
    }

    out.trim().to_string()
}

/// Wraps each line of `text` to `max_width` columns, keeping blank lines
/// between paragraphs.
pub fn wrap_preserving_paragraphs(text: &str, max_width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.split('\n') {
        if line.trim().is_empty() {
            out.push(String::new());
            continue;
        }
        out.extend(wrap_text(line, max_width));
    }
    out
}

pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for word in text.split_whitespace() {
        let word_width = UnicodeWidthStr::width(word);
        let sep_width = if current.is_empty() { 0 } else { 1 };

        if current_width + sep_width + word_width <= max_width {
            if !current.is_empty() {
                current.push(' ');
                current_width += 1;
            }
            current.push_str(word);
            current_width += word_width;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }

        if word_width <= max_width {
            current.push_str(word);
            current_width = word_width;
            continue;
        }

        let mut chunk = String::new();
        let mut chunk_width = 0usize;
        for ch in word.chars() {
            let mut buf = [0u8; 4];
            let s = ch.encode_utf8(&mut buf);
            let w = UnicodeWidthStr::width(s);
            if chunk_width + w > max_width && !chunk.is_empty() {
                lines.push(std::mem::take(&mut chunk));
                chunk_width = 0;
            }
            chunk.push(ch);
            chunk_width += w;
        }
        if !chunk.is_empty() {
            current = chunk;
            current_width = chunk_width;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    if lines.is_empty() {
        vec![String::new()]
    } else {
        lines
    }
}

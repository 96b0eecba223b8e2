//! PDF conversion via the poppler utilities.
//!
//! Raster targets render every page with `pdftoppm` and pack the pages into a
//! `<stem>_pages.zip` archive (`page_<n>.<ext>` entries). Text and HTML
//! targets extract text with `pdftotext`.

use std::io::{Cursor, Write};

use cf_core::{AdapterKind, ConversionOutput, DocumentOptions, DocumentTarget, Error, InputFile};
use zip::write::SimpleFileOptions;

use crate::progress::ProgressSender;
use crate::tools::ToolRegistry;
use crate::workspace::Workspace;

/// Base resolution `scale` multiplies.
const BASE_DPI: f32 = 72.0;

/// pdftotext separates pages with a form feed.
const PAGE_BREAK: char = '\u{c}';

pub async fn convert_document(
    tools: &ToolRegistry,
    file: &InputFile,
    options: &DocumentOptions,
    progress: &ProgressSender,
) -> cf_core::Result<ConversionOutput> {
    let workspace = Workspace::create(file).await?;
    let stem = file.base_name();

    match options.target {
        DocumentTarget::Png | DocumentTarget::Jpeg => {
            let archive = render_pages(tools, &workspace, options, progress).await?;
            Ok(ConversionOutput::new(format!("{stem}_pages.zip"), archive))
        }
        DocumentTarget::Text => {
            let pages = extract_text(tools, &workspace).await?;
            progress.send(100.0, "text extracted");
            Ok(ConversionOutput::new(
                format!("{stem}.txt"),
                text_document(&file.name, &pages),
            ))
        }
        DocumentTarget::Html => {
            let pages = extract_text(tools, &workspace).await?;
            progress.send(100.0, "text extracted");
            Ok(ConversionOutput::new(
                format!("{stem}.html"),
                html_document(&file.name, &pages),
            ))
        }
    }
}

async fn render_pages(
    tools: &ToolRegistry,
    workspace: &Workspace,
    options: &DocumentOptions,
    progress: &ProgressSender,
) -> cf_core::Result<Vec<u8>> {
    let pdftoppm = tools.require("pdftoppm")?;
    let ext = options.target.extension();
    let dpi = (BASE_DPI * options.scale).round().max(1.0) as u32;

    let mut cmd = pdftoppm.command();
    cmd.args(["-progress", "-r", &dpi.to_string()]);
    match options.target {
        DocumentTarget::Jpeg => {
            let quality = (options.quality * 100.0).round().clamp(1.0, 100.0) as u32;
            cmd.args(["-jpeg", "-jpegopt", &format!("quality={quality}")]);
        }
        _ => {
            cmd.arg("-png");
        }
    }
    cmd.arg(workspace.input().to_string_lossy().as_ref());
    cmd.arg(workspace.temp_file("page").to_string_lossy().as_ref());

    // `-progress` prints "<page> <last page> <file>" per rendered page.
    cmd.execute_with_stderr_callback(|line| {
        if let Some((done, total)) = parse_page_progress(line) {
            progress.send_fraction(done, total, "rendering pages");
        }
    })
    .await?;

    let pages = workspace.files_with_prefix("page-").await?;
    if pages.is_empty() {
        return Err(Error::adapter(AdapterKind::Document, "pdftoppm rendered no pages"));
    }

    let mut rendered = Vec::with_capacity(pages.len());
    for (index, path) in pages.iter().enumerate() {
        let number = page_number(path).unwrap_or(index as u64 + 1);
        rendered.push((format!("page_{number}.{ext}"), tokio::fs::read(path).await?));
    }
    rendered.sort_by_key(|(name, _)| page_sort_key(name));

    tokio::task::spawn_blocking(move || zip_pages(rendered))
        .await
        .map_err(|e| Error::Internal(format!("page archive task failed: {e}")))?
}

fn zip_pages(pages: Vec<(String, Vec<u8>)>) -> cf_core::Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    // Rendered pages are already compressed images.
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for (name, bytes) in pages {
        zip.start_file(name, options).map_err(Error::archive)?;
        zip.write_all(&bytes)?;
    }
    let cursor = zip.finish().map_err(Error::archive)?;
    Ok(cursor.into_inner())
}

async fn extract_text(tools: &ToolRegistry, workspace: &Workspace) -> cf_core::Result<Vec<String>> {
    let pdftotext = tools.require("pdftotext")?;
    let mut cmd = pdftotext.command();
    cmd.args(["-layout", "-enc", "UTF-8"]);
    cmd.arg(workspace.input().to_string_lossy().as_ref());
    cmd.arg("-");
    let output = cmd.execute().await?;
    Ok(split_pages(&output.stdout_text()))
}

fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(PAGE_BREAK).map(|p| p.trim_end().to_string()).collect();
    // The final form feed leaves an empty trailing segment.
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

fn text_document(source_name: &str, pages: &[String]) -> Vec<u8> {
    let mut text = format!("=== {source_name} ===\n\n");
    for (i, page) in pages.iter().enumerate() {
        text.push_str(&format!("Page {}\n{}\n\n", i + 1, page));
    }
    text.into_bytes()
}

fn html_document(source_name: &str, pages: &[String]) -> Vec<u8> {
    let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_html(source_name)));
    html.push_str(
        "<style>\n\
         body { font-family: Arial, sans-serif; line-height: 1.6; margin: 2rem; }\n\
         .page { margin-bottom: 2rem; padding: 1rem; border: 1px solid #ddd; }\n\
         .page-number { color: #666; font-size: 0.8rem; }\n\
         </style>\n</head>\n<body>\n",
    );
    for (i, page) in pages.iter().enumerate() {
        html.push_str(&format!(
            "<div class=\"page\">\n<div class=\"page-number\">Page {}</div>\n<pre>{}</pre>\n</div>\n",
            i + 1,
            escape_html(page)
        ));
    }
    html.push_str("</body>\n</html>\n");
    html.into_bytes()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn parse_page_progress(line: &str) -> Option<(u64, u64)> {
    let mut parts = line.split_whitespace();
    let done = parts.next()?.parse().ok()?;
    let total = parts.next()?.parse().ok()?;
    Some((done, total))
}

/// `page-07.png` -> 7
fn page_number(path: &std::path::Path) -> Option<u64> {
    let name = path.file_stem()?.to_string_lossy().to_string();
    name.strip_prefix("page-")?.parse().ok()
}

/// `page_12.png` -> 12
fn page_sort_key(entry: &str) -> u64 {
    entry
        .strip_prefix("page_")
        .and_then(|rest| rest.split('.').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

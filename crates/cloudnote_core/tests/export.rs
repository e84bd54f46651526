use cloudnote_core::export::{export_note, ExportFormat};
use std::fs;

const CONTENT: &str = "# Heading\n\n- item <b>bold</b> & more";

#[test]
fn markdown_and_text_keep_content_verbatim() {
    let markdown = export_note("Plan", CONTENT, ExportFormat::Markdown);
    assert_eq!(markdown.file_name, "Plan.md");
    assert_eq!(markdown.mime_type, "text/markdown");
    assert_eq!(markdown.body, CONTENT);

    let text = export_note("Plan", CONTENT, ExportFormat::PlainText);
    assert_eq!(text.file_name, "Plan.txt");
    assert_eq!(text.mime_type, "text/plain");
    assert_eq!(text.body, CONTENT);
}

#[test]
fn html_wraps_escaped_source_in_pre_block() {
    let html = export_note("A <b> & C", CONTENT, ExportFormat::Html);

    assert_eq!(html.mime_type, "text/html");
    assert!(html.body.starts_with("<!DOCTYPE html>"));
    assert!(html.body.contains("<title>A &lt;b&gt; &amp; C</title>"));
    assert!(html.body.contains("<style>"));
    assert!(html
        .body
        .contains("<pre># Heading\n\n- item &lt;b&gt;bold&lt;/b&gt; &amp; more</pre>"));
    assert!(!html.body.contains("<h1>"));
}

#[test]
fn blank_title_exports_as_untitled() {
    let artifact = export_note("   ", "", ExportFormat::Markdown);
    assert_eq!(artifact.file_name, "Untitled.md");
}

#[test]
fn file_name_drops_path_separators() {
    let artifact = export_note("../notes/plan", "", ExportFormat::PlainText);
    assert!(!artifact.file_name.contains('/'));
    assert!(artifact.file_name.ends_with(".txt"));
}

#[test]
fn write_into_creates_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = export_note("Plan", CONTENT, ExportFormat::Markdown);

    let path = artifact.write_into(dir.path()).unwrap();

    assert_eq!(path, dir.path().join("Plan.md"));
    assert_eq!(fs::read_to_string(path).unwrap(), CONTENT);
}

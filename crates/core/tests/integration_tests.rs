//! Integration tests against an installed LibreOffice.
//!
//! These tests require:
//! - LibreOffice installed (soffice in PATH or a standard install location)
//! - Fixtures generated with `cargo run -p fixture-generator`
//!
//! LibreOfficeKit can only be started once per process, so every test
//! shares one engine that is never destroyed.
//!
//! Run with: cargo test --package officekit-core --test integration_tests

#![cfg(unix)]

use officekit_core::{
    DocumentKind, EngineConfig, ExportFormat, LibreOfficeKit, Office, OfficeConfig, OfficeError,
    RenderRequest, UnoCommand,
};
use std::path::PathBuf;
use std::sync::OnceLock;
use tempfile::TempDir;

/// Get the path to the test fixtures directory
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests/fixtures/output")
}

/// Check if LibreOffice is available
fn libreoffice_available() -> bool {
    LibreOfficeKit::find_program_dir(&EngineConfig::default()).is_ok()
}

/// The shared engine, or None if it failed to start.
fn office() -> Option<&'static Office<LibreOfficeKit>> {
    static OFFICE: OnceLock<Option<Office<LibreOfficeKit>>> = OnceLock::new();
    OFFICE
        .get_or_init(|| {
            let office = Office::libreoffice(OfficeConfig::default()).ok()?;
            match office.initialize(&EngineConfig::default()) {
                Ok(()) => Some(office),
                Err(e) => {
                    eprintln!("LibreOfficeKit failed to start: {}", e);
                    None
                }
            }
        })
        .as_ref()
}

/// Skip test if dependencies are not available
macro_rules! require_deps {
    () => {{
        if !libreoffice_available() {
            eprintln!("Skipping test: LibreOffice not found");
            return;
        }
        match office() {
            Some(office) => office,
            None => {
                eprintln!("Skipping test: LibreOfficeKit did not start");
                return;
            }
        }
    }};
}

macro_rules! fixture {
    ($name:expr) => {{
        let fixture = fixtures_dir().join($name);
        if !fixture.exists() {
            eprintln!("Skipping test: fixture not found at {:?}", fixture);
            return;
        }
        fixture
    }};
}

// ============================================================================
// Engine Tests
// ============================================================================

#[test]
fn test_initialize_is_idempotent() {
    let office = require_deps!();
    office.initialize(&EngineConfig::default()).unwrap();
    assert!(office.is_ready());
}

#[test]
fn test_version_info() {
    let office = require_deps!();
    let version = office.version_info().unwrap().expect("version info");
    assert!(!version.product_name.is_empty());
    eprintln!("Engine: {} {}", version.product_name, version.product_version);
}

#[test]
fn test_second_engine_cannot_start() {
    let _office = require_deps!();
    let other = Office::libreoffice(OfficeConfig::default()).unwrap();
    assert!(matches!(
        other.initialize(&EngineConfig::default()),
        Err(OfficeError::EngineStartFailed { .. })
    ));
}

// ============================================================================
// Document Tests
// ============================================================================

#[test]
fn test_open_nonexistent_fails_with_message() {
    let office = require_deps!();
    let result = office.open_document("/nonexistent/dir/missing.docx");
    match result {
        Err(OfficeError::OpenFailed { message, .. }) => assert!(!message.is_empty()),
        other => panic!("Expected OpenFailed, got {:?}", other),
    }
}

#[test]
fn test_open_corrupt_fails() {
    let office = require_deps!();
    let fixture = fixture!("corrupt.docx");
    let result = office.open_document(&fixture);
    match result {
        Ok(session) => {
            // Some builds import garbage as plain text
            eprintln!("Corrupt file opened as {:?}", session.kind());
            session.close();
        }
        Err(e) => eprintln!("Corrupt file rejected: {}", e),
    }
}

#[test]
fn test_paged_docx_properties() {
    let office = require_deps!();
    let fixture = fixture!("paged.docx");

    let session = office.open_document(&fixture).unwrap();
    assert_eq!(session.kind().unwrap(), DocumentKind::Text);
    assert!(session.width().unwrap() > 0);
    assert!(session.height().unwrap() > 0);
    assert!(session.page_count().unwrap() >= 1);
    assert!(session.close());
    assert!(!session.close());
}

#[test]
fn test_sheets_xlsx_parts() {
    let office = require_deps!();
    let fixture = fixture!("sheets.xlsx");

    let session = office.open_document(&fixture).unwrap();
    assert_eq!(session.kind().unwrap(), DocumentKind::Spreadsheet);
    assert_eq!(session.page_count().unwrap(), 3);
    assert_eq!(session.page_name(1).unwrap().as_deref(), Some("Q2"));

    session.set_current_page(2).unwrap();
    assert_eq!(session.current_page().unwrap(), 2);
    session.close();
}

#[test]
fn test_render_sheet() {
    let office = require_deps!();
    let fixture = fixture!("sheets.xlsx");

    let session = office.open_document(&fixture).unwrap();
    let image = session.render_page(200, 150, 2).unwrap();
    assert_eq!((image.width(), image.height()), (200, 150));
    assert_eq!(session.current_page().unwrap(), 2);
    session.close();
}

#[test]
fn test_select_all_text() {
    let office = require_deps!();
    let fixture = fixture!("simple.docx");

    let session = office.open_document(&fixture).unwrap();
    session.execute_command(UnoCommand::SelectAll, None).unwrap();
    match session.selected_text().unwrap() {
        Some(text) => assert!(text.contains("Hello, World!")),
        None => eprintln!("Engine returned no selection"),
    }
    session.close();
}

// ============================================================================
// Conversion Tests
// ============================================================================

#[test]
fn test_convert_docx_to_pdf_and_reopen() {
    let office = require_deps!();
    let fixture = fixture!("paged.docx");
    let temp_dir = TempDir::new().unwrap();
    let pdf = temp_dir.path().join("paged.pdf");

    office.convert(&fixture, &pdf, ExportFormat::Pdf).unwrap();
    let bytes = std::fs::read(&pdf).unwrap();
    assert!(bytes.starts_with(b"%PDF"));

    let reopened = office.open_document(&pdf).unwrap();
    assert!(reopened.page_count().unwrap() >= 1);
    reopened.close();
}

#[test]
fn test_convert_invalid_input_leaves_no_output() {
    let office = require_deps!();
    let temp_dir = TempDir::new().unwrap();
    let pdf = temp_dir.path().join("missing.pdf");

    assert!(!office.convert_lossy("/nonexistent/missing.docx", &pdf, ExportFormat::Pdf));
    assert!(!pdf.exists());
}

#[tokio::test]
async fn test_render_to_png_async() {
    let office = require_deps!();
    let fixture = fixture!("paged.docx");
    let temp_dir = TempDir::new().unwrap();

    let request = RenderRequest::new(&fixture, temp_dir.path(), 170, 220);
    let result = office.render_to_png_async(request).await.unwrap();
    assert_eq!(result.output_paths.len(), result.page_count);
    for path in &result.output_paths {
        assert!(path.exists(), "PNG file should exist: {:?}", path);
    }
}

//! In-memory engine for tests and dry runs.
//!
//! Documents are small JSON files describing their kind, size and parts.
//! Saving as PDF writes a `%PDF` header line followed by the same JSON, so a
//! converted file can be opened again. Every page paints a solid colour
//! derived from its index, and all engine activity is counted in
//! [`MockStats`].

use crate::config::EngineConfig;
use crate::engine::{Backend, DocumentHandle, Engine, TileMode};
use crate::error::{OfficeError, Result};
use crate::lock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PDF_HEADER: &str = "%PDF-1.7 mock";

/// Contents of a mock document file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockContent {
    /// Engine type code (0 text, 1 spreadsheet, 2 presentation, 3 drawing).
    pub kind: i32,
    /// Width in twips.
    pub width: i64,
    /// Height in twips.
    pub height: i64,
    /// Part names.
    pub parts: Vec<String>,
    /// Initial text selection.
    #[serde(default)]
    pub selection: Option<String>,
}

impl MockContent {
    /// A presentation with `slides` 10in x 7.5in slides.
    pub fn presentation(slides: usize) -> Self {
        Self {
            kind: 2,
            width: 14400,
            height: 10800,
            parts: (1..=slides).map(|i| format!("Slide {}", i)).collect(),
            selection: None,
        }
    }

    /// A text document with `pages` US Letter pages.
    pub fn text(pages: usize) -> Self {
        Self {
            kind: 0,
            width: 12240,
            height: 15840,
            parts: (1..=pages).map(|i| format!("Page {}", i)).collect(),
            selection: None,
        }
    }

    /// A spreadsheet with the given sheet names.
    pub fn spreadsheet(sheets: &[&str]) -> Self {
        Self {
            kind: 1,
            width: 20000,
            height: 8000,
            parts: sheets.iter().map(|s| s.to_string()).collect(),
            selection: None,
        }
    }

    pub fn with_selection(mut self, text: impl Into<String>) -> Self {
        self.selection = Some(text.into());
        self
    }

    /// Write this content to `path` as a loadable document.
    pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    fn parse(contents: &str) -> std::result::Result<Self, String> {
        let json = match contents.strip_prefix(PDF_HEADER) {
            Some(rest) => rest.trim_start(),
            None => contents,
        };
        serde_json::from_str(json).map_err(|e| format!("General input/output error: {}", e))
    }
}

/// Colour painted for a page, as RGBA.
pub fn page_color(page_index: usize) -> [u8; 4] {
    [(40 + page_index * 60 % 200) as u8, 100, 200, 255]
}

/// Arguments of one `paint_tile` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintCall {
    pub part: i32,
    pub canvas_width: i32,
    pub canvas_height: i32,
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_width: i32,
    pub tile_height: i32,
}

/// Arguments of one `save_as` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveCall {
    pub path: String,
    pub format: String,
    pub filter_options: Option<String>,
}

/// Counters and call logs shared by a mock backend and everything it creates.
#[derive(Debug, Default)]
pub struct MockStats {
    engines_started: AtomicUsize,
    engines_destroyed: AtomicUsize,
    documents_loaded: AtomicUsize,
    documents_destroyed: AtomicUsize,
    fail_next_start: AtomicBool,
    fail_saves: AtomicBool,
    load_delay_ms: AtomicU64,
    paints: Mutex<Vec<PaintCall>>,
    saves: Mutex<Vec<SaveCall>>,
    commands: Mutex<Vec<(String, Option<String>)>>,
    load_options: Mutex<Vec<Option<String>>>,
}

impl MockStats {
    pub fn engines_started(&self) -> usize {
        self.engines_started.load(Ordering::SeqCst)
    }

    pub fn engines_destroyed(&self) -> usize {
        self.engines_destroyed.load(Ordering::SeqCst)
    }

    pub fn documents_loaded(&self) -> usize {
        self.documents_loaded.load(Ordering::SeqCst)
    }

    pub fn documents_destroyed(&self) -> usize {
        self.documents_destroyed.load(Ordering::SeqCst)
    }

    /// Documents loaded and not yet destroyed.
    pub fn live_documents(&self) -> usize {
        self.documents_loaded() - self.documents_destroyed()
    }

    /// Make the next `start` fail.
    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    /// Make every save write a truncated file and report failure.
    pub fn fail_saves(&self, enabled: bool) {
        self.fail_saves.store(enabled, Ordering::SeqCst);
    }

    /// Make every load take at least `delay`.
    pub fn slow_loads(&self, delay: Duration) {
        self.load_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn paints(&self) -> Vec<PaintCall> {
        lock(&self.paints).clone()
    }

    pub fn saves(&self) -> Vec<SaveCall> {
        lock(&self.saves).clone()
    }

    pub fn commands(&self) -> Vec<(String, Option<String>)> {
        lock(&self.commands).clone()
    }

    pub fn load_options(&self) -> Vec<Option<String>> {
        lock(&self.load_options).clone()
    }
}

/// Backend producing [`MockEngine`]s.
#[derive(Debug, Clone)]
pub struct MockBackend {
    stats: Arc<MockStats>,
    tile_mode: TileMode,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(MockStats::default()),
            tile_mode: TileMode::Rgba,
        }
    }

    /// Paint tiles in the given byte order.
    pub fn with_tile_mode(mut self, mode: TileMode) -> Self {
        self.tile_mode = mode;
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

impl Backend for MockBackend {
    type Engine = MockEngine;

    fn start(&self, _config: &EngineConfig) -> Result<MockEngine> {
        if self.stats.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(OfficeError::EngineStartFailed {
                message: "mock engine refused to start".to_string(),
            });
        }
        self.stats.engines_started.fetch_add(1, Ordering::SeqCst);
        Ok(MockEngine {
            stats: Arc::clone(&self.stats),
            error: Arc::new(Mutex::new(None)),
            tile_mode: self.tile_mode,
        })
    }
}

/// Mock engine instance.
#[derive(Debug)]
pub struct MockEngine {
    stats: Arc<MockStats>,
    error: Arc<Mutex<Option<String>>>,
    tile_mode: TileMode,
}

impl Engine for MockEngine {
    type Document = MockDocument;

    fn load_document(&mut self, path: &str, options: Option<&str>) -> Option<MockDocument> {
        lock(&self.stats.load_options).push(options.map(str::to_string));

        let delay = self.stats.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Unsupported URL <{}>: {}", path, e))
            .and_then(|contents| MockContent::parse(&contents));

        match content {
            Ok(content) => {
                *lock(&self.error) = None;
                self.stats.documents_loaded.fetch_add(1, Ordering::SeqCst);
                Some(MockDocument {
                    selection: content.selection.clone(),
                    content,
                    current: 0,
                    stats: Arc::clone(&self.stats),
                    error: Arc::clone(&self.error),
                    tile_mode: self.tile_mode,
                })
            }
            Err(message) => {
                *lock(&self.error) = Some(message);
                None
            }
        }
    }

    fn last_error(&mut self) -> Option<String> {
        lock(&self.error).clone()
    }

    fn version_info(&mut self) -> Option<String> {
        Some(
            r#"{"ProductName":"MockOffice","ProductVersion":"24.8","ProductExtension":"","BuildId":"mock"}"#
                .to_string(),
        )
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.stats.engines_destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Mock document handle.
#[derive(Debug)]
pub struct MockDocument {
    content: MockContent,
    current: i32,
    selection: Option<String>,
    stats: Arc<MockStats>,
    error: Arc<Mutex<Option<String>>>,
    tile_mode: TileMode,
}

impl DocumentHandle for MockDocument {
    fn document_type(&mut self) -> i32 {
        self.content.kind
    }

    fn document_size(&mut self) -> (i64, i64) {
        (self.content.width, self.content.height)
    }

    fn parts(&mut self) -> i32 {
        self.content.parts.len() as i32
    }

    fn part(&mut self) -> i32 {
        self.current
    }

    fn set_part(&mut self, part: i32) {
        if part >= 0 && (part as usize) < self.content.parts.len() {
            self.current = part;
        }
    }

    fn part_name(&mut self, part: i32) -> Option<String> {
        usize::try_from(part)
            .ok()
            .and_then(|i| self.content.parts.get(i).cloned())
    }

    fn initialize_for_rendering(&mut self, _arguments: Option<&str>) {}

    fn tile_mode(&mut self) -> i32 {
        match self.tile_mode {
            TileMode::Rgba => 0,
            TileMode::Bgra => 1,
        }
    }

    fn paint_tile(
        &mut self,
        buffer: &mut [u8],
        canvas_width: i32,
        canvas_height: i32,
        tile_x: i32,
        tile_y: i32,
        tile_width: i32,
        tile_height: i32,
    ) {
        lock(&self.stats.paints).push(PaintCall {
            part: self.current,
            canvas_width,
            canvas_height,
            tile_x,
            tile_y,
            tile_width,
            tile_height,
        });

        let [r, g, b, a] = page_color(self.current as usize);
        let pixel = match self.tile_mode {
            TileMode::Rgba => [r, g, b, a],
            TileMode::Bgra => [b, g, r, a],
        };
        for chunk in buffer.chunks_exact_mut(4) {
            chunk.copy_from_slice(&pixel);
        }
    }

    fn post_uno_command(&mut self, command: &str, arguments: Option<&str>, _notify: bool) {
        lock(&self.stats.commands).push((command.to_string(), arguments.map(str::to_string)));
        if command == ".uno:SelectAll" {
            self.selection = Some(self.content.parts.join("\n"));
        }
    }

    fn text_selection(&mut self, mime_type: &str) -> Option<String> {
        if mime_type.starts_with("text/plain") {
            self.selection.clone()
        } else {
            None
        }
    }

    fn save_as(&mut self, path: &str, format: &str, filter_options: Option<&str>) -> bool {
        lock(&self.stats.saves).push(SaveCall {
            path: path.to_string(),
            format: format.to_string(),
            filter_options: filter_options.map(str::to_string),
        });

        let body = match serde_json::to_string(&self.content) {
            Ok(body) => body,
            Err(e) => {
                *lock(&self.error) = Some(e.to_string());
                return false;
            }
        };
        let contents = if format == "pdf" {
            format!("{}\n{}", PDF_HEADER, body)
        } else {
            body
        };

        if self.stats.fail_saves.load(Ordering::SeqCst) {
            let partial = &contents[..contents.len() / 2];
            let _ = std::fs::write(path, partial);
            *lock(&self.error) = Some(format!("Write error while exporting to {}", path));
            return false;
        }

        match std::fs::write(path, contents) {
            Ok(()) => true,
            Err(e) => {
                *lock(&self.error) = Some(format!("Write error: {}", e));
                false
            }
        }
    }
}

impl Drop for MockDocument {
    fn drop(&mut self) {
        self.stats.documents_destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_round_trips_through_pdf_header() {
        let content = MockContent::presentation(3);
        let contents = format!("{}\n{}", PDF_HEADER, serde_json::to_string(&content).unwrap());
        assert_eq!(MockContent::parse(&contents).unwrap(), content);
    }

    #[test]
    fn test_load_missing_file_sets_error() {
        let backend = MockBackend::new();
        let mut engine = backend.start(&EngineConfig::default()).unwrap();
        assert!(engine.load_document("/nonexistent/deck.odp", None).is_none());
        let error = engine.last_error().unwrap();
        assert!(error.contains("/nonexistent/deck.odp"));
    }

    #[test]
    fn test_drop_counts() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        MockContent::text(2).write_to(&path).unwrap();

        let backend = MockBackend::new();
        let stats = backend.stats();
        {
            let mut engine = backend.start(&EngineConfig::default()).unwrap();
            let doc = engine.load_document(path.to_str().unwrap(), None);
            assert!(doc.is_some());
            assert_eq!(stats.live_documents(), 1);
        }
        assert_eq!(stats.live_documents(), 0);
        assert_eq!(stats.engines_destroyed(), 1);
    }

    #[test]
    fn test_paint_fills_in_tile_mode_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        MockContent::text(1).write_to(&path).unwrap();

        let backend = MockBackend::new().with_tile_mode(TileMode::Bgra);
        let mut engine = backend.start(&EngineConfig::default()).unwrap();
        let mut doc = engine.load_document(path.to_str().unwrap(), None).unwrap();

        let mut buffer = vec![0u8; 8];
        doc.paint_tile(&mut buffer, 2, 1, 0, 0, 12240, 15840);
        let [r, g, b, a] = page_color(0);
        assert_eq!(&buffer[..4], &[b, g, r, a]);
        assert_eq!(&buffer[4..], &[b, g, r, a]);
    }
}

//! Traits describing the external document engine.
//!
//! The engine owns all parsing, layout, rendering and filter logic. This
//! crate only drives it through the handful of verbs below. [`Backend`]
//! starts an [`Engine`], the engine loads [`DocumentHandle`]s, and dropping
//! either value destroys the native object behind it.

use crate::config::EngineConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Factory for engine instances.
pub trait Backend: Send + Sync + 'static {
    /// Engine type produced by this backend.
    type Engine: Engine;

    /// Start a new engine from the given platform context.
    fn start(&self, config: &EngineConfig) -> Result<Self::Engine>;
}

/// A live engine instance. Dropping it destroys the engine.
pub trait Engine: Send + 'static {
    /// Document handle type produced by this engine.
    type Document: DocumentHandle;

    /// Load a document. Returns None on failure; the cause is then
    /// available from [`Engine::last_error`].
    fn load_document(&mut self, path: &str, options: Option<&str>) -> Option<Self::Document>;

    /// Last error recorded by the engine, if any.
    fn last_error(&mut self) -> Option<String>;

    /// Engine version information as a JSON string.
    fn version_info(&mut self) -> Option<String>;
}

/// Per-document engine state. Dropping it destroys the document.
///
/// Geometry is in twips (1/20 of a point). Parts are pages, sheets or
/// slides depending on the document kind.
pub trait DocumentHandle: Send + 'static {
    /// Raw document type code.
    fn document_type(&mut self) -> i32;

    /// Document width and height in twips.
    fn document_size(&mut self) -> (i64, i64);

    /// Number of parts.
    fn parts(&mut self) -> i32;

    /// Index of the active part.
    fn part(&mut self) -> i32;

    /// Make `part` the active part.
    fn set_part(&mut self, part: i32);

    /// Name of the given part.
    fn part_name(&mut self, part: i32) -> Option<String>;

    /// Prepare rendering state for the active part.
    fn initialize_for_rendering(&mut self, arguments: Option<&str>);

    /// Raw tile byte-order code.
    fn tile_mode(&mut self) -> i32;

    /// Paint the source rectangle `(tile_x, tile_y, tile_width, tile_height)`
    /// (twips) into `buffer`, a `canvas_width * canvas_height * 4` byte region.
    #[allow(clippy::too_many_arguments)]
    fn paint_tile(
        &mut self,
        buffer: &mut [u8],
        canvas_width: i32,
        canvas_height: i32,
        tile_x: i32,
        tile_y: i32,
        tile_width: i32,
        tile_height: i32,
    );

    /// Dispatch a UNO command.
    fn post_uno_command(&mut self, command: &str, arguments: Option<&str>, notify: bool);

    /// Current selection converted to `mime_type`.
    fn text_selection(&mut self, mime_type: &str) -> Option<String>;

    /// Write the document. Returns true on success.
    fn save_as(&mut self, path: &str, format: &str, filter_options: Option<&str>) -> bool;
}

/// Kind of a loaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Text,
    Spreadsheet,
    Presentation,
    Drawing,
    Other,
}

impl DocumentKind {
    /// Map an engine type code. Unknown codes map to `Other`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => DocumentKind::Text,
            1 => DocumentKind::Spreadsheet,
            2 => DocumentKind::Presentation,
            3 => DocumentKind::Drawing,
            _ => DocumentKind::Other,
        }
    }
}

/// Byte order of painted tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileMode {
    Rgba,
    Bgra,
}

impl TileMode {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => TileMode::Bgra,
            _ => TileMode::Rgba,
        }
    }
}

/// Target format for `save_as` and conversions.
///
/// The filter identifiers are the engine's filter names and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    Odt,
    Ods,
    Odp,
    Png,
    Jpg,
}

impl ExportFormat {
    /// Every supported export format.
    pub const ALL: [ExportFormat; 9] = [
        ExportFormat::Pdf,
        ExportFormat::Docx,
        ExportFormat::Xlsx,
        ExportFormat::Pptx,
        ExportFormat::Odt,
        ExportFormat::Ods,
        ExportFormat::Odp,
        ExportFormat::Png,
        ExportFormat::Jpg,
    ];

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pptx => "pptx",
            ExportFormat::Odt => "odt",
            ExportFormat::Ods => "ods",
            ExportFormat::Odp => "odp",
            ExportFormat::Png => "png",
            ExportFormat::Jpg => "jpg",
        }
    }

    /// Engine filter identifier.
    pub fn filter(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "MS Word 2007 XML",
            ExportFormat::Xlsx => "Calc MS Excel 2007 XML",
            ExportFormat::Pptx => "Impress MS PowerPoint 2007 XML",
            ExportFormat::Odt => "writer8",
            ExportFormat::Ods => "calc8",
            ExportFormat::Odp => "impress8",
            ExportFormat::Png => "png",
            ExportFormat::Jpg => "jpg",
        }
    }

    /// Look up a format by file extension (case-insensitive, `jpeg` accepted).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.');
        if ext.eq_ignore_ascii_case("jpeg") {
            return Some(ExportFormat::Jpg);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Formatting and editing commands understood by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnoCommand {
    Bold,
    Italic,
    Underline,
    Strikeout,
    AlignLeft,
    AlignCenter,
    AlignRight,
    AlignJustify,
    Copy,
    Cut,
    Paste,
    Undo,
    Redo,
    SelectAll,
    /// Any other command, with or without the `.uno:` prefix.
    Custom(String),
}

impl UnoCommand {
    pub fn as_str(&self) -> &str {
        match self {
            UnoCommand::Bold => ".uno:Bold",
            UnoCommand::Italic => ".uno:Italic",
            UnoCommand::Underline => ".uno:Underline",
            UnoCommand::Strikeout => ".uno:Strikeout",
            UnoCommand::AlignLeft => ".uno:LeftPara",
            UnoCommand::AlignCenter => ".uno:CenterPara",
            UnoCommand::AlignRight => ".uno:RightPara",
            UnoCommand::AlignJustify => ".uno:JustifyPara",
            UnoCommand::Copy => ".uno:Copy",
            UnoCommand::Cut => ".uno:Cut",
            UnoCommand::Paste => ".uno:Paste",
            UnoCommand::Undo => ".uno:Undo",
            UnoCommand::Redo => ".uno:Redo",
            UnoCommand::SelectAll => ".uno:SelectAll",
            UnoCommand::Custom(name) => name,
        }
    }

    /// Command string as dispatched, always carrying the `.uno:` prefix.
    pub fn dispatch_name(&self) -> String {
        normalize_command(self.as_str())
    }
}

impl From<&str> for UnoCommand {
    fn from(s: &str) -> Self {
        UnoCommand::Custom(s.to_string())
    }
}

pub(crate) fn normalize_command(command: &str) -> String {
    if command.starts_with(".uno:") {
        command.to_string()
    } else {
        format!(".uno:{}", command)
    }
}

//! Configuration and request/result types for officekit.

use crate::engine::ExportFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Platform context used to start the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// LibreOffice `program` directory (the one containing `soffice`).
    /// If None, well-known locations and PATH are searched.
    pub install_dir: Option<PathBuf>,

    /// User profile directory. If None, a temporary profile is created
    /// for the lifetime of the engine.
    pub user_profile: Option<PathBuf>,

    /// Options passed with every document load (e.g. `Language=en-US`).
    pub load_options: Option<String>,
}

impl EngineConfig {
    /// Create a config pointing at an explicit install directory.
    pub fn with_install_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    /// Use a persistent user profile directory.
    pub fn user_profile(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_profile = Some(dir.into());
        self
    }

    /// Set default load options.
    pub fn load_options(mut self, options: impl Into<String>) -> Self {
        self.load_options = Some(options.into());
        self
    }
}

/// Configuration for tile rendering and PNG output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Number of threads for parallel PNG encoding.
    /// Default: number of CPU cores.
    pub render_threads: usize,

    /// PNG compression level (0-9, higher = smaller file, slower).
    /// Default: 6.
    pub png_compression: u8,

    /// Keep the engine's alpha channel instead of flattening.
    /// Default: false.
    pub use_alpha: bool,

    /// Background color for transparent areas (if not using alpha).
    /// Default: white (255, 255, 255).
    pub background_color: (u8, u8, u8),

    /// Largest accepted tile edge in pixels.
    /// Default: 16384.
    pub max_dimension: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            render_threads: num_cpus::get(),
            png_compression: 6,
            use_alpha: false,
            background_color: (255, 255, 255),
            max_dimension: 16384,
        }
    }
}

impl RenderConfig {
    /// Set the number of encoding threads.
    pub fn render_threads(mut self, threads: usize) -> Self {
        self.render_threads = threads;
        self
    }

    /// Set PNG compression level.
    pub fn png_compression(mut self, level: u8) -> Self {
        self.png_compression = level.min(9);
        self
    }

    /// Enable alpha channel.
    pub fn use_alpha(mut self, enabled: bool) -> Self {
        self.use_alpha = enabled;
        self
    }

    /// Set the background color used when flattening.
    pub fn background_color(mut self, rgb: (u8, u8, u8)) -> Self {
        self.background_color = rgb;
        self
    }

    /// Set the largest accepted tile edge.
    pub fn max_dimension(mut self, pixels: u32) -> Self {
        self.max_dimension = pixels;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.render_threads == 0 {
            return Err(crate::error::OfficeError::InvalidConfig(
                "render_threads must be at least 1".to_string(),
            ));
        }
        if self.max_dimension == 0 {
            return Err(crate::error::OfficeError::InvalidConfig(
                "max_dimension must be at least 1".to_string(),
            ));
        }
        if self.max_dimension > i32::MAX as u32 {
            return Err(crate::error::OfficeError::InvalidConfig(format!(
                "max_dimension must not exceed {}",
                i32::MAX
            )));
        }
        Ok(())
    }
}

/// Combined configuration for the office manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficeConfig {
    /// Render configuration.
    pub render: RenderConfig,

    /// Write conversions to a temporary sibling file and rename on success.
    /// Default: true.
    pub atomic_save: bool,
}

impl Default for OfficeConfig {
    fn default() -> Self {
        Self {
            render: RenderConfig::default(),
            atomic_save: true,
        }
    }
}

impl OfficeConfig {
    /// Set the render configuration.
    pub fn render(mut self, render: RenderConfig) -> Self {
        self.render = render;
        self
    }

    /// Enable or disable atomic conversion output.
    pub fn atomic_save(mut self, enabled: bool) -> Self {
        self.atomic_save = enabled;
        self
    }

    /// Validate the entire configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.render.validate()
    }
}

/// A single format conversion request.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Path to the input document.
    pub input_path: PathBuf,

    /// Path of the file to write.
    pub output_path: PathBuf,

    /// Target format.
    pub format: ExportFormat,
}

impl ConversionRequest {
    /// Create a new conversion request.
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        format: ExportFormat,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            format,
        }
    }

    /// Convert to PDF next to the input, replacing its extension.
    pub fn to_pdf(input_path: impl Into<PathBuf>) -> Self {
        let input_path = input_path.into();
        let output_path = input_path.with_extension(ExportFormat::Pdf.extension());
        Self {
            input_path,
            output_path,
            format: ExportFormat::Pdf,
        }
    }
}

/// A request to rasterize every page of a document to PNG files.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Path to the input document.
    pub input_path: PathBuf,

    /// Directory to write output PNGs.
    pub output_dir: PathBuf,

    /// Tile width in pixels.
    pub width: u32,

    /// Tile height in pixels.
    pub height: u32,

    /// Optional prefix for output filenames.
    /// Default: input filename without extension.
    pub output_prefix: Option<String>,
}

impl RenderRequest {
    /// Create a new render request.
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_dir: output_dir.into(),
            width,
            height,
            output_prefix: None,
        }
    }

    /// Set a custom output prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = Some(prefix.into());
        self
    }

    /// Get the output prefix, defaulting to the input filename.
    pub fn get_output_prefix(&self) -> String {
        self.output_prefix.clone().unwrap_or_else(|| {
            self.input_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output")
                .to_string()
        })
    }
}

/// Result of a batch conversion.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Successfully converted files.
    pub successful: Vec<FileResult>,

    /// Failed conversions.
    pub failed: Vec<FailedFile>,

    /// Total processing time.
    pub total_duration: Duration,
}

impl BatchResult {
    /// Check if every request succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result for a single successfully processed file.
#[derive(Debug, Clone)]
pub struct FileResult {
    /// Original input path.
    pub input_path: PathBuf,

    /// Written output paths.
    pub output_paths: Vec<PathBuf>,

    /// Number of pages in the source document (0 if not queried).
    pub page_count: usize,

    /// Processing time for this file.
    pub duration: Duration,
}

/// Information about a failed request.
#[derive(Debug, Clone)]
pub struct FailedFile {
    /// Original input path.
    pub input_path: PathBuf,

    /// Error message.
    pub error: String,
}

use crate::error::{IngestError, Result};
use bytes::Bytes;
use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use std::io::Cursor;
use tracing::debug;

/// Content type of every rendered page
pub const PAGE_CONTENT_TYPE: &str = "image/png";

/// One rendered page of a document
#[derive(Debug, Clone)]
pub struct RasterPage {
    /// 1-based position in the document
    pub ordinal: u32,
    /// Output file name, e.g. `report_0001.png`
    pub file_name: String,
    /// PNG-encoded image
    pub bytes: Bytes,
}

impl RasterPage {
    pub fn content_type(&self) -> &'static str {
        PAGE_CONTENT_TYPE
    }
}

/// File name of a rendered page: base name plus 4-digit ordinal
pub fn page_file_name(base_name: &str, ordinal: u32) -> String {
    format!("{base_name}_{ordinal:04}.png")
}

/// Opens PDF documents held in memory
pub trait PageRasterizer: Send + Sync {
    /// Parse the document once; every page is rendered from the returned handle
    fn open<'a>(&'a self, pdf: &'a [u8]) -> Result<Box<dyn RasterDocument + 'a>>;
}

/// An opened document
#[cfg_attr(test, mockall::automock)]
pub trait RasterDocument: Send {
    fn page_count(&self) -> u32;

    /// Render the page at a 1-based ordinal to PNG bytes
    fn render_page(&self, ordinal: u32, scale: f32) -> Result<Vec<u8>>;
}

/// Open a document and return a lazy sequence over its rendered pages.
///
/// Fails with `DocumentOpen` before anything is rendered when the bytes are
/// not a readable PDF.
pub fn rasterize<'a>(
    rasterizer: &'a dyn PageRasterizer,
    pdf: &'a [u8],
    base_name: &'a str,
    scale: f32,
) -> Result<RasterPages<'a>> {
    if pdf.is_empty() {
        return Err(IngestError::DocumentOpen("document is empty".to_string()));
    }

    let document = rasterizer.open(pdf)?;
    RasterPages::new(document, base_name, scale)
}

/// Pages of one document, rendered on demand in page order.
///
/// Stops after the first render error.
pub struct RasterPages<'a> {
    document: Box<dyn RasterDocument + 'a>,
    base_name: &'a str,
    scale: f32,
    page_count: u32,
    next_ordinal: u32,
}

impl<'a> RasterPages<'a> {
    fn new(document: Box<dyn RasterDocument + 'a>, base_name: &'a str, scale: f32) -> Result<Self> {
        let page_count = document.page_count();
        if page_count == 0 {
            return Err(IngestError::DocumentOpen("document has no pages".to_string()));
        }

        Ok(Self {
            document,
            base_name,
            scale,
            page_count,
            next_ordinal: 1,
        })
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }
}

impl Iterator for RasterPages<'_> {
    type Item = Result<RasterPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_ordinal > self.page_count {
            return None;
        }

        let ordinal = self.next_ordinal;
        match self.document.render_page(ordinal, self.scale) {
            Ok(png) => {
                self.next_ordinal += 1;
                Some(Ok(RasterPage {
                    ordinal,
                    file_name: page_file_name(self.base_name, ordinal),
                    bytes: Bytes::from(png),
                }))
            }
            Err(e) => {
                self.next_ordinal = self.page_count + 1;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.page_count + 1).saturating_sub(self.next_ordinal) as usize;
        (0, Some(remaining))
    }
}

/// Renders pages with Google PDFium.
///
/// The library is bound once, when the renderer is created.
pub struct PdfiumRasterizer {
    pdfium: Pdfium,
}

impl PdfiumRasterizer {
    /// Bind the PDFium library.
    ///
    /// Discovery order:
    /// 1. The configured library path
    /// 2. Alongside the running executable
    /// 3. System library search paths
    pub fn new(library_path: Option<String>) -> Result<Self> {
        Ok(Self {
            pdfium: load_pdfium(library_path.as_deref())?,
        })
    }
}

fn load_pdfium(library_path: Option<&str>) -> Result<Pdfium> {
    if let Some(path) = library_path {
        debug!(path = %path, "Loading PDFium from configured path");
        let bindings = Pdfium::bind_to_library(path).map_err(|e| {
            IngestError::DocumentOpen(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
    {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(&exe_dir);
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %exe_dir.display(), "Loaded PDFium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| IngestError::DocumentOpen(format!("PDFium library not found: {e}")))?;
    Ok(Pdfium::new(bindings))
}

impl PageRasterizer for PdfiumRasterizer {
    fn open<'a>(&'a self, pdf: &'a [u8]) -> Result<Box<dyn RasterDocument + 'a>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| IngestError::DocumentOpen(e.to_string()))?;
        Ok(Box::new(PdfiumDocument { document }))
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl RasterDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> u32 {
        u32::from(self.document.pages().len())
    }

    fn render_page(&self, ordinal: u32, scale: f32) -> Result<Vec<u8>> {
        let render_error = |reason: String| IngestError::PageRender {
            page: ordinal,
            reason,
        };

        let index = ordinal
            .checked_sub(1)
            .and_then(|i| PdfPageIndex::try_from(i).ok())
            .ok_or_else(|| render_error(format!("page ordinal {ordinal} out of range")))?;

        let page = self
            .document
            .pages()
            .get(index)
            .map_err(|e| render_error(format!("page lookup failed: {e}")))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| render_error(format!("rendering failed: {e}")))?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| render_error(format!("PNG encoding failed: {e}")))?;

        let png = cursor.into_inner();
        debug!(page = ordinal, png_size = png.len(), "Rendered PDF page to PNG");
        Ok(png)
    }
}

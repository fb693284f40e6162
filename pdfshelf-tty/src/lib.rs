//! Terminal front end: kitty graphics output for rendered pages, a
//! stacked-page view with a scrollable viewport, and the key-event mapper
//! with its modal input states.

use std::io::Write;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    terminal::{Clear, ClearType},
};
use pdfshelf_core::{CatalogEntry, PageExtent, PixelSurface, ViewMetrics, ViewSurface};
use png::{BitDepth, ColorType, Encoder};

/// Vertical gap between stacked pages, in pixels.
const PAGE_GAP: f32 = 12.0;

pub struct KittyRenderer<W: Write> {
    writer: W,
    next_image_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            next_image_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn draw(&mut self, surface: &PixelSurface, params: DrawParams) -> Result<()> {
        let image_id = self.next_image_id;
        self.next_image_id = self.next_image_id.wrapping_add(1).max(1);

        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, surface.width, surface.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&surface.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},c={},r={},s={},v={},z=-1,m={}",
                    image_id,
                    params.columns,
                    params.rows,
                    surface.width,
                    surface.height,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Deletes every image placement currently on screen.
    pub fn delete_images(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,q=2\u{1b}\\")?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

/// Terminal cell grid and its pixel dimensions, as reported by the
/// terminal's window-size query.
#[derive(Debug, Clone, Copy)]
pub struct CellGeometry {
    pub columns: u32,
    pub rows: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl CellGeometry {
    pub fn cell_width(&self) -> f32 {
        self.pixel_width as f32 / self.columns.max(1) as f32
    }

    pub fn cell_height(&self) -> f32 {
        self.pixel_height as f32 / self.rows.max(1) as f32
    }
}

/// The display surface the coordinator renders into: a vertical column of
/// page rasters with a pixel-space viewport over it, plus the status
/// indicators and the catalog/bookmark list snapshots the overlays show.
pub struct TtyView<W: Write + Send> {
    renderer: KittyRenderer<W>,
    geometry: CellGeometry,
    pages: Vec<(u32, PixelSurface)>,
    scroll_top: f32,
    page_indicator: (u32, u32),
    zoom_percent: f32,
    catalog: Vec<CatalogEntry>,
    bookmarks: Vec<u32>,
    message: Option<String>,
    dirty: bool,
}

impl<W: Write + Send> TtyView<W> {
    pub fn new(writer: W, geometry: CellGeometry) -> Self {
        Self {
            renderer: KittyRenderer::new(writer),
            geometry,
            pages: Vec::new(),
            scroll_top: 0.0,
            page_indicator: (0, 0),
            zoom_percent: 100.0,
            catalog: Vec::new(),
            bookmarks: Vec::new(),
            message: None,
            dirty: true,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        self.renderer.writer()
    }

    pub fn set_geometry(&mut self, geometry: CellGeometry) {
        self.geometry = geometry;
        self.clamp_scroll();
        self.dirty = true;
    }

    pub fn geometry(&self) -> CellGeometry {
        self.geometry
    }

    pub fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    /// Moves the viewport and returns the clamped scroll position.
    pub fn scroll_by(&mut self, delta: f32) -> f32 {
        self.scroll_top += delta;
        self.clamp_scroll();
        self.dirty = true;
        self.scroll_top
    }

    pub fn catalog_entries(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    pub fn bookmark_pages(&self) -> &[u32] {
        &self.bookmarks
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }

    pub fn status_line(&self) -> Option<String> {
        let (current, total) = self.page_indicator;
        if total == 0 {
            return None;
        }
        Some(format!(
            "page {}/{} \u{2014} {:.0}%",
            current, total, self.zoom_percent
        ))
    }

    /// Draws the visible band of the page column plus the status line.
    pub fn present(&mut self, status: Option<&str>) -> Result<()> {
        self.renderer.begin_sync_update()?;
        self.renderer.delete_images()?;
        self.renderer.clear_all()?;

        let cell_width = self.geometry.cell_width().max(1.0);
        let cell_height = self.geometry.cell_height().max(1.0);
        let image_rows_available = self.geometry.rows.saturating_sub(1).max(1);
        let viewport_top = self.scroll_top;
        let viewport_bottom = viewport_top + self.metrics().viewport_height;

        let extents = self.extents();
        for (extent, (_, surface)) in extents.iter().zip(self.pages.iter()) {
            let page_top = extent.top;
            let page_bottom = extent.top + extent.height;
            if page_bottom <= viewport_top || page_top >= viewport_bottom {
                continue;
            }

            let visible_top = viewport_top.max(page_top);
            let visible_bottom = viewport_bottom.min(page_bottom);
            let origin_y = (visible_top - page_top).round().max(0.0) as u32;
            let band_height = (visible_bottom - visible_top).round().max(1.0) as u32;
            let band = crop_surface(surface, origin_y, band_height);
            if band.width == 0 || band.height == 0 {
                continue;
            }

            let draw_cols = ((band.width as f32 / cell_width).round() as u32)
                .clamp(1, self.geometry.columns.max(1));
            let draw_rows = ((band.height as f32 / cell_height).round() as u32)
                .clamp(1, image_rows_available);
            let start_col = (self.geometry.columns.saturating_sub(draw_cols)) / 2;
            let screen_row = (((visible_top - viewport_top) / cell_height).round() as u32)
                .min(image_rows_available.saturating_sub(1));

            {
                let writer = self.renderer.writer();
                crossterm::execute!(
                    writer,
                    cursor::MoveTo(start_col as u16, screen_row as u16)
                )?;
            }
            self.renderer
                .draw(&band, DrawParams::clamped(draw_cols, draw_rows))?;
        }

        if let Some(status) = status {
            let status_row = self.geometry.rows.saturating_sub(1);
            let writer = self.renderer.writer();
            crossterm::execute!(
                writer,
                cursor::MoveTo(0, status_row as u16),
                Clear(ClearType::CurrentLine)
            )?;
            write!(writer, "{}", status)?;
        }

        self.renderer.end_sync_update()?;
        Ok(())
    }

    fn extents(&self) -> Vec<PageExtent> {
        let mut extents = Vec::with_capacity(self.pages.len());
        let mut top = 0.0_f32;
        for (page, surface) in &self.pages {
            let height = surface.height as f32;
            extents.push(PageExtent {
                page: *page,
                top,
                height,
            });
            top += height + PAGE_GAP;
        }
        extents
    }

    fn content_height(&self) -> f32 {
        self.extents()
            .last()
            .map(|extent| extent.top + extent.height)
            .unwrap_or(0.0)
    }

    fn clamp_scroll(&mut self) {
        let max_scroll = (self.content_height() - self.metrics().viewport_height).max(0.0);
        self.scroll_top = self.scroll_top.clamp(0.0, max_scroll);
    }
}

impl<W: Write + Send> ViewSurface for TtyView<W> {
    fn metrics(&self) -> ViewMetrics {
        let cell_height = self.geometry.cell_height();
        ViewMetrics {
            container_width: self.geometry.pixel_width as f32,
            viewport_height: (self.geometry.pixel_height as f32 - cell_height).max(1.0),
            pixel_ratio: 1.0,
        }
    }

    fn clear_pages(&mut self) {
        self.pages.clear();
        self.scroll_top = 0.0;
        self.dirty = true;
    }

    fn append_page(&mut self, page: u32, surface: PixelSurface) {
        self.pages.push((page, surface));
        self.dirty = true;
    }

    fn page_extents(&self) -> Vec<PageExtent> {
        self.extents()
    }

    fn scroll_to_page(&mut self, page: u32) {
        if let Some(extent) = self.extents().iter().find(|extent| extent.page == page) {
            self.scroll_top = extent.top;
            self.clamp_scroll();
            self.dirty = true;
        }
    }

    fn set_page_indicator(&mut self, current: u32, total: u32) {
        self.page_indicator = (current, total);
        self.dirty = true;
    }

    fn set_zoom_indicator(&mut self, zoom: f32) {
        self.zoom_percent = zoom * 100.0;
        self.dirty = true;
    }

    fn show_catalog(&mut self, entries: &[CatalogEntry]) {
        self.catalog = entries.to_vec();
        self.dirty = true;
    }

    fn show_bookmarks(&mut self, pages: &[u32]) {
        self.bookmarks = pages.to_vec();
        self.dirty = true;
    }

    fn notify(&mut self, message: &str) {
        self.message = Some(message.to_string());
        self.dirty = true;
    }
}

fn crop_surface(surface: &PixelSurface, origin_y: u32, height: u32) -> PixelSurface {
    if surface.width == 0 || surface.height == 0 {
        return PixelSurface {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
    }

    let height = height.min(surface.height).max(1);
    let origin_y = origin_y.min(surface.height.saturating_sub(height));
    if origin_y == 0 && height == surface.height {
        return surface.clone();
    }

    let stride = surface.width as usize * 4;
    let start = origin_y as usize * stride;
    let end = start + height as usize * stride;

    PixelSurface {
        width: surface.width,
        height,
        pixels: surface.pixels[start..end].to_vec(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    NextPage { count: u32 },
    PrevPage { count: u32 },
    FirstPage,
    LastPage,
    ZoomIn,
    ZoomOut,
    ScrollBy { delta: f32 },
    ToggleBookmark,
    OpenLibrary,
    OpenBookmarks,
    CloseOverlay,
    MoveSelection { delta: isize },
    ActivateSelection,
    RemoveSelection,
    AddFiles,
    RequestCloseAll,
    ConfirmCloseAll,
    CancelConfirm,
    FilterChanged { term: String },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Library,
    Bookmarks,
    Confirm,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<u32>,
    pending_digits: String,
    mode: InputMode,
    filter_active: bool,
    filter_buffer: String,
}

impl EventMapper {
    pub const SCROLL_STEP: f32 = 60.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.filter_active = false;
            if !matches!(mode, InputMode::Library) {
                self.filter_buffer.clear();
            }
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Library => self.map_event_library(event),
            InputMode::Bookmarks => self.map_event_bookmarks(event),
            InputMode::Confirm => self.map_event_confirm(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                    if let Some(digit) = c.to_digit(10) {
                        self.push_digit(digit);
                    }
                    UiEvent::None
                }
                (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                    let count = self.take_count();
                    UiEvent::NextPage { count }
                }
                (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                    let count = self.take_count();
                    UiEvent::PrevPage { count }
                }
                (KeyCode::Char('J'), KeyModifiers::SHIFT) => {
                    let count = self.take_count();
                    UiEvent::ScrollBy {
                        delta: Self::SCROLL_STEP * count as f32,
                    }
                }
                (KeyCode::Char('K'), KeyModifiers::SHIFT) => {
                    let count = self.take_count();
                    UiEvent::ScrollBy {
                        delta: -Self::SCROLL_STEP * count as f32,
                    }
                }
                (KeyCode::PageDown, _) => {
                    let count = self.take_count();
                    UiEvent::ScrollBy {
                        delta: 10.0 * Self::SCROLL_STEP * count as f32,
                    }
                }
                (KeyCode::PageUp, _) => {
                    let count = self.take_count();
                    UiEvent::ScrollBy {
                        delta: -10.0 * Self::SCROLL_STEP * count as f32,
                    }
                }
                (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                    self.reset_count();
                    UiEvent::FirstPage
                }
                (KeyCode::Char('G'), KeyModifiers::SHIFT) | (KeyCode::End, _) => {
                    self.reset_count();
                    UiEvent::LastPage
                }
                (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => {
                    self.reset_count();
                    UiEvent::ZoomIn
                }
                (KeyCode::Char('-'), _) => {
                    self.reset_count();
                    UiEvent::ZoomOut
                }
                (KeyCode::Char('b'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::ToggleBookmark
                }
                (KeyCode::Char('B'), KeyModifiers::SHIFT) => {
                    self.reset_count();
                    UiEvent::OpenBookmarks
                }
                (KeyCode::Char('o'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::OpenLibrary
                }
                (KeyCode::Char('a'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::AddFiles
                }
                (KeyCode::Char('q'), _) => {
                    self.reset_count();
                    UiEvent::Quit
                }
                _ => {
                    self.reset_count();
                    UiEvent::None
                }
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_library(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };

        if self.filter_active {
            return match (code, modifiers) {
                (KeyCode::Esc, _) => {
                    self.filter_active = false;
                    self.filter_buffer.clear();
                    UiEvent::FilterChanged {
                        term: String::new(),
                    }
                }
                (KeyCode::Enter, _) => {
                    self.filter_active = false;
                    UiEvent::None
                }
                (KeyCode::Backspace, _) => {
                    self.filter_buffer.pop();
                    UiEvent::FilterChanged {
                        term: self.filter_buffer.clone(),
                    }
                }
                (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                    self.filter_buffer.push(c);
                    UiEvent::FilterChanged {
                        term: self.filter_buffer.clone(),
                    }
                }
                _ => UiEvent::None,
            };
        }

        match (code, modifiers) {
            (KeyCode::Char('/'), KeyModifiers::NONE) => {
                self.filter_active = true;
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                UiEvent::MoveSelection { delta: 1 }
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                UiEvent::MoveSelection { delta: -1 }
            }
            (KeyCode::Enter, _) => UiEvent::ActivateSelection,
            (KeyCode::Char('x'), KeyModifiers::NONE) | (KeyCode::Char('d'), KeyModifiers::NONE) => {
                UiEvent::RemoveSelection
            }
            (KeyCode::Char('a'), KeyModifiers::NONE) => UiEvent::AddFiles,
            (KeyCode::Char('D'), KeyModifiers::SHIFT) => {
                self.mode = InputMode::Confirm;
                UiEvent::RequestCloseAll
            }
            (KeyCode::Esc, _) | (KeyCode::Char('o'), KeyModifiers::NONE) => UiEvent::CloseOverlay,
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            _ => UiEvent::None,
        }
    }

    fn map_event_bookmarks(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                    UiEvent::MoveSelection { delta: 1 }
                }
                (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                    UiEvent::MoveSelection { delta: -1 }
                }
                (KeyCode::Enter, _) => UiEvent::ActivateSelection,
                (KeyCode::Char('x'), KeyModifiers::NONE)
                | (KeyCode::Char('d'), KeyModifiers::NONE) => UiEvent::RemoveSelection,
                (KeyCode::Esc, _) | (KeyCode::Char('B'), KeyModifiers::SHIFT) => {
                    UiEvent::CloseOverlay
                }
                (KeyCode::Char('q'), _) => UiEvent::Quit,
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_confirm(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent { code, .. }) => {
                self.mode = InputMode::Library;
                match code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => UiEvent::ConfirmCloseAll,
                    _ => UiEvent::CancelConfirm,
                }
            }
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: u32) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> u32 {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.filter_active {
            return Some(format!("/{}", self.filter_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn surface(width: u32, height: u32) -> PixelSurface {
        PixelSurface {
            width,
            height,
            pixels: vec![255; (width * height * 4) as usize],
        }
    }

    fn geometry() -> CellGeometry {
        CellGeometry {
            columns: 80,
            rows: 24,
            pixel_width: 800,
            pixel_height: 480,
        }
    }

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        renderer
            .draw(&surface(1, 1), DrawParams::clamped(10, 5))
            .unwrap();
        let output = renderer.writer;
        assert_eq!(output[0], 0x1b);
        assert_eq!(output[1], b'_');
        assert_eq!(output[2], b'G');
    }

    #[test]
    fn stacked_pages_report_extents_with_gaps() {
        let mut view = TtyView::new(Vec::new(), geometry());
        view.append_page(1, surface(600, 400));
        view.append_page(2, surface(600, 400));

        let extents = view.page_extents();
        assert_eq!(extents.len(), 2);
        assert_eq!(extents[0].page, 1);
        assert!((extents[0].top - 0.0).abs() < f32::EPSILON);
        assert!((extents[1].top - (400.0 + PAGE_GAP)).abs() < f32::EPSILON);
    }

    #[test]
    fn scroll_to_page_clamps_to_scrollable_range() {
        let mut view = TtyView::new(Vec::new(), geometry());
        view.append_page(1, surface(600, 400));
        view.append_page(2, surface(600, 400));
        view.append_page(3, surface(600, 400));

        // Content is 1224px tall, the viewport 460px, so scrolling stops at
        // 764 even though page 3 starts at 824.
        view.scroll_to_page(3);
        assert!((view.scroll_top() - 764.0).abs() < 0.5);
    }

    #[test]
    fn scroll_by_clamps_at_both_ends() {
        let mut view = TtyView::new(Vec::new(), geometry());
        view.append_page(1, surface(600, 400));

        assert_eq!(view.scroll_by(-50.0), 0.0);
        let bottom = view.scroll_by(10_000.0);
        assert_eq!(view.scroll_by(10_000.0), bottom);
    }

    #[test]
    fn clearing_pages_resets_scroll_position() {
        let mut view = TtyView::new(Vec::new(), geometry());
        view.append_page(1, surface(600, 2000));
        view.scroll_by(500.0);
        view.clear_pages();
        assert_eq!(view.scroll_top(), 0.0);
        assert!(view.page_extents().is_empty());
    }

    #[test]
    fn crop_surface_extracts_requested_band() {
        let full = surface(2, 4);
        let band = crop_surface(&full, 1, 2);
        assert_eq!(band.width, 2);
        assert_eq!(band.height, 2);
        assert_eq!(band.pixels.len(), 2 * 2 * 4);
    }

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn event_mapper_uses_numeric_prefix_for_next_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('1'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('2'))), UiEvent::None);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::NextPage { count: 12 }
        );
    }

    #[test]
    fn event_mapper_resets_prefix_after_use() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('3'))), UiEvent::None);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('k'))),
            UiEvent::PrevPage { count: 3 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('k'))),
            UiEvent::PrevPage { count: 1 }
        );
    }

    #[test]
    fn event_mapper_drops_prefix_on_other_command() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('4'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('q'))), UiEvent::Quit);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::NextPage { count: 1 }
        );
    }

    #[test]
    fn event_mapper_pending_input_shows_digits_until_consumed() {
        let mut mapper = EventMapper::new();
        assert!(mapper.pending_input().is_none());
        mapper.map_event(key_event(KeyCode::Char('1')));
        mapper.map_event(key_event(KeyCode::Char('2')));
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        mapper.map_event(key_event(KeyCode::Char('j')));
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_numeric_prefix_scales_scroll_distance() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('3')));
        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('J'),
            KeyModifiers::SHIFT,
        )) {
            UiEvent::ScrollBy { delta } => {
                assert!((delta - 3.0 * EventMapper::SCROLL_STEP).abs() < f32::EPSILON)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_maps_zoom_and_bookmark_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('+'))), UiEvent::ZoomIn);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('-'))), UiEvent::ZoomOut);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('b'))),
            UiEvent::ToggleBookmark
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('B'),
                KeyModifiers::SHIFT
            )),
            UiEvent::OpenBookmarks
        );
    }

    #[test]
    fn event_mapper_library_mode_maps_navigation_keys() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Library);

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::MoveSelection { delta: 1 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('k'))),
            UiEvent::MoveSelection { delta: -1 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::ActivateSelection
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('x'))),
            UiEvent::RemoveSelection
        );
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::CloseOverlay);
    }

    #[test]
    fn event_mapper_library_filter_collects_input() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Library);

        assert_eq!(mapper.map_event(key_event(KeyCode::Char('/'))), UiEvent::None);
        assert_eq!(mapper.pending_input().as_deref(), Some("/"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('f'))),
            UiEvent::FilterChanged {
                term: "f".to_string()
            }
        );
        assert_eq!(mapper.pending_input().as_deref(), Some("/f"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Backspace)),
            UiEvent::FilterChanged {
                term: String::new()
            }
        );

        mapper.map_event(key_event(KeyCode::Char('g')));
        assert_eq!(mapper.map_event(key_event(KeyCode::Enter)), UiEvent::None);
        assert!(mapper.pending_input().is_none());

        // Filter entry is done; j moves the selection again.
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::MoveSelection { delta: 1 }
        );
    }

    #[test]
    fn event_mapper_escape_clears_filter() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Library);
        mapper.map_event(key_event(KeyCode::Char('/')));
        mapper.map_event(key_event(KeyCode::Char('a')));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::FilterChanged {
                term: String::new()
            }
        );
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_close_all_requires_confirmation() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Library);

        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('D'),
                KeyModifiers::SHIFT
            )),
            UiEvent::RequestCloseAll
        );
        assert_eq!(mapper.mode(), InputMode::Confirm);

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('y'))),
            UiEvent::ConfirmCloseAll
        );
        assert_eq!(mapper.mode(), InputMode::Library);
    }

    #[test]
    fn event_mapper_confirm_mode_cancels_on_any_other_key() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Library);
        mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('D'),
            KeyModifiers::SHIFT,
        ));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('n'))),
            UiEvent::CancelConfirm
        );
        assert_eq!(mapper.mode(), InputMode::Library);
    }

    #[test]
    fn event_mapper_switching_modes_clears_pending_state() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('1')));
        assert_eq!(mapper.pending_input().as_deref(), Some("1"));

        mapper.set_mode(InputMode::Library);
        assert!(mapper.pending_input().is_none());
        mapper.set_mode(InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }
}

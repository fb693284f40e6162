use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, Event};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use pdfshelf_core::{CatalogEntry, Coordinator, FilePicker, ViewSurface, ViewerConfig};
use pdfshelf_render::PdfiumDocumentLoader;
use pdfshelf_store::{FileBookmarkStore, FileCatalogStore};
use pdfshelf_tty::{CellGeometry, EventMapper, InputMode, TtyView, UiEvent};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

type TerminalCoordinator = Coordinator<TtyView<io::Stdout>>;

#[derive(Debug, Parser)]
#[command(
    name = "pdfshelf",
    version,
    about = "kitty-native PDF library and viewer"
)]
struct Args {
    /// PDF files to add to the library before the viewer starts
    files: Vec<PathBuf>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

/// Native file-open dialog restricted to PDF files. Cancellation yields an
/// empty batch.
struct RfdFilePicker;

#[async_trait::async_trait]
impl FilePicker for RfdFilePicker {
    async fn pick_files(&self) -> Vec<CatalogEntry> {
        let picked = rfd::AsyncFileDialog::new()
            .add_filter("PDF documents", &["pdf"])
            .pick_files()
            .await;
        picked
            .map(|handles| {
                handles
                    .into_iter()
                    .map(|handle| CatalogEntry::new(handle.path().to_path_buf()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfshelf", "pdfshelf")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let data_dir = project_dirs.data_local_dir().to_path_buf();
    let config = ViewerConfig::load_or_default(&data_dir.join("config.toml"));
    let state_dir = data_dir.join("state");
    let catalog_store = Arc::new(FileCatalogStore::new(&state_dir)?);
    let bookmark_store = Arc::new(FileBookmarkStore::new(&state_dir)?);
    let loader = Arc::new(PdfiumDocumentLoader::new()?);

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;

    let view = TtyView::new(io::stdout(), query_geometry()?);
    let mut coordinator =
        Coordinator::new(catalog_store, bookmark_store, loader, config, view);
    coordinator.initialize().await;

    if !args.files.is_empty() {
        let candidates = args.files.iter().map(CatalogEntry::new).collect();
        coordinator.add_files(candidates).await;
        let first = args.files[0].clone();
        if let Err(err) = coordinator.open_document(&first).await {
            warn!(error = %err, path = %first.display(), "failed to open document from arguments");
        }
    }

    let picker = RfdFilePicker;
    let mut event_mapper = EventMapper::new();
    let mut overlay = Overlay::None;
    let mut dirty = true;

    loop {
        if coordinator.view_mut().take_dirty() {
            dirty = true;
        }
        if dirty {
            let pending = event_mapper.pending_input();
            redraw(&mut coordinator, &mut overlay, pending.as_deref())?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(100))? {
            let ev = event::read()?;
            if let Event::Resize(..) = ev {
                coordinator.view_mut().set_geometry(query_geometry()?);
                coordinator.on_container_resize().await;
                dirty = true;
                continue;
            }
            let ui_event = event_mapper.map_event(ev);
            match handle_event(
                ui_event,
                &mut coordinator,
                &mut overlay,
                &mut event_mapper,
                &picker,
            )
            .await?
            {
                LoopAction::Quit => break,
                LoopAction::Continue => {}
            }
            dirty = true;
        }
    }

    {
        let writer = coordinator.view_mut().writer();
        crossterm::execute!(writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    }

    Ok(())
}

enum LoopAction {
    Continue,
    Quit,
}

enum Overlay {
    None,
    Library(ListWindow<CatalogEntry>),
    Bookmarks(ListWindow<u32>),
    Confirm,
}

/// A scrollable selection list shown over the page column.
struct ListWindow<T> {
    entries: Vec<T>,
    selected: usize,
    scroll_offset: usize,
}

impl<T> ListWindow<T> {
    fn new(entries: Vec<T>) -> Self {
        Self {
            entries,
            selected: 0,
            scroll_offset: 0,
        }
    }

    fn with_selection(entries: Vec<T>, selected: usize) -> Self {
        let selected = selected.min(entries.len().saturating_sub(1));
        Self {
            entries,
            selected,
            scroll_offset: 0,
        }
    }

    fn selected_entry(&self) -> Option<&T> {
        self.entries.get(self.selected)
    }

    fn move_selection(&mut self, delta: isize) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let len = self.entries.len() as isize;
        let next = (self.selected as isize + delta).clamp(0, len - 1) as usize;
        if next != self.selected {
            self.selected = next;
            true
        } else {
            false
        }
    }

    fn ensure_visible(&mut self, viewport_height: usize) {
        if viewport_height == 0 || self.entries.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        let max_offset = self.entries.len().saturating_sub(viewport_height.max(1));
        if self.scroll_offset > max_offset {
            self.scroll_offset = max_offset;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
            return;
        }
        let bottom = self.scroll_offset + viewport_height;
        if self.selected >= bottom {
            self.scroll_offset = self
                .selected
                .saturating_sub(viewport_height.saturating_sub(1));
        }
    }
}

fn library_window(coordinator: &TerminalCoordinator) -> ListWindow<CatalogEntry> {
    ListWindow::new(coordinator.view().catalog_entries().to_vec())
}

fn bookmark_window(coordinator: &TerminalCoordinator) -> ListWindow<u32> {
    ListWindow::new(coordinator.view().bookmark_pages().to_vec())
}

async fn handle_event(
    event: UiEvent,
    coordinator: &mut TerminalCoordinator,
    overlay: &mut Overlay,
    mapper: &mut EventMapper,
    picker: &RfdFilePicker,
) -> Result<LoopAction> {
    match event {
        UiEvent::NextPage { count } => {
            let target = coordinator
                .session()
                .map(|s| s.current_page.saturating_add(count).min(s.page_count));
            if let Some(page) = target {
                coordinator.go_to_page(page);
            }
        }
        UiEvent::PrevPage { count } => {
            let target = coordinator
                .session()
                .map(|s| s.current_page.saturating_sub(count).max(1));
            if let Some(page) = target {
                coordinator.go_to_page(page);
            }
        }
        UiEvent::FirstPage => coordinator.go_to_page(1),
        UiEvent::LastPage => {
            let last = coordinator.session().map(|s| s.page_count);
            if let Some(page) = last {
                coordinator.go_to_page(page);
            }
        }
        UiEvent::ZoomIn => coordinator.zoom_in().await,
        UiEvent::ZoomOut => coordinator.zoom_out().await,
        UiEvent::ScrollBy { delta } => {
            let scroll_top = coordinator.view_mut().scroll_by(delta);
            coordinator.on_user_scroll(scroll_top);
        }
        UiEvent::ToggleBookmark => {
            let target = coordinator
                .session()
                .map(|s| (s.path.clone(), s.current_page));
            if let Some((path, page)) = target {
                if coordinator.bookmarks_for(&path).contains(&page) {
                    coordinator.remove_bookmark(page).await;
                } else {
                    coordinator.bookmark_current_page().await;
                }
            }
        }
        UiEvent::OpenLibrary => {
            *overlay = Overlay::Library(library_window(coordinator));
            mapper.set_mode(InputMode::Library);
        }
        UiEvent::OpenBookmarks => {
            if coordinator.session().is_some() {
                *overlay = Overlay::Bookmarks(bookmark_window(coordinator));
                mapper.set_mode(InputMode::Bookmarks);
            }
        }
        UiEvent::CloseOverlay => {
            *overlay = Overlay::None;
            mapper.set_mode(InputMode::Normal);
        }
        UiEvent::MoveSelection { delta } => match overlay {
            Overlay::Library(window) => {
                window.move_selection(delta);
            }
            Overlay::Bookmarks(window) => {
                window.move_selection(delta);
            }
            _ => {}
        },
        UiEvent::ActivateSelection => {
            let mut open_path = None;
            let mut goto_page = None;
            match &*overlay {
                Overlay::Library(window) => {
                    open_path = window.selected_entry().map(|entry| entry.path.clone());
                }
                Overlay::Bookmarks(window) => {
                    goto_page = window.selected_entry().copied();
                }
                _ => {}
            }
            if let Some(path) = open_path {
                match coordinator.open_document(&path).await {
                    Ok(()) => {
                        *overlay = Overlay::None;
                        mapper.set_mode(InputMode::Normal);
                    }
                    Err(err) => {
                        warn!(error = %err, path = %path.display(), "failed to open document");
                        coordinator
                            .view_mut()
                            .notify(&format!("failed to open {}", path.display()));
                    }
                }
            } else if let Some(page) = goto_page {
                coordinator.go_to_page(page);
                *overlay = Overlay::None;
                mapper.set_mode(InputMode::Normal);
            }
        }
        UiEvent::RemoveSelection => {
            let mut remove_path = None;
            let mut remove_page = None;
            let mut selected = 0;
            match &*overlay {
                Overlay::Library(window) => {
                    remove_path = window.selected_entry().map(|entry| entry.path.clone());
                    selected = window.selected;
                }
                Overlay::Bookmarks(window) => {
                    remove_page = window.selected_entry().copied();
                    selected = window.selected;
                }
                _ => {}
            }
            if let Some(path) = remove_path {
                coordinator.remove_entry(&path).await;
                *overlay = Overlay::Library(ListWindow::with_selection(
                    coordinator.view().catalog_entries().to_vec(),
                    selected,
                ));
            } else if let Some(page) = remove_page {
                coordinator.remove_bookmark(page).await;
                *overlay = Overlay::Bookmarks(ListWindow::with_selection(
                    coordinator.view().bookmark_pages().to_vec(),
                    selected,
                ));
            }
        }
        UiEvent::AddFiles => {
            coordinator.pick_and_add(picker).await;
            if matches!(overlay, Overlay::Library(_)) {
                *overlay = Overlay::Library(library_window(coordinator));
            }
        }
        UiEvent::RequestCloseAll => {
            *overlay = Overlay::Confirm;
        }
        UiEvent::ConfirmCloseAll => {
            coordinator.close_all().await;
            *overlay = Overlay::Library(library_window(coordinator));
        }
        UiEvent::CancelConfirm => {
            *overlay = Overlay::Library(library_window(coordinator));
        }
        UiEvent::FilterChanged { term } => {
            coordinator.set_filter(&term);
            if matches!(overlay, Overlay::Library(_)) {
                *overlay = Overlay::Library(library_window(coordinator));
            }
        }
        UiEvent::Quit => return Ok(LoopAction::Quit),
        UiEvent::None => {}
    }
    Ok(LoopAction::Continue)
}

fn redraw(
    coordinator: &mut TerminalCoordinator,
    overlay: &mut Overlay,
    pending_input: Option<&str>,
) -> Result<()> {
    let message = coordinator.view_mut().take_message();
    let status = combine_status(
        session_status(coordinator),
        message.as_deref(),
        pending_input,
    );
    coordinator.view_mut().present(status.as_deref())?;
    draw_overlay(coordinator.view_mut(), overlay)?;
    Ok(())
}

fn session_status(coordinator: &TerminalCoordinator) -> Option<String> {
    let indicator = coordinator.view().status_line()?;
    let name = coordinator
        .session()
        .and_then(|session| session.path.file_name())
        .and_then(|name| name.to_str())
        .unwrap_or("<unknown>");
    Some(format!("{} \u{2014} {}", name, indicator))
}

fn combine_status(
    base: Option<String>,
    message: Option<&str>,
    pending_input: Option<&str>,
) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(base) = base {
        parts.push(base);
    }
    if let Some(message) = message.filter(|s| !s.is_empty()) {
        parts.push(message.to_string());
    }
    if let Some(pending) = pending_input.filter(|s| !s.is_empty()) {
        parts.push(pending.to_string());
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

fn draw_overlay(view: &mut TtyView<io::Stdout>, overlay: &mut Overlay) -> Result<()> {
    match overlay {
        Overlay::Library(window) => draw_list_window(
            view,
            window,
            "Library",
            "Library is empty \u{2014} press 'a' to add files",
            |entry| entry.display_name.clone(),
        ),
        Overlay::Bookmarks(window) => draw_list_window(
            view,
            window,
            "Bookmarks",
            "No bookmarks for this document",
            |page| format!("page {}", page),
        ),
        Overlay::Confirm => draw_confirm_prompt(view),
        Overlay::None => Ok(()),
    }
}

fn draw_list_window<T>(
    view: &mut TtyView<io::Stdout>,
    window: &mut ListWindow<T>,
    title: &str,
    empty_message: &str,
    format_entry: impl Fn(&T) -> String,
) -> Result<()> {
    let geometry = view.geometry();
    let total_cols = geometry.columns.max(1);
    let rows_available = geometry.rows.saturating_sub(1).max(1);

    if total_cols < 20 || rows_available < 6 {
        return Ok(());
    }
    let max_inner_width = total_cols.saturating_sub(6) as usize;
    if max_inner_width < 10 {
        return Ok(());
    }

    let lines: Vec<String> = window.entries.iter().map(&format_entry).collect();
    let base_width = if lines.is_empty() {
        empty_message.len() + 2
    } else {
        lines
            .iter()
            .map(|line| line.len() + 2)
            .max()
            .unwrap_or(0)
            .max(title.len())
    };

    let mut inner_width = base_width.min(max_inner_width);
    let min_inner_width = 20.min(max_inner_width);
    if inner_width < min_inner_width {
        inner_width = min_inner_width;
    }

    let max_window_height = rows_available.saturating_sub(2);
    if max_window_height < 6 {
        return Ok(());
    }
    let max_content_height = max_window_height.saturating_sub(4) as usize;
    if max_content_height == 0 {
        return Ok(());
    }

    let total_entries = if lines.is_empty() { 1 } else { lines.len() };
    let content_height = total_entries.min(max_content_height).max(1);
    window.ensure_visible(content_height);

    let window_height = (content_height + 4) as u32;
    let window_width = (inner_width + 2) as u32;
    if window_height > max_window_height || window_width > total_cols {
        return Ok(());
    }

    let start_col = ((total_cols - window_width) / 2) as u16;
    let start_row = ((rows_available.saturating_sub(window_height)) / 2) as u16;
    let selected = window.selected;
    let scroll_offset = window.scroll_offset;

    let writer = view.writer();
    let mut current_row = start_row;
    let horizontal_border = "-".repeat(inner_width);

    print_inverted(
        writer,
        start_col,
        current_row,
        &format!("+{}+", horizontal_border),
    )?;
    current_row = current_row.saturating_add(1);

    let title_line = format!("|{: ^inner_width$}|", title, inner_width = inner_width);
    print_inverted(writer, start_col, current_row, &title_line)?;
    current_row = current_row.saturating_add(1);

    let divider = format!("|{}|", "-".repeat(inner_width));
    print_inverted(writer, start_col, current_row, &divider)?;
    current_row = current_row.saturating_add(1);

    if lines.is_empty() {
        let content = truncate_with_ellipsis(format!("  {}", empty_message), inner_width);
        print_inverted(writer, start_col, current_row, &format!("|{}|", content))?;
        current_row = current_row.saturating_add(1);
    } else {
        let start_index = scroll_offset.min(lines.len().saturating_sub(1));
        let end_index = (start_index + content_height).min(lines.len());
        for idx in start_index..end_index {
            let marker = if idx == selected { '>' } else { ' ' };
            let content =
                truncate_with_ellipsis(format!("{} {}", marker, lines[idx]), inner_width);
            print_inverted(writer, start_col, current_row, &format!("|{}|", content))?;
            current_row = current_row.saturating_add(1);
        }

        let rendered = end_index - start_index;
        for _ in rendered..content_height {
            let line = format!("|{}|", " ".repeat(inner_width));
            print_inverted(writer, start_col, current_row, &line)?;
            current_row = current_row.saturating_add(1);
        }
    }

    print_inverted(
        writer,
        start_col,
        current_row,
        &format!("+{}+", horizontal_border),
    )?;

    Ok(())
}

fn draw_confirm_prompt(view: &mut TtyView<io::Stdout>) -> Result<()> {
    const PROMPT: &str = " Remove every document from the library? [y/N] ";
    let geometry = view.geometry();
    let total_cols = geometry.columns.max(1);
    let total_rows = geometry.rows.max(1);
    let width = (PROMPT.len() as u32).min(total_cols);
    let start_col = ((total_cols - width) / 2) as u16;
    let row = (total_rows / 2) as u16;
    print_inverted(view.writer(), start_col, row, PROMPT)
}

fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::execute!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

fn truncate_with_ellipsis(mut text: String, width: usize) -> String {
    if text.len() > width {
        if width <= 3 {
            text.truncate(width);
        } else {
            let mut truncated = text.chars().take(width - 3).collect::<String>();
            truncated.push_str("...");
            text = truncated;
        }
    }
    if text.len() < width {
        text.push_str(&" ".repeat(width - text.len()));
    }
    text
}

fn query_geometry() -> Result<CellGeometry> {
    let window = terminal::window_size()?;
    let columns = u32::from(window.columns).max(1);
    let rows = u32::from(window.rows).max(1);
    // Some terminals report no pixel size; assume a common cell raster.
    let pixel_width = if window.width > 0 {
        u32::from(window.width)
    } else {
        columns * 8
    };
    let pixel_height = if window.height > 0 {
        u32::from(window.height)
    } else {
        rows * 16
    };
    Ok(CellGeometry {
        columns,
        rows,
        pixel_width,
        pixel_height,
    })
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    // The terminal is busy with raw-mode graphics, so logs go to a file only.
    let file_appender = tracing_appender::rolling::never(log_dir, "pdfshelf.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_status_joins_present_parts() {
        assert_eq!(
            combine_status(Some("a.pdf".to_string()), None, Some("12")),
            Some("a.pdf | 12".to_string())
        );
        assert_eq!(combine_status(None, None, None), None);
        assert_eq!(
            combine_status(None, Some("saved"), None),
            Some("saved".to_string())
        );
    }

    #[test]
    fn list_window_selection_stays_in_bounds() {
        let mut window = ListWindow::new(vec![1, 2, 3]);
        assert!(!window.move_selection(-1));
        assert!(window.move_selection(2));
        assert!(!window.move_selection(5));
        assert_eq!(window.selected_entry(), Some(&3));
    }

    #[test]
    fn list_window_with_selection_clamps_index() {
        let window = ListWindow::with_selection(vec![1, 2], 9);
        assert_eq!(window.selected_entry(), Some(&2));
        let empty: ListWindow<u32> = ListWindow::with_selection(Vec::new(), 3);
        assert!(empty.selected_entry().is_none());
    }

    #[test]
    fn list_window_scrolls_selection_into_view() {
        let mut window = ListWindow::new((0..10).collect::<Vec<_>>());
        window.selected = 7;
        window.ensure_visible(3);
        assert_eq!(window.scroll_offset, 5);
        window.selected = 1;
        window.ensure_visible(3);
        assert_eq!(window.scroll_offset, 1);
    }

    #[test]
    fn truncate_pads_and_shortens_to_width() {
        assert_eq!(truncate_with_ellipsis("abc".to_string(), 5), "abc  ");
        assert_eq!(
            truncate_with_ellipsis("abcdefgh".to_string(), 6),
            "abc..."
        );
    }
}

//! Turning a user's choice into exactly one surface.
//!
//! Non-interactive choices arrive as a [`SelectionToken`]. Interactive
//! choices go through a [`SelectorStrategy`]: a numbered list or a
//! thumbnail grid, both backed by the same [`SurfaceCatalog`].

use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_platform_core::{Surface, SurfacePreview};

use crate::catalog::{FilterProfile, SurfaceCatalog};
use crate::thumbnail::{placeholder, render_halfblocks};

/// A serialized selection: `desktop`, `id:<n>`, or a 1-based list index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionToken {
    Desktop,
    Id(u64),
    Index(usize),
}

impl SelectionToken {
    /// Token that re-selects `surface` later.
    pub fn for_surface(surface: &Surface) -> Self {
        if surface.is_desktop() {
            SelectionToken::Desktop
        } else {
            SelectionToken::Id(surface.id)
        }
    }
}

impl FromStr for SelectionToken {
    type Err = FramecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "desktop" {
            return Ok(SelectionToken::Desktop);
        }
        if let Some(id) = s.strip_prefix("id:") {
            return id
                .trim()
                .parse::<u64>()
                .map(SelectionToken::Id)
                .map_err(|_| FramecastError::invalid_selection(format!("Bad surface id '{id}'")));
        }
        s.parse::<usize>()
            .map(SelectionToken::Index)
            .map_err(|_| {
                FramecastError::invalid_selection(format!(
                    "'{s}' is not a number, 'id:<n>', or 'desktop'"
                ))
            })
    }
}

impl fmt::Display for SelectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionToken::Desktop => f.write_str("desktop"),
            SelectionToken::Id(id) => write!(f, "id:{id}"),
            SelectionToken::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Pick the `index`-th (1-based) surface.
pub fn select_by_index(surfaces: &[Surface], index: usize) -> FramecastResult<&Surface> {
    if index == 0 || index > surfaces.len() {
        return Err(FramecastError::invalid_selection(format!(
            "{index} is out of range (1-{})",
            surfaces.len()
        )));
    }
    Ok(&surfaces[index - 1])
}

/// Find the surface with exactly `id`.
pub fn select_by_id(surfaces: &[Surface], id: u64) -> FramecastResult<&Surface> {
    surfaces
        .iter()
        .find(|s| s.id == id)
        .ok_or(FramecastError::SurfaceNotFound { id })
}

/// Interpret one line of interactive input against `count` entries.
///
/// Empty input or `q` cancels (`Ok(None)`); a number in range picks.
pub fn parse_choice(line: &str, count: usize) -> FramecastResult<Option<usize>> {
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case("q") {
        return Ok(None);
    }
    let index = line
        .parse::<usize>()
        .map_err(|_| FramecastError::invalid_selection(format!("'{line}' is not a number")))?;
    if index == 0 || index > count {
        return Err(FramecastError::invalid_selection(format!(
            "{index} is out of range (1-{count})"
        )));
    }
    Ok(Some(index))
}

/// Resolves tokens against a fresh enumeration.
pub struct Selector<'a> {
    catalog: &'a SurfaceCatalog,
}

impl<'a> Selector<'a> {
    pub fn new(catalog: &'a SurfaceCatalog) -> Self {
        Self { catalog }
    }

    /// Resolve a token to a surface.
    ///
    /// Indexes count into the filtered list; ids match any window the
    /// platform reports; `desktop` skips window filtering entirely.
    pub fn resolve(&self, token: SelectionToken) -> FramecastResult<Surface> {
        let surface = match token {
            SelectionToken::Desktop => self.catalog.desktop()?,
            SelectionToken::Id(id) => {
                let windows = self.catalog.enumerate_unfiltered()?;
                select_by_id(&windows, id)?.clone()
            }
            SelectionToken::Index(index) => {
                let surfaces = self.catalog.enumerate_recordable(FilterProfile::List)?;
                select_by_index(&surfaces, index)?.clone()
            }
        };
        tracing::info!(%token, surface = %surface.label(), id = surface.id, "Resolved selection");
        Ok(surface)
    }
}

/// An interactive way of choosing a surface.
pub trait SelectorStrategy {
    /// Present choices on `output` and read one answer from `input`.
    /// `Ok(None)` means the user cancelled.
    fn choose(
        &self,
        catalog: &SurfaceCatalog,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> FramecastResult<Option<Surface>>;
}

/// Numbered text list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListSelector;

impl SelectorStrategy for ListSelector {
    fn choose(
        &self,
        catalog: &SurfaceCatalog,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> FramecastResult<Option<Surface>> {
        let surfaces = catalog.enumerate_recordable(FilterProfile::List)?;

        writeln!(output, "\nAvailable Windows:")?;
        for (i, surface) in surfaces.iter().enumerate() {
            writeln!(output, "  {}. {}", i + 1, surface.label())?;
        }

        prompt_and_pick(surfaces, input, output)
    }
}

/// Grid of live thumbnails with a leading whole-desktop entry.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailSelector {
    /// Preview capture size in pixels.
    pub preview_width: u32,
    pub preview_height: u32,
    /// Rendered width in terminal columns.
    pub columns: u32,
}

impl ThumbnailSelector {
    pub fn new(preview_width: u32, preview_height: u32) -> Self {
        Self {
            preview_width,
            preview_height,
            columns: 48,
        }
    }

    /// Desktop first, then every window that passes the grid filter.
    fn entries(&self, catalog: &SurfaceCatalog) -> FramecastResult<Vec<Surface>> {
        let mut entries = Vec::new();
        match catalog.desktop() {
            Ok(desktop) => entries.push(desktop),
            Err(e) => tracing::warn!(error = %e, "No desktop entry"),
        }
        entries.extend(catalog.enumerate(FilterProfile::Grid)?);
        if entries.is_empty() {
            return Err(FramecastError::NothingRecordable);
        }
        Ok(entries)
    }

    fn preview(&self, catalog: &SurfaceCatalog, surface: &Surface) -> Option<SurfacePreview> {
        match catalog
            .backend()
            .capture_preview(surface, self.preview_width, self.preview_height)
        {
            Ok(preview) => Some(preview),
            Err(e) => {
                tracing::debug!(id = surface.id, error = %e, "Preview unavailable");
                None
            }
        }
    }
}

impl SelectorStrategy for ThumbnailSelector {
    fn choose(
        &self,
        catalog: &SurfaceCatalog,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> FramecastResult<Option<Surface>> {
        let entries = self.entries(catalog)?;
        let placeholder_rows =
            (self.columns * self.preview_height / self.preview_width.max(1) / 2).max(3);

        writeln!(output, "\nSelect a window to record:")?;
        for (i, surface) in entries.iter().enumerate() {
            writeln!(output, "\n  {}. {}", i + 1, surface.label())?;
            // Previews are dropped as soon as they are drawn.
            let lines = match self.preview(catalog, surface) {
                Some(preview) => render_halfblocks(&preview, self.columns),
                None => placeholder(self.columns, placeholder_rows),
            };
            for line in lines {
                writeln!(output, "     {line}")?;
            }
        }

        prompt_and_pick(entries, input, output)
    }
}

fn prompt_and_pick(
    mut surfaces: Vec<Surface>,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> FramecastResult<Option<Surface>> {
    write!(output, "\nSelect window number (1-{}, q to cancel): ", surfaces.len())?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }

    Ok(parse_choice(&line, surfaces.len())?.map(|index| surfaces.swap_remove(index - 1)))
}

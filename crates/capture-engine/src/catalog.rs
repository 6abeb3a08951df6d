//! Surface catalog: enumeration plus the shared filtering policy.

use std::sync::Arc;

use framecast_common::config::CatalogFilter;
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_platform_core::{DisplayInfo, Surface};

use crate::backend::CaptureBackend;

/// Which consumer the enumeration is for. Only the minimum size differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterProfile {
    /// Plain numbered list (looser size threshold).
    List,
    /// Thumbnail grid (stricter size threshold).
    Grid,
}

/// Queries the platform for capturable surfaces and filters them.
///
/// Each call is a fresh snapshot; identifiers from an earlier call may no
/// longer exist.
pub struct SurfaceCatalog {
    backend: Arc<dyn CaptureBackend>,
    filter: CatalogFilter,
}

impl SurfaceCatalog {
    pub fn new(backend: Arc<dyn CaptureBackend>, filter: CatalogFilter) -> Self {
        Self { backend, filter }
    }

    pub fn backend(&self) -> &Arc<dyn CaptureBackend> {
        &self.backend
    }

    pub fn filter(&self) -> &CatalogFilter {
        &self.filter
    }

    /// Filtered windows in platform order. May be empty.
    pub fn enumerate(&self, profile: FilterProfile) -> FramecastResult<Vec<Surface>> {
        let raw = self.backend.list_windows()?;
        let total = raw.len();
        let surfaces = filter_surfaces(raw, &self.filter, profile);
        tracing::debug!(
            total,
            recordable = surfaces.len(),
            ?profile,
            "Enumerated surfaces"
        );
        Ok(surfaces)
    }

    /// Like [`enumerate`](Self::enumerate), but an empty result is the
    /// explicit `NothingRecordable` condition.
    pub fn enumerate_recordable(&self, profile: FilterProfile) -> FramecastResult<Vec<Surface>> {
        let surfaces = self.enumerate(profile)?;
        if surfaces.is_empty() {
            return Err(FramecastError::NothingRecordable);
        }
        Ok(surfaces)
    }

    /// Every window the platform reports, unfiltered.
    pub fn enumerate_unfiltered(&self) -> FramecastResult<Vec<Surface>> {
        self.backend.list_windows()
    }

    /// Connected displays.
    pub fn displays(&self) -> FramecastResult<Vec<DisplayInfo>> {
        self.backend.list_displays()
    }

    /// The whole-desktop surface of the primary display (first display if
    /// none is flagged primary). Bypasses window filtering entirely.
    pub fn desktop(&self) -> FramecastResult<Surface> {
        let displays = self.displays()?;
        let display = displays
            .iter()
            .find(|d| d.primary)
            .or_else(|| displays.first())
            .ok_or_else(|| FramecastError::platform_query("No display found"))?;
        Ok(Surface::desktop(display))
    }
}

/// Apply the filtering policy to a raw enumeration, preserving order.
pub fn filter_surfaces(
    surfaces: Vec<Surface>,
    filter: &CatalogFilter,
    profile: FilterProfile,
) -> Vec<Surface> {
    surfaces
        .into_iter()
        .filter(|s| is_recordable(s, filter, profile))
        .collect()
}

/// Whether one window passes the filtering policy.
pub fn is_recordable(surface: &Surface, filter: &CatalogFilter, profile: FilterProfile) -> bool {
    let Some(owner) = surface.owner() else {
        // Displays are reached through the desktop path, never the list.
        return false;
    };
    let title = surface.title.trim();
    if title.is_empty() || owner.trim().is_empty() {
        return false;
    }

    let (min_width, min_height) = match profile {
        FilterProfile::List => (filter.list_min_width, filter.list_min_height),
        FilterProfile::Grid => (filter.grid_min_width, filter.grid_min_height),
    };
    if !surface.bounds().is_at_least(min_width, min_height) {
        return false;
    }

    if filter.excluded_owners.iter().any(|o| o == owner) {
        return false;
    }

    let title_lower = title.to_lowercase();
    !filter
        .excluded_title_keywords
        .iter()
        .any(|kw| title_lower.contains(&kw.to_lowercase()))
}

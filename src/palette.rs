//! The route colour rule, shared by the map page and the tile job.
//!
//! Routes are ranked newest first (by `uploadedAt`, ties broken by record id), and the route at
//! rank `i` gets `ROUTE_COLORS[i % 10]`. Anything else which draws routes must use
//! [`route_colors`] (or the same palette & ordering, identified by [`PALETTE_VERSION`]) or the
//! tiles and the interactive map will disagree about colours.
use itertools::Itertools;
use serde::Serialize;
use std::cmp::Ordering;

use crate::collate::RouteRecord;

/// Bump whenever [`ROUTE_COLORS`] or [`display_order`] changes.
pub const PALETTE_VERSION: u32 = 1;

pub const ROUTE_COLORS: [&str; 10] = [
    "#ff6b6b", "#4ecdc4", "#ffe66d", "#a29bfe", "#fd79a8", "#00b894", "#e17055", "#0984e3",
    "#6c5ce7", "#fdcb6e",
];

/// Used for GPX files which have no route record
pub const FALLBACK_COLOR: &str = "#2A9D8F";

pub fn color_for_rank(rank: usize) -> &'static str {
    ROUTE_COLORS[rank % ROUTE_COLORS.len()]
}

/// Newest upload first. Equal timestamps are ordered by id so the order never depends on what
/// order the store returned them in.
pub fn display_order(a: &RouteRecord, b: &RouteRecord) -> Ordering {
    b.uploaded_at
        .cmp(&a.uploaded_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Colour & display name of one route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColoredRouteMeta {
    pub color: &'static str,
    /// `metadata.name`, else the file name. `None` if the record has neither
    pub name: Option<String>,
}

/// Every record, in display order, with its colour. Each record takes one colour slot, whether
/// or not it ends up drawing anything.
pub fn assign_colors(records: &[RouteRecord]) -> Vec<(&RouteRecord, ColoredRouteMeta)> {
    records
        .iter()
        .sorted_by(|a, b| display_order(a, b))
        .enumerate()
        .map(|(rank, record)| {
            let meta = ColoredRouteMeta {
                color: color_for_rank(rank),
                name: record.display_name().map(str::to_string),
            };
            (record, meta)
        })
        .collect()
}

/// One entry of the colour table the map page loads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteColor {
    pub id: String,
    pub color: &'static str,
    pub name: Option<String>,
}

/// The colour table for the interactive map, in display order.
pub fn route_colors(records: &[RouteRecord]) -> Vec<RouteColor> {
    assign_colors(records)
        .into_iter()
        .map(|(record, meta)| RouteColor {
            id: record.id.clone(),
            color: meta.color,
            name: meta.name,
        })
        .collect()
}

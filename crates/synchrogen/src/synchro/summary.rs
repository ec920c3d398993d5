//! CSV summary of a network, one row per intersection.

use serde::Serialize;

use super::network::Network;
use crate::error::RenderError;

#[derive(Serialize)]
struct SummaryRow<'a> {
    intersection: &'a str,
    node_id: u32,
    street_ns: &'a str,
    street_ew: &'a str,
    x: i64,
    y: i64,
    nb_lanes: u8,
    sb_lanes: u8,
    eb_lanes: u8,
    wb_lanes: u8,
    nb_speed: u8,
    sb_speed: u8,
    eb_speed: u8,
    wb_speed: u8,
    cycle_length: u16,
}

/// Write the summary CSV for `network`.
///
/// # Errors
///
/// Returns an error if the CSV writer fails.
pub fn write(network: &Network) -> Result<Vec<u8>, RenderError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for layout in &network.intersections {
        let [nb, sb, eb, wb] = layout.settings;
        writer
            .serialize(SummaryRow {
                intersection: &layout.name,
                node_id: layout.center,
                street_ns: &layout.streets.north_south,
                street_ew: &layout.streets.east_west,
                x: layout.x,
                y: layout.y,
                nb_lanes: nb.lanes,
                sb_lanes: sb.lanes,
                eb_lanes: eb.lanes,
                wb_lanes: wb.lanes,
                nb_speed: nb.speed_mph,
                sb_speed: sb.speed_mph,
                eb_speed: eb.speed_mph,
                wb_speed: wb.speed_mph,
                cycle_length: layout.cycle_length,
            })
            .map_err(|e| RenderError::new("summary", e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| RenderError::new("summary", e.to_string()))
}

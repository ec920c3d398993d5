//! Synchro UTDF text writer.
//!
//! Rows are tab-separated and padded with empty cells to a minimum width,
//! which is what Synchro's importer expects from a spreadsheet export.

use super::network::{Link, Network, NodeKind};
use crate::error::RenderError;
use crate::intake::Direction;

/// Minimum number of cells on a row.
const ROW_WIDTH: usize = 9;

/// Width of `[Links]` rows: four direction columns plus four empty cells.
const LINK_ROW_WIDTH: usize = 10;

/// Width of `[Nodes]` rows.
const NODE_ROW_WIDTH: usize = 14;

/// Width of `[Lanes]` rows.
const LANE_ROW_WIDTH: usize = 16;

/// UTDF format version written in `[Network]`.
pub const UTDF_VERSION: u32 = 8;

/// Fixed `[Network]` settings.
const NETWORK_SETTINGS: &[(&str, &str)] = &[
    ("Metric", "0"),
    ("yellowTime", "3.5"),
    ("allRedTime", "1"),
    ("Walk", "7"),
    ("DontWalk", "11"),
    ("HV", "0.02"),
    ("PHF", "0.92"),
    ("DefWidth", "12"),
    ("DefFlow", "1900"),
    ("vehLength", "25"),
    ("heavyvehlength", "45"),
    ("criticalgap", "4.5"),
    ("followuptime", "2.5"),
    ("stopthresholdspeed", "5"),
    ("criticalmergegap", "3.7"),
    ("growth", "1"),
    ("PedSpeed", "3.5"),
    ("LostTimeAdjust", "0"),
];

/// Link rows written with the same value in every direction column.
const CONSTANT_LINK_ROWS: &[(&str, &str)] = &[
    ("Crosswalk Width", "16"),
    ("Mandatory Distance", "200"),
    ("Mandatory Distance2", "1320"),
    ("Positioning Distance", "880"),
    ("Positioning Distance2", "1760"),
];

const NODE_HEADER: &[&str] = &[
    "INTID",
    "TYPE",
    "X",
    "Y",
    "Z",
    "DESCRIPTION",
    "CBD",
    "Inside Radius",
    "Outside Radius",
    "Roundabout Lanes",
    "Circle Speed",
];

const LANE_HEADER: &[&str] = &[
    "RECORDNAME", "INTID", "NBL", "NBT", "NBR", "SBL", "SBT", "SBR", "EBL", "EBT", "EBR", "WBL",
    "WBT", "WBR", "PED", "HOLD",
];

struct Utdf {
    out: String,
}

impl Utdf {
    fn row<S: AsRef<str>>(&mut self, cells: &[S], width: usize) {
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                self.out.push('\t');
            }
            self.out.push_str(cell.as_ref());
        }
        for _ in cells.len().max(1)..width {
            self.out.push('\t');
        }
        self.out.push('\n');
    }

    fn section(&mut self, name: &str, title: &str) {
        self.row(&[format!("[{name}]")], ROW_WIDTH);
        self.row(&[title], ROW_WIDTH);
    }

    fn blank(&mut self) {
        self.row(&[""], ROW_WIDTH);
    }

    /// A link row: record name, node id, then one cell per direction.
    fn link_row(&mut self, record: &str, node: u32, values: [String; 4]) {
        let mut cells = vec![record.to_string(), node.to_string()];
        cells.extend(values);
        self.row(&cells, LINK_ROW_WIDTH);
    }
}

/// Write `network` as UTDF text.
///
/// # Errors
///
/// Returns an error if a link's travel time cannot be computed.
pub fn write(network: &Network) -> Result<String, RenderError> {
    let mut utdf = Utdf { out: String::new() };

    utdf.section("Network", "Network Settings");
    utdf.row(&["RECORDNAME", "DATA"], ROW_WIDTH);
    utdf.row(&["UTDFVERSION".to_string(), UTDF_VERSION.to_string()], ROW_WIDTH);
    for (key, value) in NETWORK_SETTINGS {
        utdf.row(&[key, value], ROW_WIDTH);
    }
    utdf.blank();

    write_nodes(&mut utdf, network);
    write_links(&mut utdf, network)?;
    write_lanes(&mut utdf, network);
    write_timeplans(&mut utdf, network);

    utdf.section("Phases", "Phasing Data");
    utdf.row(&["RECORDNAME", "INTID", "D1", "D2", "D3", "D4", "D5", "D6", "D7", "D8"], ROW_WIDTH);
    utdf.blank();

    Ok(utdf.out)
}

fn write_nodes(utdf: &mut Utdf, network: &Network) {
    utdf.section("Nodes", "Node Data");
    utdf.row(NODE_HEADER, NODE_ROW_WIDTH);
    for node in &network.nodes {
        let description = match node.kind {
            NodeKind::Center => network.intersection_of(node).name.as_str(),
            NodeKind::Approach => "",
        };
        utdf.row(
            &[
                node.id.to_string(),
                node.kind.code().to_string(),
                node.x.to_string(),
                node.y.to_string(),
                "0".to_string(),
                description.to_string(),
            ],
            NODE_ROW_WIDTH,
        );
    }
    utdf.blank();
}

fn write_links(utdf: &mut Utdf, network: &Network) -> Result<(), RenderError> {
    utdf.section("Links", "Link Data");
    utdf.row(&["RECORDNAME", "INTID", "NB", "SB", "EB", "WB"], LINK_ROW_WIDTH);

    let mut upstream: Vec<u32> = network.links.iter().map(|l| l.from).collect();
    upstream.sort_unstable();
    upstream.dedup();

    for id in upstream {
        let links = network.links_from(id);
        let Some(node) = network.nodes.iter().find(|n| n.id == id) else {
            continue;
        };
        let streets = &network.intersection_of(node).streets;

        utdf.link_row("Up ID", id, per_link(&links, |l| l.to.to_string()));
        utdf.link_row("Lanes", id, per_link(&links, |l| l.settings.lanes.to_string()));
        utdf.link_row(
            "Name",
            id,
            per_link(&links, |l| streets.for_direction(l.direction).to_string()),
        );
        utdf.link_row("Distance", id, per_link(&links, |l| l.distance_ft.to_string()));
        utdf.link_row("Speed", id, per_link(&links, |l| l.settings.speed_mph.to_string()));

        let mut times: [String; 4] = Default::default();
        for (slot, link) in times.iter_mut().zip(links) {
            if let Some(link) = link {
                *slot = format!("{:.1}", link.travel_time_secs()?);
            }
        }
        utdf.link_row("Time", id, times);

        utdf.link_row("Grade", id, ["0", "0", "0", "0"].map(String::from));
        utdf.link_row("Median", id, ["12", "12", "12", "12"].map(String::from));
        utdf.link_row("Offset", id, ["0", "0", "0", "0"].map(String::from));
        utdf.link_row(
            "TWLTL",
            id,
            per_link(&links, |l| u8::from(l.settings.twltl).to_string()),
        );
        for (record, value) in CONSTANT_LINK_ROWS {
            utdf.link_row(record, id, [*value; 4].map(String::from));
        }
        for record in ["Curve Pt X", "Curve Pt Y", "Curve Pt Z"] {
            utdf.link_row(record, id, Default::default());
        }
        utdf.link_row("Link Is Hidden", id, ["FALSE"; 4].map(String::from));
        utdf.link_row("Street Name Is Hidden", id, ["FALSE"; 4].map(String::from));
    }
    utdf.blank();
    Ok(())
}

fn per_link(links: &[Option<&Link>; 4], f: impl Fn(&Link) -> String) -> [String; 4] {
    Direction::ALL.map(|d| links[d.index()].map(&f).unwrap_or_default())
}

fn write_lanes(utdf: &mut Utdf, network: &Network) {
    utdf.section("Lanes", "Lane Group Data");
    utdf.row(LANE_HEADER, LANE_ROW_WIDTH);
    for layout in &network.intersections {
        // through movements only: L/T/R triples per direction
        let mut cells = vec!["Lanes".to_string(), layout.center.to_string()];
        for direction in Direction::ALL {
            let lanes = layout.settings[direction.index()].lanes;
            cells.extend([String::new(), lanes.to_string(), String::new()]);
        }
        utdf.row(&cells, LANE_ROW_WIDTH);
    }
    utdf.blank();
}

fn write_timeplans(utdf: &mut Utdf, network: &Network) {
    utdf.section("Timeplans", "Timing Plan Settings");
    utdf.row(&["RECORDNAME", "INTID", "DATA"], ROW_WIDTH);
    for layout in &network.intersections {
        utdf.row(
            &[
                "Cycle Length".to_string(),
                layout.center.to_string(),
                layout.cycle_length.to_string(),
            ],
            ROW_WIDTH,
        );
    }
    utdf.blank();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{from_submission, IntersectionForm, SubmissionForm};

    fn network(name: &str, lanes: i64, cycle_length: i64) -> Network {
        let request = from_submission(&SubmissionForm {
            email: None,
            intersections: vec![IntersectionForm {
                name: Some(name.to_string()),
                lanes: Some(lanes),
                cycle_length: Some(cycle_length),
                ..IntersectionForm::default()
            }],
        })
        .unwrap();
        Network::build(&request, &[]).unwrap()
    }

    fn line<'a>(text: &'a str, prefix: &str) -> Vec<&'a str> {
        text.lines()
            .find(|l| l.starts_with(prefix))
            .unwrap_or_else(|| panic!("no line starting with {prefix:?}"))
            .split('\t')
            .collect()
    }

    #[test]
    fn test_sections_in_order() {
        let text = write(&network("Intersection A", 4, 90)).unwrap();
        let sections: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with('['))
            .map(|l| l.trim_end_matches('\t'))
            .collect();
        assert_eq!(
            sections,
            ["[Network]", "[Nodes]", "[Links]", "[Lanes]", "[Timeplans]", "[Phases]"]
        );
        assert!(text.ends_with('\n'));
        assert!(!text.contains('\r'));
    }

    #[test]
    fn test_network_settings() {
        let text = write(&network("Intersection A", 4, 90)).unwrap();
        assert_eq!(line(&text, "UTDFVERSION")[1], "8");
        assert_eq!(line(&text, "yellowTime")[1], "3.5");
        assert_eq!(line(&text, "allRedTime")[1], "1");
        assert!(!text.contains("ScenarioDate"));
    }

    #[test]
    fn test_scenario_values_encoded() {
        let text = write(&network("Intersection A", 4, 90)).unwrap();

        let center = line(&text, "1\t1\t");
        assert_eq!(&center[..6], ["1", "1", "0", "0", "0", "Intersection A"]);
        assert_eq!(center.len(), NODE_ROW_WIDTH);

        let lanes = line(&text, "Lanes\t1\t\t");
        assert_eq!(lanes.len(), LANE_ROW_WIDTH);
        assert_eq!([lanes[3], lanes[6], lanes[9], lanes[12]], ["4", "4", "4", "4"]);

        let cycle = line(&text, "Cycle Length");
        assert_eq!(&cycle[..3], ["Cycle Length", "1", "90"]);
    }

    #[test]
    fn test_link_rows_for_approach_node() {
        let text = write(&network("Main St and Oak Ave", 2, 60)).unwrap();

        // node 2 is the NB approach; it only has an NB link into the centre
        assert_eq!(&line(&text, "Up ID\t2")[..6], ["Up ID", "2", "1", "", "", ""]);
        assert_eq!(&line(&text, "Name\t2")[..6], ["Name", "2", "Main St", "", "", ""]);
        assert_eq!(&line(&text, "Time\t2")[..6], ["Time", "2", "34.1", "", "", ""]);
        assert_eq!(&line(&text, "TWLTL\t2")[..6], ["TWLTL", "2", "0", "", "", ""]);
        assert_eq!(&line(&text, "Grade\t2")[..6], ["Grade", "2", "0", "0", "0", "0"]);
    }

    #[test]
    fn test_link_rows_for_center_node() {
        let text = write(&network("Main St and Oak Ave", 2, 60)).unwrap();
        assert_eq!(&line(&text, "Up ID\t1")[..6], ["Up ID", "1", "3", "2", "5", "4"]);
        assert_eq!(
            &line(&text, "Name\t1")[..6],
            ["Name", "1", "Main St", "Main St", "Oak Ave", "Oak Ave"]
        );
        assert_eq!(line(&text, "Link Is Hidden\t1")[2], "FALSE");
    }

    #[test]
    fn test_link_rows_have_four_trailing_cells() {
        let text = write(&network("Intersection A", 4, 90)).unwrap();
        for prefix in ["RECORDNAME\tINTID\tNB\tSB", "Up ID\t1", "Grade\t2", "Curve Pt X\t3"] {
            let row = line(&text, prefix);
            assert_eq!(row.len(), LINK_ROW_WIDTH, "row {prefix:?}");
            assert_eq!(&row[6..], ["", "", "", ""]);
        }
        assert!(text.contains("Median\t1\t12\t12\t12\t12\t\t\t\t\n"));
        assert!(text.contains("[Links]\t\t\t\t\t\t\t\t\n"));
    }

    #[test]
    fn test_rows_padded() {
        let text = write(&network("Intersection A", 4, 90)).unwrap();
        for row in text.lines() {
            assert!(row.split('\t').count() >= ROW_WIDTH, "short row {row:?}");
        }
    }

    #[test]
    fn test_write_is_deterministic() {
        let a = write(&network("Intersection A", 4, 90)).unwrap();
        let b = write(&network("Intersection A", 4, 90)).unwrap();
        assert_eq!(a, b);
    }
}

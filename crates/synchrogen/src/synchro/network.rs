//! Network layout: nodes, links and street names for a request.
//!
//! Every intersection becomes a centre node plus four approach nodes, one
//! per direction, with a link pair between the centre and each approach.

use crate::error::RenderError;
use crate::geocode::Site;
use crate::intake::{ApproachSettings, Direction, GenerationRequest};

/// Distance from an intersection centre to each approach node, in feet.
pub const APPROACH_DISTANCE_FT: i64 = 1500;

/// Feet per degree of latitude, also scaled by cos(latitude) for longitude.
const FEET_PER_DEGREE: f64 = 364_000.0;

/// Spacing of intersections that could not be geocoded, in feet.
const FALLBACK_SPACING_FT: i64 = 5000;

/// Largest coordinate magnitude Synchro accepts, in feet.
const MAX_COORDINATE_FT: f64 = 1.0e9;

/// Separators between the two street names, tried in order.
const STREET_SEPARATORS: [&str; 4] = [" and ", " & ", " at ", " @ "];

/// Node type as written in the `TYPE` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// External approach node.
    Approach,
    /// Signalised intersection centre.
    Center,
}

impl NodeKind {
    /// Synchro node type code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Approach => 0,
            Self::Center => 1,
        }
    }
}

/// A network node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Node id, assigned from 1 in creation order.
    pub id: u32,
    /// Centre or approach.
    pub kind: NodeKind,
    /// East coordinate in feet.
    pub x: i64,
    /// North coordinate in feet.
    pub y: i64,
    /// Index of the owning intersection in the request.
    pub intersection: usize,
}

/// A directed link between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Upstream node id.
    pub from: u32,
    /// Downstream node id.
    pub to: u32,
    /// Direction column this link is written under.
    pub direction: Direction,
    /// Lanes, speed and TWLTL of the link.
    pub settings: ApproachSettings,
    /// Link length in feet.
    pub distance_ft: i64,
}

impl Link {
    /// Free-flow travel time in seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the link speed is zero.
    pub fn travel_time_secs(&self) -> Result<f64, RenderError> {
        if self.settings.speed_mph == 0 {
            return Err(RenderError::new(
                format!("{}_speed", self.direction.code().to_ascii_lowercase()),
                "speed must be positive to compute travel time",
            ));
        }
        #[allow(clippy::cast_precision_loss)]
        let distance = self.distance_ft as f64;
        Ok(distance / f64::from(self.settings.speed_mph) * 3600.0 / 5280.0)
    }
}

/// Street names parsed from an intersection name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Streets {
    /// Street carrying NB/SB traffic.
    pub north_south: String,
    /// Street carrying EB/WB traffic.
    pub east_west: String,
    /// Trailing city/state text, if any.
    pub location: Option<String>,
}

impl Streets {
    /// Street name shown for links in `direction`.
    #[must_use]
    pub fn for_direction(&self, direction: Direction) -> &str {
        match direction {
            Direction::North | Direction::South => &self.north_south,
            Direction::East | Direction::West => &self.east_west,
        }
    }
}

/// Split `Main St and Oak Ave, Detroit, MI` into its streets and location.
///
/// Returns empty street names when no separator is present.
#[must_use]
pub fn parse_streets(name: &str) -> Streets {
    let lowered = name.to_ascii_lowercase();
    let Some((at, sep)) = STREET_SEPARATORS
        .iter()
        .find_map(|sep| lowered.find(sep).map(|at| (at, sep.len())))
    else {
        return Streets::default();
    };

    let (first, second) = (&name[..at], &name[at + sep..]);
    let first_parts: Vec<&str> = first.trim().split(',').collect();
    let second_parts: Vec<&str> = second.trim().split(',').collect();

    let join_rest = |parts: &[&str]| {
        let rest = parts[1..].iter().map(|p| p.trim()).collect::<Vec<_>>().join(", ");
        (!rest.is_empty()).then_some(rest)
    };
    let location = if second_parts.len() > 1 {
        join_rest(&second_parts)
    } else if first_parts.len() > 1 {
        join_rest(&first_parts)
    } else {
        None
    };

    Streets {
        north_south: first_parts[0].trim().to_string(),
        east_west: second_parts[0].trim().to_string(),
        location,
    }
}

/// Layout of one intersection within the network.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionLayout {
    /// Intersection name.
    pub name: String,
    /// Parsed street names.
    pub streets: Streets,
    /// Centre node id.
    pub center: u32,
    /// Approach node ids in NB, SB, EB, WB order.
    pub approaches: [u32; 4],
    /// Centre east coordinate in feet.
    pub x: i64,
    /// Centre north coordinate in feet.
    pub y: i64,
    /// Signal cycle length in seconds.
    pub cycle_length: u16,
    /// Per-direction settings in NB, SB, EB, WB order.
    pub settings: [ApproachSettings; 4],
    /// Geocoded site, if the lookup succeeded.
    pub site: Option<Site>,
}

/// A complete network ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    /// All nodes in id order.
    pub nodes: Vec<Node>,
    /// All links in creation order.
    pub links: Vec<Link>,
    /// One layout per request intersection.
    pub intersections: Vec<IntersectionLayout>,
}

impl Network {
    /// Lay out `request`, using `sites[i]` to place intersection `i`.
    ///
    /// The first geocoded intersection becomes the coordinate origin. Missing
    /// sites fall back to a fixed grid so output never depends on a network
    /// lookup having succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is empty or a coordinate is out of range.
    pub fn build(request: &GenerationRequest, sites: &[Option<Site>]) -> Result<Self, RenderError> {
        if request.intersections().is_empty() {
            return Err(RenderError::new("intersections", "nothing to render"));
        }

        let origin = sites.iter().flatten().next();
        let fallback_row = if origin.is_some() { -FALLBACK_SPACING_FT } else { 0 };

        let mut network = Self {
            nodes: Vec::new(),
            links: Vec::new(),
            intersections: Vec::with_capacity(request.intersections().len()),
        };
        let mut next_id: u32 = 0;
        let mut allocate = || {
            next_id += 1;
            next_id
        };

        for (index, intersection) in request.intersections().iter().enumerate() {
            let site = sites.get(index).cloned().flatten();
            let (x, y) = match (&site, origin) {
                (Some(site), Some(origin)) => project(site, origin, index)?,
                _ => (grid_offset(index)?, fallback_row),
            };

            let center = allocate();
            network.nodes.push(Node {
                id: center,
                kind: NodeKind::Center,
                x,
                y,
                intersection: index,
            });

            let mut approaches = [0; 4];
            for direction in Direction::ALL {
                let (dx, dy) = approach_offset(direction);
                let id = allocate();
                approaches[direction.index()] = id;
                network.nodes.push(Node {
                    id,
                    kind: NodeKind::Approach,
                    x: x + dx,
                    y: y + dy,
                    intersection: index,
                });
            }

            for direction in Direction::ALL {
                let approach = approaches[direction.index()];
                let opposite = direction.opposite();
                network.links.push(Link {
                    from: approach,
                    to: center,
                    direction,
                    settings: *intersection.approach(direction),
                    distance_ft: APPROACH_DISTANCE_FT,
                });
                network.links.push(Link {
                    from: center,
                    to: approach,
                    direction: opposite,
                    settings: *intersection.approach(opposite),
                    distance_ft: APPROACH_DISTANCE_FT,
                });
            }

            network.intersections.push(IntersectionLayout {
                name: intersection.name().to_string(),
                streets: parse_streets(intersection.name()),
                center,
                approaches,
                x,
                y,
                cycle_length: intersection.cycle_length(),
                settings: Direction::ALL.map(|d| *intersection.approach(d)),
                site,
            });
        }

        Ok(network)
    }

    /// Links leaving `node`, indexed by direction column.
    #[must_use]
    pub fn links_from(&self, node: u32) -> [Option<&Link>; 4] {
        let mut by_direction = [None; 4];
        for link in self.links.iter().filter(|l| l.from == node) {
            by_direction[link.direction.index()] = Some(link);
        }
        by_direction
    }

    /// The layout owning `node`.
    #[must_use]
    pub fn intersection_of(&self, node: &Node) -> &IntersectionLayout {
        &self.intersections[node.intersection]
    }
}

fn approach_offset(direction: Direction) -> (i64, i64) {
    match direction {
        Direction::North => (0, APPROACH_DISTANCE_FT),
        Direction::South => (0, -APPROACH_DISTANCE_FT),
        Direction::East => (APPROACH_DISTANCE_FT, 0),
        Direction::West => (-APPROACH_DISTANCE_FT, 0),
    }
}

fn grid_offset(index: usize) -> Result<i64, RenderError> {
    i64::try_from(index)
        .ok()
        .and_then(|i| i.checked_mul(FALLBACK_SPACING_FT))
        .ok_or_else(|| RenderError::new(format!("intersections[{index}]"), "grid position overflow"))
}

fn project(site: &Site, origin: &Site, index: usize) -> Result<(i64, i64), RenderError> {
    let lon_feet = FEET_PER_DEGREE * origin.lat.to_radians().cos();
    let x = (site.lon - origin.lon) * lon_feet;
    let y = (site.lat - origin.lat) * FEET_PER_DEGREE;
    Ok((to_feet(x, index)?, to_feet(y, index)?))
}

fn to_feet(value: f64, index: usize) -> Result<i64, RenderError> {
    if !value.is_finite() || value.abs() >= MAX_COORDINATE_FT {
        return Err(RenderError::new(
            format!("intersections[{index}].location"),
            format!("coordinate {value} is outside the drawable area"),
        ));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(value.trunc() as i64)
}

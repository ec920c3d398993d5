//! Form intake: turns raw submissions into validated [`GenerationRequest`]s.
//!
//! Two shapes arrive here. The HTML form posts one intersection as flat
//! string fields; the JSON API posts a list of intersections. Both funnel
//! through [`IntersectionForm`] so the range checks live in one place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Lane count bounds per approach.
pub const LANES_RANGE: std::ops::RangeInclusive<i64> = 1..=6;

/// Posted speed bounds in mph.
pub const SPEED_RANGE: std::ops::RangeInclusive<i64> = 15..=70;

/// Signal cycle length bounds in seconds.
pub const CYCLE_LENGTH_RANGE: std::ops::RangeInclusive<i64> = 30..=300;

/// Speed used when the form leaves it blank.
pub const DEFAULT_SPEED_MPH: u8 = 30;

/// Most intersections accepted in one request.
pub const MAX_INTERSECTIONS: usize = 25;

const MAX_NAME_LEN: usize = 200;

/// Approach direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Northbound.
    #[serde(rename = "NB")]
    North,
    /// Southbound.
    #[serde(rename = "SB")]
    South,
    /// Eastbound.
    #[serde(rename = "EB")]
    East,
    /// Westbound.
    #[serde(rename = "WB")]
    West,
}

impl Direction {
    /// All directions in file column order.
    pub const ALL: [Self; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// Two-letter code used in Synchro files and form field names.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::North => "NB",
            Self::South => "SB",
            Self::East => "EB",
            Self::West => "WB",
        }
    }

    /// The direction of travel on the other side of the same road.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
        }
    }

    /// Column index in NB, SB, EB, WB order.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::North => 0,
            Self::South => 1,
            Self::East => 2,
            Self::West => 3,
        }
    }

    fn field_prefix(self) -> &'static str {
        match self {
            Self::North => "nb",
            Self::South => "sb",
            Self::East => "eb",
            Self::West => "wb",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Validated settings for one approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApproachSettings {
    /// Number of lanes, 1 to 6.
    pub lanes: u8,
    /// Posted speed in mph, 15 to 70.
    pub speed_mph: u8,
    /// Two-way left-turn lane present.
    pub twltl: bool,
}

/// A validated intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntersectionRequest {
    name: String,
    cycle_length: u16,
    approaches: [ApproachSettings; 4],
}

impl IntersectionRequest {
    /// The intersection name as entered, e.g. `Main St and Oak Ave, Detroit, MI`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal cycle length in seconds.
    #[must_use]
    pub fn cycle_length(&self) -> u16 {
        self.cycle_length
    }

    /// Settings for the approach travelling in `direction`.
    #[must_use]
    pub fn approach(&self, direction: Direction) -> &ApproachSettings {
        &self.approaches[direction.index()]
    }
}

/// A validated, immutable generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    requester: Option<String>,
    intersections: Vec<IntersectionRequest>,
}

impl GenerationRequest {
    /// E-mail of the person who submitted the form, if given.
    #[must_use]
    pub fn requester(&self) -> Option<&str> {
        self.requester.as_deref()
    }

    /// The intersections, in submission order. Never empty.
    #[must_use]
    pub fn intersections(&self) -> &[IntersectionRequest] {
        &self.intersections
    }

    /// Intersection names, in submission order.
    #[must_use]
    pub fn intersection_names(&self) -> Vec<&str> {
        self.intersections.iter().map(IntersectionRequest::name).collect()
    }
}

/// One intersection as submitted, before validation.
///
/// `lanes`, `speed` and `twltl` apply to every approach; the `nb_*`, `sb_*`,
/// `eb_*` and `wb_*` fields override them per direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct IntersectionForm {
    pub name: Option<String>,
    pub lanes: Option<i64>,
    pub speed: Option<i64>,
    pub cycle_length: Option<i64>,
    pub twltl: Option<bool>,
    pub nb_lanes: Option<i64>,
    pub nb_speed: Option<i64>,
    pub nb_twltl: Option<bool>,
    pub sb_lanes: Option<i64>,
    pub sb_speed: Option<i64>,
    pub sb_twltl: Option<bool>,
    pub eb_lanes: Option<i64>,
    pub eb_speed: Option<i64>,
    pub eb_twltl: Option<bool>,
    pub wb_lanes: Option<i64>,
    pub wb_speed: Option<i64>,
    pub wb_twltl: Option<bool>,
}

/// A JSON submission of one or more intersections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionForm {
    /// Requester e-mail.
    pub email: Option<String>,
    /// Intersections to generate.
    pub intersections: Vec<IntersectionForm>,
}

impl IntersectionForm {
    fn overrides(&self, direction: Direction) -> (Option<i64>, Option<i64>, Option<bool>) {
        match direction {
            Direction::North => (self.nb_lanes, self.nb_speed, self.nb_twltl),
            Direction::South => (self.sb_lanes, self.sb_speed, self.sb_twltl),
            Direction::East => (self.eb_lanes, self.eb_speed, self.eb_twltl),
            Direction::West => (self.wb_lanes, self.wb_speed, self.wb_twltl),
        }
    }

    fn set_overrides(&mut self, direction: Direction, values: (Option<i64>, Option<i64>, Option<bool>)) {
        let (lanes, speed, twltl) = values;
        match direction {
            Direction::North => {
                (self.nb_lanes, self.nb_speed, self.nb_twltl) = (lanes, speed, twltl);
            }
            Direction::South => {
                (self.sb_lanes, self.sb_speed, self.sb_twltl) = (lanes, speed, twltl);
            }
            Direction::East => {
                (self.eb_lanes, self.eb_speed, self.eb_twltl) = (lanes, speed, twltl);
            }
            Direction::West => {
                (self.wb_lanes, self.wb_speed, self.wb_twltl) = (lanes, speed, twltl);
            }
        }
    }

    /// Build a form from flat string fields, as posted by the HTML form.
    ///
    /// Blank values count as absent. Returns the form and the requester
    /// e-mail field.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the first field that is not a
    /// whole number or a recognisable checkbox value.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<(Self, Option<String>), ValidationError> {
        let text = |key: &str| {
            fields
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut form = Self {
            name: text("name"),
            lanes: parse_int(fields, "lanes")?,
            speed: parse_int(fields, "speed")?,
            cycle_length: parse_int(fields, "cycle_length")?,
            twltl: parse_flag(fields, "twltl")?,
            ..Self::default()
        };
        for direction in Direction::ALL {
            let prefix = direction.field_prefix();
            let values = (
                parse_int(fields, &format!("{prefix}_lanes"))?,
                parse_int(fields, &format!("{prefix}_speed"))?,
                parse_flag(fields, &format!("{prefix}_twltl"))?,
            );
            form.set_overrides(direction, values);
        }

        Ok((form, text("email")))
    }
}

fn parse_int(fields: &HashMap<String, String>, key: &str) -> Result<Option<i64>, ValidationError> {
    match fields.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ValidationError::new(key, format!("'{value}' is not a whole number"))),
    }
}

fn parse_flag(fields: &HashMap<String, String>, key: &str) -> Result<Option<bool>, ValidationError> {
    match fields.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(value) => match value.as_str() {
            "on" | "true" | "1" | "yes" => Ok(Some(true)),
            "" | "off" | "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ValidationError::new(key, format!("'{value}' is not a checkbox value"))),
        },
    }
}

/// Validate a flat HTML form submission.
///
/// Field names in errors are the bare form field names (`lanes`, `nb_speed`).
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn from_form_fields(fields: &HashMap<String, String>) -> Result<GenerationRequest, ValidationError> {
    let (form, email) = IntersectionForm::from_fields(fields)?;
    validate_single(email.as_deref(), &form)
}

/// Validate a single intersection with an optional requester.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_single(
    email: Option<&str>,
    form: &IntersectionForm,
) -> Result<GenerationRequest, ValidationError> {
    let requester = validate_email(email)?;
    let intersection = validate_intersection(form, "")?;
    Ok(GenerationRequest {
        requester,
        intersections: vec![intersection],
    })
}

/// Validate a JSON submission.
///
/// Field names in errors are paths such as `intersections[2].cycle_length`.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn from_submission(submission: &SubmissionForm) -> Result<GenerationRequest, ValidationError> {
    let requester = validate_email(submission.email.as_deref())?;

    if submission.intersections.is_empty() {
        return Err(ValidationError::new(
            "intersections",
            "at least one intersection is required",
        ));
    }
    if submission.intersections.len() > MAX_INTERSECTIONS {
        return Err(ValidationError::new(
            "intersections",
            format!("at most {MAX_INTERSECTIONS} intersections per request"),
        ));
    }

    let intersections = submission
        .intersections
        .iter()
        .enumerate()
        .map(|(i, form)| validate_intersection(form, &format!("intersections[{i}].")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GenerationRequest {
        requester,
        intersections,
    })
}

fn validate_email(email: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    let looks_valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !domain.contains('@')
    }) && !email.chars().any(char::is_whitespace);

    if looks_valid {
        Ok(Some(email.to_string()))
    } else {
        Err(ValidationError::new("email", "not a valid e-mail address"))
    }
}

fn validate_intersection(form: &IntersectionForm, prefix: &str) -> Result<IntersectionRequest, ValidationError> {
    let field = |name: &str| format!("{prefix}{name}");

    let name = form
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ValidationError::missing(field("name")))?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::new(
            field("name"),
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::new(
            field("name"),
            "must not contain tabs or line breaks",
        ));
    }

    let lanes = form.lanes.ok_or_else(|| ValidationError::missing(field("lanes")))?;
    let lanes = in_range(lanes, &LANES_RANGE, &field("lanes"))?;
    let speed = in_range(
        form.speed.unwrap_or(i64::from(DEFAULT_SPEED_MPH)),
        &SPEED_RANGE,
        &field("speed"),
    )?;
    let cycle_length = form
        .cycle_length
        .ok_or_else(|| ValidationError::missing(field("cycle_length")))?;
    let cycle_length = in_range(cycle_length, &CYCLE_LENGTH_RANGE, &field("cycle_length"))?;
    let twltl = form.twltl.unwrap_or(false);

    let mut approaches = [ApproachSettings {
        lanes: 0,
        speed_mph: 0,
        twltl,
    }; 4];
    for direction in Direction::ALL {
        let (dir_lanes, dir_speed, dir_twltl) = form.overrides(direction);
        let dir = direction.field_prefix();
        approaches[direction.index()] = ApproachSettings {
            lanes: match dir_lanes {
                Some(v) => in_range(v, &LANES_RANGE, &field(&format!("{dir}_lanes")))?,
                None => lanes,
            },
            speed_mph: match dir_speed {
                Some(v) => in_range(v, &SPEED_RANGE, &field(&format!("{dir}_speed")))?,
                None => speed,
            },
            twltl: dir_twltl.unwrap_or(twltl),
        };
    }

    Ok(IntersectionRequest {
        name: name.to_string(),
        cycle_length,
        approaches,
    })
}

fn in_range<T: TryFrom<i64>>(
    value: i64,
    range: &std::ops::RangeInclusive<i64>,
    field: &str,
) -> Result<T, ValidationError> {
    if !range.contains(&value) {
        return Err(ValidationError::new(
            field,
            format!(
                "must be between {} and {} (got {value})",
                range.start(),
                range.end()
            ),
        ));
    }
    T::try_from(value).map_err(|_| ValidationError::new(field, format!("{value} does not fit")))
}

// Snapshot of one device reply

use serde::{Deserialize, Serialize};

/// Number of comma-separated fields in a status reply
pub const STATUS_FIELDS: usize = 11;

/// Field names in wire order
pub const FIELD_NAMES: [&str; STATUS_FIELDS] = [
    "left_ref_speed",
    "right_ref_speed",
    "left_speed",
    "right_speed",
    "left_effort",
    "right_effort",
    "x_pos",
    "y_pos",
    "theta",
    "v",
    "w",
];

/// Device state reported after each command. Units are whatever the firmware uses.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Status {
    pub left_ref_speed: f64,
    pub right_ref_speed: f64,
    pub left_speed: f64,
    pub right_speed: f64,
    pub left_effort: f64,
    pub right_effort: f64,
    pub x_pos: f64,
    pub y_pos: f64,
    pub theta: f64,
    pub v: f64,
    pub w: f64,
}

impl Status {
    /// Build from fields in wire order
    pub fn from_fields(f: [f64; STATUS_FIELDS]) -> Self {
        Self {
            left_ref_speed: f[0],
            right_ref_speed: f[1],
            left_speed: f[2],
            right_speed: f[3],
            left_effort: f[4],
            right_effort: f[5],
            x_pos: f[6],
            y_pos: f[7],
            theta: f[8],
            v: f[9],
            w: f[10],
        }
    }

    /// Returns fields in wire order
    pub fn as_array(&self) -> [f64; STATUS_FIELDS] {
        [
            self.left_ref_speed,
            self.right_ref_speed,
            self.left_speed,
            self.right_speed,
            self.left_effort,
            self.right_effort,
            self.x_pos,
            self.y_pos,
            self.theta,
            self.v,
            self.w,
        ]
    }
}

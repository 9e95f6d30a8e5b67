//! Segment and road aggregation.
//!
//! Statistics records are joined to the road segment reference table,
//! ranked by fatal and severe accidents per km, and rolled up per road.
//! Each level yields a full table and a table of stretches of 1 km and more.

pub mod roads;
pub mod segments;
pub mod types;
pub mod utility;

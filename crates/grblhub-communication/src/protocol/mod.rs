//! Grbl ASCII protocol: line classification and numeric code lookups.

pub mod codes;
pub mod line_parser;

pub use line_parser::{
    GrblAlarm, GrblError, GrblMessage, LineParser, ParsedLine, StatusReport,
};

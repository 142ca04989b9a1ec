//! Text and JSON dumps of a session's time series.
//!
//! The text dump holds three blocks, pupil centers, reflection centers and
//! pupil angles, each framed by `#` comment lines and holding one row per
//! frame. Missing cells are written as `nan`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::normalize;
use crate::series::{RecordError, TimeSeries};

const PUPIL_TITLE: &str = "pupil data";
const REFLECTION_TITLE: &str = "reflection data";
const ANGLE_TITLE: &str = "angle data";
const POINT_UNITS: &str = "x,y (pixels)";
const ANGLE_UNITS: &str = "degrees";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error(transparent)]
    Record(#[from] RecordError),
}

pub type ExportResult<T> = Result<T, ExportError>;

pub fn export_text(series: &TimeSeries, path: &Path) -> ExportResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_text(series, &mut out)?;
    out.flush()?;
    log::debug!("wrote {} frame(s) of data to {}", series.len(), path.display());
    Ok(())
}

pub fn write_text<W: Write>(series: &TimeSeries, out: &mut W) -> ExportResult<()> {
    write_point_block(out, PUPIL_TITLE, series.pupil())?;
    writeln!(out, "# ")?;
    write_point_block(out, REFLECTION_TITLE, series.reflection())?;
    writeln!(out, "# ")?;
    writeln!(out, "# {ANGLE_TITLE}")?;
    writeln!(out, "# {ANGLE_UNITS}")?;
    for &angle in series.angle() {
        writeln!(out, "{}", format_value(angle, 6))?;
    }
    writeln!(out, "# end {ANGLE_TITLE}")?;
    Ok(())
}

fn write_point_block<W: Write>(out: &mut W, title: &str, points: &[[f64; 2]]) -> ExportResult<()> {
    writeln!(out, "# {title}")?;
    writeln!(out, "# {POINT_UNITS}")?;
    for point in points {
        writeln!(
            out,
            "{},{}",
            format_value(point[0], 0),
            format_value(point[1], 0)
        )?;
    }
    writeln!(out, "# end {title}")?;
    Ok(())
}

fn format_value(value: f64, precision: usize) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else {
        format!("{value:.precision$}")
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Block {
    Pupil,
    Reflection,
    Angle,
}

/// Parses a text dump back into a series.
pub fn parse_text(input: &str) -> ExportResult<TimeSeries> {
    let mut pupil = Vec::new();
    let mut reflection = Vec::new();
    let mut angle = Vec::new();
    let mut seen = [false; 3];
    let mut block: Option<Block> = None;

    for (i, raw) in input.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            let comment = comment.trim();
            let opened = match comment {
                PUPIL_TITLE => Some(Block::Pupil),
                REFLECTION_TITLE => Some(Block::Reflection),
                ANGLE_TITLE => Some(Block::Angle),
                _ => None,
            };
            if let Some(next) = opened {
                if block.is_some() {
                    return Err(parse_error(line_no, "block opened before the previous one ended"));
                }
                seen[next as usize] = true;
                block = Some(next);
            } else if comment.starts_with("end ") {
                block = None;
            }
            continue;
        }
        match block {
            Some(Block::Pupil) => pupil.push(parse_point(line, line_no)?),
            Some(Block::Reflection) => reflection.push(parse_point(line, line_no)?),
            Some(Block::Angle) => angle.push(parse_number(line, line_no)?),
            None => return Err(parse_error(line_no, "data row outside of a block")),
        }
    }

    if let Some(missing) = [PUPIL_TITLE, REFLECTION_TITLE, ANGLE_TITLE]
        .iter()
        .zip(seen)
        .find_map(|(title, seen)| (!seen).then_some(title))
    {
        return Err(parse_error(input.lines().count(), &format!("missing '{missing}' block")));
    }
    Ok(TimeSeries::from_parts(pupil, reflection, angle)?)
}

fn parse_point(line: &str, line_no: usize) -> ExportResult<[f64; 2]> {
    let mut parts = line.split(',');
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(parse_error(line_no, "expected 'x,y'"));
    };
    Ok([parse_number(x, line_no)?, parse_number(y, line_no)?])
}

fn parse_number(value: &str, line_no: usize) -> ExportResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|err| parse_error(line_no, &format!("invalid number '{}': {err}", value.trim())))
}

fn parse_error(line: usize, message: &str) -> ExportError {
    ExportError::Parse {
        line,
        message: message.to_string(),
    }
}

#[derive(Serialize)]
struct SeriesDump {
    frames: usize,
    pupil: Vec<Option<[f64; 2]>>,
    reflection: Vec<Option<[f64; 2]>>,
    angle: Vec<Option<f64>>,
    corrected: Vec<Option<[f64; 2]>>,
}

impl From<&TimeSeries> for SeriesDump {
    fn from(series: &TimeSeries) -> Self {
        let points = |values: &[[f64; 2]]| -> Vec<Option<[f64; 2]>> {
            values
                .iter()
                .map(|&v| normalize::is_valid(v).then_some(v))
                .collect()
        };
        Self {
            frames: series.len(),
            pupil: points(series.pupil()),
            reflection: points(series.reflection()),
            angle: series
                .angle()
                .iter()
                .map(|&a| a.is_finite().then_some(a))
                .collect(),
            corrected: points(&series.corrected()),
        }
    }
}

/// Same series as the text dump, with `null` for missing cells.
pub fn export_json(series: &TimeSeries, path: &Path, pretty: bool) -> ExportResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_json(series, &mut out, pretty)?;
    out.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(series: &TimeSeries, out: &mut W, pretty: bool) -> ExportResult<()> {
    let dump = SeriesDump::from(series);
    if pretty {
        serde_json::to_writer_pretty(out, &dump)?;
    } else {
        serde_json::to_writer(out, &dump)?;
    }
    Ok(())
}

//! Plain-text point tables
//!
//! Records are comma-, tab- or blank-separated numbers, one per line. Blank
//! lines and lines starting with `#` (comments) or `>` (segment headers) are
//! skipped. Columns are `x y z`, then the weight column when the layout asks
//! for one, then the source id column.
//!
//! Comma and tab tables go through the `csv` reader. Tables separated by
//! runs of spaces, which `csv` cannot split, are read line by line.

use std::io::{BufRead, Write};

use csv::{ReaderBuilder, StringRecordsIntoIter, Terminator, Trim, WriterBuilder};

use crate::error::{Error, Result};
use crate::point::PointRecord;

/// Which optional columns follow `x y z`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableLayout {
    pub weight: bool,
    pub source_id: bool,
}

impl TableLayout {
    /// Number of columns a record must carry
    pub fn n_columns(&self) -> usize {
        3 + usize::from(self.weight) + usize::from(self.source_id)
    }
}

/// Column separator of a point table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
    /// One or more spaces
    Whitespace,
}

impl Delimiter {
    /// Guess the separator from the first data line of `sample`
    pub fn detect(sample: &[u8]) -> Self {
        let line = sample
            .split(|&b| b == b'\n')
            .map(<[u8]>::trim_ascii)
            .find(|l| !l.is_empty() && !matches!(l[0], b'#' | b'>'))
            .unwrap_or_default();
        if line.contains(&b',') {
            Delimiter::Comma
        } else if line.contains(&b'\t') {
            Delimiter::Tab
        } else {
            Delimiter::Whitespace
        }
    }
}

enum Source<R> {
    Delimited(StringRecordsIntoIter<R>),
    Lines { reader: R, line: usize, buf: String },
}

/// Streaming reader yielding one [`PointRecord`] per data line
pub struct PointReader<R> {
    source: Source<R>,
    layout: TableLayout,
}

impl<R: BufRead> PointReader<R> {
    /// Reader whose separator is guessed from the start of the input
    pub fn new(mut reader: R, layout: TableLayout) -> Result<Self> {
        let delimiter = Delimiter::detect(reader.fill_buf()?);
        Ok(Self::with_delimiter(reader, layout, delimiter))
    }

    pub fn with_delimiter(reader: R, layout: TableLayout, delimiter: Delimiter) -> Self {
        let byte = match delimiter {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
            Delimiter::Whitespace => {
                return Self {
                    source: Source::Lines {
                        reader,
                        line: 0,
                        buf: String::new(),
                    },
                    layout,
                };
            }
        };
        let records = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .delimiter(byte)
            .from_reader(reader)
            .into_records();
        Self {
            source: Source::Delimited(records),
            layout,
        }
    }
}

fn is_header(first: &str) -> bool {
    first.starts_with(['#', '>'])
}

fn parse_fields(fields: &[&str], line: usize, layout: TableLayout) -> Result<PointRecord> {
    let needed = layout.n_columns();
    if fields.len() < needed {
        return Err(Error::Parse {
            line,
            reason: format!("expected {needed} columns, found {}", fields.len()),
        });
    }

    let number = |i: usize| -> Result<f64> {
        let field = fields[i];
        // NaN spellings are accepted so z gaps can be filtered later
        field.parse::<f64>().map_err(|_| Error::Parse {
            line,
            reason: format!("column {} is not a number: {field:?}", i + 1),
        })
    };

    let mut record = PointRecord::new(number(0)?, number(1)?, number(2)?);
    let mut next = 3;
    if layout.weight {
        record.weight = Some(number(next)?);
        next += 1;
    }
    if layout.source_id {
        let id = number(next)?;
        if !id.is_finite() || id < 0.0 {
            return Err(Error::Parse {
                line,
                reason: format!("source id must be a non-negative integer, got {id}"),
            });
        }
        record.source_id = Some(id.round() as u64);
    }
    Ok(record)
}

impl<R: BufRead> Iterator for PointReader<R> {
    type Item = Result<PointRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let layout = self.layout;
        match &mut self.source {
            Source::Delimited(records) => loop {
                let record = match records.next()? {
                    Ok(record) => record,
                    Err(e) => return Some(Err(e.into())),
                };
                let line = record.position().map_or(0, |p| p.line() as usize);
                let fields: Vec<&str> = record.iter().collect();
                match fields.as_slice() {
                    [] | [""] => continue,
                    [first, ..] if is_header(first) => continue,
                    _ => return Some(parse_fields(&fields, line, layout)),
                }
            },
            Source::Lines { reader, line, buf } => loop {
                buf.clear();
                match reader.read_line(buf) {
                    Ok(0) => return None,
                    Ok(_) => {}
                    Err(e) => return Some(Err(e.into())),
                }
                *line += 1;

                let text = buf.trim();
                if text.is_empty() || is_header(text) {
                    continue;
                }
                let fields: Vec<&str> = text.split_whitespace().collect();
                return Some(parse_fields(&fields, *line, layout));
            },
        }
    }
}

/// Read every record of a table into memory
pub fn read_points<R: BufRead>(reader: R, layout: TableLayout) -> Result<Vec<PointRecord>> {
    PointReader::new(reader, layout)?.collect()
}

/// Write rows of numbers as tab-separated lines
pub fn write_rows<W, I>(writer: W, rows: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Vec<f64>>,
{
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer);
    let mut n = 0;
    for row in rows {
        writer.write_record(row.iter().map(f64::to_string))?;
        n += 1;
    }
    writer.flush()?;
    Ok(n)
}

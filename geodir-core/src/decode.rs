//! Delimited-record decoding with absolute byte offsets.
//!
//! The header row is read once, from the start of the source. Data rows are
//! decoded from any byte offset at or after the end of the header, which is
//! how a resumed load restarts from its checkpoint.
//!
//! # Offsets
//!
//! Every [`DecodedRecord`] carries `end_offset`: the absolute position in the
//! source (header included) just past that record. Persisting that value and
//! reopening there starts on the next record, even when the previous record
//! contained quoted line breaks.
//!
//! # Malformed rows
//!
//! A row whose field count differs from the header, or that is not valid
//! UTF-8, is skipped and counted in [`DecodeStats`]. Only IO failures end the
//! stream with an error.
//!
//! An unterminated quote makes the reader swallow every following line up to
//! the next quote character. When a rejected row spans a line break, decoding
//! restarts just past the first line break of that row, so only the broken
//! line is lost.

use crate::error::{CoreError, Result};
use crate::record::{ColumnSet, RawRecord};
use csv::{ErrorKind, ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

const READ_BUFFER_BYTES: usize = 1 << 20;

/// Header row and where the data rows begin.
#[derive(Debug, Clone)]
pub struct Header {
    pub columns: ColumnSet,
    /// Absolute offset of the first data row.
    pub end_offset: u64,
}

/// A decoded data row and the absolute offset just past it.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub record: RawRecord,
    pub end_offset: u64,
}

/// Per-stream decode counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Rows decoded successfully.
    pub rows: u64,
    /// Rows skipped as malformed.
    pub malformed: u64,
}

/// Decoder for one delimiter.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedDecoder {
    delimiter: u8,
}

impl DelimitedDecoder {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    fn builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .buffer_capacity(READ_BUFFER_BYTES);
        builder
    }

    /// Read the header row from the start of `reader`.
    pub fn read_header<R: Read>(&self, reader: R) -> Result<Header> {
        let mut rdr = self.builder().from_reader(reader);
        let mut row = StringRecord::new();
        if !rdr.read_record(&mut row)? {
            return Err(CoreError::EmptySource);
        }
        let columns = ColumnSet::new(
            row.iter()
                .enumerate()
                .map(|(i, name)| if i == 0 { name.trim_start_matches('\u{feff}') } else { name }),
        );
        Ok(Header {
            columns,
            end_offset: rdr.position().byte(),
        })
    }

    /// Decode data rows from `reader`, which is positioned at absolute `start_offset`.
    pub fn records<R: Read + Seek>(
        &self,
        mut reader: R,
        start_offset: u64,
        columns: ColumnSet,
    ) -> Result<Records<R>> {
        let base = reader.stream_position()?;
        Ok(Records {
            reader: self.builder().from_reader(reader),
            columns,
            start_offset,
            base,
            stats: DecodeStats::default(),
            row: StringRecord::new(),
            finished: false,
        })
    }

    /// Read the header of the file at `path`.
    pub fn open_header(&self, path: &Path) -> Result<Header> {
        self.read_header(File::open(path)?)
    }

    /// Open `path` for data rows starting at `offset`.
    ///
    /// Offsets inside the header (including 0) start at the first data row.
    pub fn open_at(&self, path: &Path, header: &Header, offset: u64) -> Result<Records<File>> {
        let start = offset.max(header.end_offset);
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        self.records(file, start, header.columns.clone())
    }
}

/// Lazy iterator of decoded rows.
pub struct Records<R> {
    reader: csv::Reader<R>,
    columns: ColumnSet,
    start_offset: u64,
    /// Position of the underlying reader when decoding began.
    base: u64,
    stats: DecodeStats,
    row: StringRecord,
    finished: bool,
}

impl<R: Read + Seek> Records<R> {
    /// Counters so far.
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Absolute offset of the reader (past the last row read, skipped rows included).
    pub fn offset(&self) -> u64 {
        self.start_offset + self.reader.position().byte()
    }

    /// Restart decoding just past the first line break at or after `row_start`
    /// (relative to where decoding began). Returns `false` at end of input.
    fn resume_after_line(&mut self, row_start: u64) -> Result<bool> {
        let target = self.base + row_start;
        let inner = self.reader.get_mut();
        inner.seek(SeekFrom::Start(target))?;

        let mut buf = [0u8; 8192];
        let mut skipped = 0u64;
        loop {
            let n = inner.read(&mut buf)?;
            if n == 0 {
                return Ok(false);
            }
            if let Some(i) = buf[..n].iter().position(|&b| b == b'\n') {
                skipped += i as u64 + 1;
                break;
            }
            skipped += n as u64;
        }

        let mut pos = csv::Position::new();
        pos.set_byte(row_start + skipped);
        self.reader.seek_raw(SeekFrom::Start(target + skipped), pos)?;
        Ok(true)
    }
}

impl<R: Read + Seek> Iterator for Records<R> {
    type Item = Result<DecodedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let row_start = self.reader.position().byte();
            match self.reader.read_record(&mut self.row) {
                Ok(false) => self.finished = true,
                Ok(true) if self.row.len() != self.columns.len() => {
                    self.stats.malformed += 1;
                    tracing::trace!(
                        offset = self.start_offset + row_start,
                        fields = self.row.len(),
                        expected = self.columns.len(),
                        "skipping row with wrong field count"
                    );
                    if self.row.iter().any(|field| field.contains('\n')) {
                        match self.resume_after_line(row_start) {
                            Ok(true) => {}
                            Ok(false) => self.finished = true,
                            Err(e) => {
                                self.finished = true;
                                return Some(Err(e));
                            }
                        }
                    }
                }
                Ok(true) => {
                    self.stats.rows += 1;
                    return Some(Ok(DecodedRecord {
                        record: RawRecord::new(self.columns.clone(), self.row.clone()),
                        end_offset: self.offset(),
                    }));
                }
                Err(e) if matches!(e.kind(), ErrorKind::Io(_)) => {
                    self.finished = true;
                    return Some(Err(CoreError::Csv(e)));
                }
                Err(e) => {
                    self.stats.malformed += 1;
                    tracing::trace!(offset = self.offset(), error = %e, "skipping malformed row");
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "SIRET;name;geo\n1;a;48.1,2.1\n2;\"b;quoted\";48.2,2.2\n3;c\n4;\"multi\nline\";48.4,2.4\n";

    #[test]
    fn test_header_and_offsets() {
        let dec = DelimitedDecoder::new(b';');
        let header = dec.read_header(Cursor::new(SAMPLE)).unwrap();
        assert_eq!(header.columns.names(), &["SIRET", "name", "geo"]);
        assert_eq!(header.end_offset, "SIRET;name;geo\n".len() as u64);

        let bytes = SAMPLE.as_bytes();
        let start = header.end_offset as usize;
        let mut records = dec
            .records(Cursor::new(&bytes[start..]), header.end_offset, header.columns)
            .unwrap();
        let rows: Vec<_> = records.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].record.get("name"), Some("b;quoted"));
        assert_eq!(rows[2].record.get("name"), Some("multi\nline"));
        assert_eq!(rows[2].end_offset, SAMPLE.len() as u64);
        assert_eq!(records.stats(), DecodeStats { rows: 3, malformed: 1 });
    }

    #[test]
    fn test_resume_from_reported_offset() {
        let dec = DelimitedDecoder::new(b';');
        let bytes = SAMPLE.as_bytes();
        let header = dec.read_header(Cursor::new(bytes)).unwrap();
        let first: Vec<_> = dec
            .records(Cursor::new(&bytes[header.end_offset as usize..]), header.end_offset, header.columns.clone())
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        let resume_at = first[0].end_offset;
        let resumed: Vec<_> = dec
            .records(Cursor::new(&bytes[resume_at as usize..]), resume_at, header.columns)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(resumed.len(), 2);
        assert_eq!(resumed[0].record.get("SIRET"), Some("2"));
        assert_eq!(resumed[1].end_offset, first[2].end_offset);
    }

    #[test]
    fn test_invalid_utf8_is_skipped() {
        let mut data = b"a;b\n1;2\n".to_vec();
        data.extend_from_slice(&[0xff, 0xfe, b';', b'x', b'\n']);
        data.extend_from_slice(b"3;4\n");
        let dec = DelimitedDecoder::new(b';');
        let header = dec.read_header(Cursor::new(&data)).unwrap();
        let start = header.end_offset as usize;
        let mut records = dec
            .records(Cursor::new(&data[start..]), header.end_offset, header.columns)
            .unwrap();
        let keys: Vec<_> = records
            .by_ref()
            .map(|r| r.unwrap().record.get("a").unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["1", "3"]);
        assert_eq!(records.stats().malformed, 1);
    }

    #[test]
    fn test_unterminated_quote_loses_only_its_line() {
        let mut data = String::from("SIRET;name;geo\n1;a;48.1,2.1\n2;\"broken;48.2,2.2\n");
        for i in 3..=100 {
            data.push_str(&format!("{i};n{i};48.{i},2.{i}\n"));
        }
        let dec = DelimitedDecoder::new(b';');
        let bytes = data.as_bytes();
        let header = dec.read_header(Cursor::new(bytes)).unwrap();
        let start = header.end_offset as usize;
        let mut records = dec
            .records(Cursor::new(&bytes[start..]), header.end_offset, header.columns)
            .unwrap();
        let rows: Vec<_> = records.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 99);
        assert_eq!(rows[0].record.get("SIRET"), Some("1"));
        assert_eq!(rows[1].record.get("SIRET"), Some("3"));
        assert_eq!(rows[1].record.get("geo"), Some("48.3,2.3"));
        assert_eq!(rows[98].end_offset, data.len() as u64);
        assert_eq!(records.stats(), DecodeStats { rows: 99, malformed: 1 });

        // Offsets after the recovered row still resume on a row boundary
        let resume_at = rows[1].end_offset as usize;
        let resumed: Vec<_> = dec
            .records(Cursor::new(&bytes[resume_at..]), resume_at as u64, records.columns.clone())
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(resumed.len(), 97);
        assert_eq!(resumed[0].record.get("SIRET"), Some("4"));
    }

    #[test]
    fn test_unterminated_quote_on_last_line() {
        let data = "a;b\n1;2\n\"3;4\n";
        let dec = DelimitedDecoder::new(b';');
        let header = dec.read_header(Cursor::new(data)).unwrap();
        let start = header.end_offset as usize;
        let mut records = dec
            .records(Cursor::new(&data.as_bytes()[start..]), header.end_offset, header.columns)
            .unwrap();
        let rows: Vec<_> = records.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(records.stats().malformed, 1);
    }

    #[test]
    fn test_empty_source() {
        let dec = DelimitedDecoder::new(b';');
        assert!(matches!(dec.read_header(Cursor::new("")), Err(CoreError::EmptySource)));
    }

    #[test]
    fn test_open_at_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "\u{feff}k;v\nx;1\ny;2\n").unwrap();

        let dec = DelimitedDecoder::new(b';');
        let header = dec.open_header(&path).unwrap();
        assert_eq!(header.columns.names(), &["k", "v"]);

        let all: Vec<_> = dec.open_at(&path, &header, 0).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(all.len(), 2);

        let tail: Vec<_> = dec
            .open_at(&path, &header, all[0].end_offset)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].record.get("k"), Some("y"));
    }
}

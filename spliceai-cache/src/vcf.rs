//! Line-oriented VCF records
//!
//! Just enough of the text VCF format to stream records through the cache:
//! header lines are kept verbatim, data lines are split into their fixed
//! columns and an ordered INFO list. Everything else is carried through
//! untouched so that output lines match input lines apart from the INFO
//! fields the annotator sets.

use crate::error::{CacheError, FieldError, Result};
use flate2::read::MultiGzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MISSING: &str = ".";

/// Value of an INFO field on a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoValue<'a> {
    /// Flag field, present without a value
    Flag,
    /// Raw text value, multi-valued fields keep their commas
    Value(&'a str),
}

/// Read access to a variant record
///
/// `info` reports absence through [`FieldError::NotPresent`]; callers treat
/// that as "not set", never as a failure.
pub trait VariantRecord {
    fn chrom(&self) -> &str;
    fn pos(&self) -> u64;
    fn reference(&self) -> &str;
    /// Alternate alleles in record order
    fn alts(&self) -> &[String];
    fn info(&self, name: &str) -> std::result::Result<InfoValue<'_>, FieldError>;
}

/// VCF header: meta-information lines plus the `#CHROM` column line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcfHeader {
    meta: Vec<String>,
    columns: String,
}

impl VcfHeader {
    pub fn meta_lines(&self) -> &[String] {
        &self.meta
    }

    pub fn column_line(&self) -> &str {
        &self.columns
    }

    /// Whether an INFO field with this id is declared
    pub fn has_info(&self, id: &str) -> bool {
        let prefix = format!("##INFO=<ID={},", id);
        self.meta.iter().any(|line| line.starts_with(&prefix))
    }

    /// Declare an INFO field, keeping an existing declaration with the same id
    pub fn add_info_line(&mut self, id: &str, line: &str) {
        if !self.has_info(id) {
            self.meta.push(line.to_string());
        }
    }
}

impl fmt::Display for VcfHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.meta {
            writeln!(f, "{}", line)?;
        }
        writeln!(f, "{}", self.columns)
    }
}

/// One VCF data line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcfRecord {
    chrom: String,
    pos: u64,
    id: String,
    reference: String,
    alts: Vec<String>,
    qual: String,
    filter: String,
    info: Vec<(String, Option<String>)>,
    /// FORMAT and sample columns
    trailing: Vec<String>,
}

impl VcfRecord {
    /// Parse a tab-separated data line; `line_number` is only used in errors
    pub fn parse(line: &str, line_number: usize) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 8 {
            return Err(CacheError::Vcf {
                line: line_number,
                reason: format!("expected at least 8 columns, found {}", fields.len()),
            });
        }

        let pos = fields[1].parse::<u64>().map_err(|e| CacheError::Vcf {
            line: line_number,
            reason: format!("invalid POS '{}': {}", fields[1], e),
        })?;

        let alts = if fields[4] == MISSING {
            Vec::new()
        } else {
            fields[4].split(',').map(str::to_string).collect()
        };

        let info = if fields[7] == MISSING || fields[7].is_empty() {
            Vec::new()
        } else {
            fields[7]
                .split(';')
                .filter(|entry| !entry.is_empty())
                .map(|entry| match entry.split_once('=') {
                    Some((key, value)) => (key.to_string(), Some(value.to_string())),
                    None => (entry.to_string(), None),
                })
                .collect()
        };

        Ok(Self {
            chrom: fields[0].to_string(),
            pos,
            id: fields[2].to_string(),
            reference: fields[3].to_string(),
            alts,
            qual: fields[5].to_string(),
            filter: fields[6].to_string(),
            info,
            trailing: fields[8..].iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Minimal sites-only record
    pub fn new(
        chrom: impl Into<String>,
        pos: u64,
        reference: impl Into<String>,
        alts: Vec<String>,
    ) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            id: MISSING.to_string(),
            reference: reference.into(),
            alts,
            qual: MISSING.to_string(),
            filter: MISSING.to_string(),
            info: Vec::new(),
            trailing: Vec::new(),
        }
    }

    /// Raw INFO value, `None` for flags and absent fields
    pub fn info_value(&self, name: &str) -> Option<&str> {
        self.info
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Set a valued INFO field, replacing an existing entry in place
    pub fn set_info(&mut self, name: &str, value: impl Into<String>) {
        let value = Some(value.into());
        match self.info.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value,
            None => self.info.push((name.to_string(), value)),
        }
    }

    /// Set a flag INFO field
    pub fn set_flag(&mut self, name: &str) {
        match self.info.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = None,
            None => self.info.push((name.to_string(), None)),
        }
    }

    fn render_info(&self) -> String {
        if self.info.is_empty() {
            return MISSING.to_string();
        }
        self.info
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{}={}", key, value),
                None => key.clone(),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl VariantRecord for VcfRecord {
    fn chrom(&self) -> &str {
        &self.chrom
    }

    fn pos(&self) -> u64 {
        self.pos
    }

    fn reference(&self) -> &str {
        &self.reference
    }

    fn alts(&self) -> &[String] {
        &self.alts
    }

    fn info(&self, name: &str) -> std::result::Result<InfoValue<'_>, FieldError> {
        let mut matches = self.info.iter().filter(|(key, _)| key == name);
        let first = matches
            .next()
            .ok_or_else(|| FieldError::NotPresent(name.to_string()))?;
        if matches.next().is_some() {
            return Err(FieldError::Invalid {
                name: name.to_string(),
                reason: "INFO key appears more than once".to_string(),
            });
        }
        Ok(match &first.1 {
            Some(value) => InfoValue::Value(value),
            None => InfoValue::Flag,
        })
    }
}

impl fmt::Display for VcfRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alts = if self.alts.is_empty() {
            MISSING.to_string()
        } else {
            self.alts.join(",")
        };
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.pos,
            self.id,
            self.reference,
            alts,
            self.qual,
            self.filter,
            self.render_info()
        )?;
        for column in &self.trailing {
            write!(f, "\t{}", column)?;
        }
        Ok(())
    }
}

/// Streaming VCF reader: header first, then records
pub struct VcfReader<R> {
    inner: R,
    header: VcfHeader,
    line_number: usize,
}

impl<R: BufRead> VcfReader<R> {
    /// Read the header; the reader is left positioned at the first record
    pub fn new(mut inner: R) -> Result<Self> {
        let mut header = VcfHeader::default();
        let mut line_number = 0;
        let mut buf = String::new();

        loop {
            buf.clear();
            if inner.read_line(&mut buf)? == 0 {
                break;
            }
            line_number += 1;
            let line = buf.trim_end_matches(['\n', '\r']);
            if line.starts_with("##") {
                header.meta.push(line.to_string());
            } else if line.starts_with('#') {
                header.columns = line.to_string();
                break;
            } else {
                break;
            }
        }

        if header.columns.is_empty() {
            return Err(CacheError::Vcf {
                line: line_number,
                reason: "missing #CHROM header line".to_string(),
            });
        }

        Ok(Self {
            inner,
            header,
            line_number,
        })
    }

    pub fn header(&self) -> &VcfHeader {
        &self.header
    }

    /// Iterate over the remaining records
    pub fn records(&mut self) -> Records<'_, R> {
        Records { reader: self }
    }

    fn next_record(&mut self) -> Option<Result<VcfRecord>> {
        let mut buf = String::new();
        loop {
            buf.clear();
            match self.inner.read_line(&mut buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_number += 1;
            let line = buf.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            return Some(VcfRecord::parse(line, self.line_number));
        }
    }
}

/// Iterator over the records of a [`VcfReader`]
pub struct Records<'a, R> {
    reader: &'a mut VcfReader<R>,
}

impl<R: BufRead> Iterator for Records<'_, R> {
    type Item = Result<VcfRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_record()
    }
}

/// VCF text writer
pub struct VcfWriter<W: Write> {
    inner: W,
}

impl<W: Write> VcfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_header(&mut self, header: &VcfHeader) -> Result<()> {
        write!(self.inner, "{}", header)?;
        Ok(())
    }

    pub fn write_record(&mut self, record: &VcfRecord) -> Result<()> {
        writeln!(self.inner, "{}", record)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Wrap a reader, transparently decompressing gzip or bgzf input
pub fn decompress_if_needed<R: io::Read + 'static>(reader: R) -> Result<Box<dyn BufRead>> {
    let mut buffered = BufReader::new(reader);
    let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(buffered))))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Open a VCF input; `None` or `-` reads standard input
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) if path != Path::new("-") => decompress_if_needed(File::open(path)?),
        _ => decompress_if_needed(io::stdin()),
    }
}

/// Open a VCF output; `None` or `-` writes standard output
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) if path != Path::new("-") => {
            Ok(Box::new(io::BufWriter::new(File::create(path)?)))
        }
        _ => Ok(Box::new(io::BufWriter::new(io::stdout()))),
    }
}

use std::io;

pub use noodles_sam::header::ParseError;
use noodles_sam::{self as sam, Header};
use thiserror::Error;

/// Lines containing this are read group declarations and are dropped from the input header.
pub const READ_GROUP_MARKER: &str = "@RG";
pub const PROGRAM_ID: &str = "rgtools";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed fields written on every declared read group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadGroupFields {
    pub sample: String,
    pub platform: String,
    pub library: String,
    pub center: String,
}

impl ReadGroupFields {
    pub fn new<S: Into<String>>(sample: S) -> ReadGroupFields {
        ReadGroupFields {
            sample: sample.into(),
            platform: "Illumina".to_string(),
            library: "Solexa".to_string(),
            center: "BI".to_string(),
        }
    }

    fn declaration(&self, id: &str) -> String {
        format!(
            "@RG\tID:{}\tPL:{}\tLB:{}\tSM:{}\tCN:{}\n",
            id, self.platform, self.library, self.sample, self.center
        )
    }
}

/// Build the output header text.
///
/// Every line of `original` containing [`READ_GROUP_MARKER`] is removed, one `@RG` line per
/// group is appended in the order given, followed by an `@PG` line for this program recording
/// `invocation`. The result has no trailing newline.
pub fn rewrite<'a, I>(
    original: &str,
    groups: I,
    fields: &ReadGroupFields,
    invocation: &str,
) -> Result<String, HeaderError>
where
    I: IntoIterator<Item = &'a str>,
{
    if fields.sample.is_empty() {
        return Err(HeaderError::EmptySample);
    }

    let mut text = String::with_capacity(original.len() + 256);
    let mut program_ids = Vec::new();
    for line in original.lines().filter(|l| !l.contains(READ_GROUP_MARKER)) {
        if let Some(id) = program_id(line) {
            program_ids.push(id);
        }
        text.push_str(line);
        text.push('\n');
    }

    for group in groups {
        if group.is_empty() {
            return Err(HeaderError::EmptyReadGroup);
        }
        text.push_str(&fields.declaration(group));
    }

    text.push_str(&format!(
        "@PG\tID:{}\tVN:{}\tCL:{}\n",
        unique_program_id(&program_ids),
        VERSION,
        invocation
    ));
    text.pop();

    Ok(text)
}

fn program_id(line: &str) -> Option<&str> {
    let mut fields = line.split('\t');
    if fields.next() != Some("@PG") {
        return None;
    }
    fields.find_map(|f| f.strip_prefix("ID:"))
}

fn unique_program_id(existing: &[&str]) -> String {
    if !existing.contains(&PROGRAM_ID) {
        return PROGRAM_ID.to_string();
    }
    (1..)
        .map(|i| format!("{}.{}", PROGRAM_ID, i))
        .find(|candidate| !existing.contains(&candidate.as_str()))
        .unwrap_or_default()
}

/// Serialize a parsed header back to SAM header text.
pub fn header_text(header: &Header) -> io::Result<String> {
    let mut buf = Vec::new();
    sam::io::Writer::new(&mut buf).write_header(header)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn parse_header(text: &str) -> Result<Header, HeaderError> {
    Ok(text.parse::<Header>()?)
}

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("Sample name must not be empty")]
    EmptySample,
    #[error("Empty read group value in catalog")]
    EmptyReadGroup,
    #[error("Error parsing rewritten header: {0}")]
    Parse(#[from] ParseError),
    #[error("Error serializing header")]
    Io(#[from] io::Error),
}

//! Record log parser using nom
//!
//! File format:
//! ```text
//! BDAY001
//! [version: u32]
//! [record_count: u32]
//! ...records (\n-terminated)...
//! ```
//!
//! Record format:
//! ```text
//! name,YYYY-MM-DD
//! ```

use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::map_res,
    multi::many0,
    number::complete::le_u32,
    sequence::{separated_pair, terminated, tuple},
    IResult,
};

use crate::error::{Error, Result};
use crate::types::{Birthday, Name};

/// Magic header for store files
pub const BDAY_MAGIC: &[u8] = b"BDAY001\n";

/// Magic plus version plus record count
pub const HEADER_LEN: usize = BDAY_MAGIC.len() + 8;

/// Store file header
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHeader {
    /// File format version
    pub version: u32,
    /// Number of records in the file, as of the last clean close
    pub record_count: u32,
}

/// Parse the store file header
///
/// Format:
/// ```text
/// BDAY001\n
/// [4 bytes: version u32 little-endian]
/// [4 bytes: record_count u32 little-endian]
/// ```
pub fn parse_header(input: &[u8]) -> Result<StoreHeader> {
    if input.len() < HEADER_LEN {
        return Err(Error::Parse("Input too short for header".to_string()));
    }

    let (_, (_, version, record_count)) = tuple((tag(BDAY_MAGIC), le_u32, le_u32))(input)
        .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| {
            Error::Parse("Invalid store magic header".to_string())
        })?;

    Ok(StoreHeader {
        version,
        record_count,
    })
}

/// Create a store file header
pub fn create_header(version: u32, record_count: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(BDAY_MAGIC);
    header.extend_from_slice(&version.to_le_bytes());
    header.extend_from_slice(&record_count.to_le_bytes());
    header
}

fn name(input: &[u8]) -> IResult<&[u8], Name> {
    map_res(take_while1(|c: u8| c != b',' && c != b'\n'), |raw: &[u8]| {
        std::str::from_utf8(raw).map(Name::from)
    })(input)
}

fn birthday(input: &[u8]) -> IResult<&[u8], Birthday> {
    map_res(
        map_res(
            take_while1(|c: u8| c.is_ascii_digit() || c == b'-'),
            std::str::from_utf8,
        ),
        |s: &str| s.parse::<Birthday>(),
    )(input)
}

/// Parse a single `name,YYYY-MM-DD\n` record
pub fn parse_record(input: &[u8]) -> IResult<&[u8], (Name, Birthday)> {
    terminated(separated_pair(name, char(','), birthday), char('\n'))(input)
}

/// Parse consecutive records
///
/// Stops at the first byte that does not start a complete record and
/// returns the records with the number of bytes they span.
pub fn parse_records(input: &[u8]) -> Result<(Vec<(Name, Birthday)>, usize)> {
    let (rest, records) = many0(parse_record)(input)?;
    Ok((records, input.len() - rest.len()))
}

/// Encode a record
pub fn format_record(name: &Name, birthday: Birthday) -> Vec<u8> {
    format!("{},{}\n", name, birthday).into_bytes()
}

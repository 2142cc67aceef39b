//! Reader for the NumPy `.npy` members of the DermaMNIST archive.
//!
//! Only what the archive contains is supported: C-order `uint8` arrays,
//! format versions 1.0 through 3.0.

use derma_core::{Error, Result};

const MAGIC: &[u8] = b"\x93NUMPY";

/// A decoded `uint8` array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

impl NpyArray {
    /// Number of elements implied by the shape
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Parse a complete `.npy` file holding a `|u1` array
pub fn parse_u8_array(bytes: &[u8]) -> Result<NpyArray> {
    if bytes.len() < MAGIC.len() + 2 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(Error::Archive("missing NPY magic string".to_string()));
    }

    let major = bytes[MAGIC.len()];
    let mut offset = MAGIC.len() + 2;

    let header_len = match major {
        1 => {
            let raw = read_bytes::<2>(bytes, offset)?;
            offset += 2;
            u16::from_le_bytes(raw) as usize
        }
        2 | 3 => {
            let raw = read_bytes::<4>(bytes, offset)?;
            offset += 4;
            u32::from_le_bytes(raw) as usize
        }
        other => {
            return Err(Error::Archive(format!("unsupported NPY version {other}")));
        }
    };

    let header_end = offset + header_len;
    let header = bytes
        .get(offset..header_end)
        .ok_or_else(|| Error::Archive("truncated NPY header".to_string()))?;
    let header = std::str::from_utf8(header)
        .map_err(|e| Error::Archive(format!("NPY header is not text: {e}")))?;

    let descr = dict_value(header, "descr")?;
    let descr = descr.trim_matches(|c| c == '\'' || c == '"');
    if descr != "|u1" && descr != "u1" && descr != "<u1" {
        return Err(Error::Archive(format!("expected uint8 array, found dtype '{descr}'")));
    }

    if dict_value(header, "fortran_order")? != "False" {
        return Err(Error::Archive("Fortran-ordered arrays are not supported".to_string()));
    }

    let shape = parse_shape(dict_value(header, "shape")?)?;
    let expected: usize = shape.iter().product();

    let data = &bytes[header_end.min(bytes.len())..];
    if data.len() != expected {
        return Err(Error::Archive(format!(
            "NPY payload holds {} bytes, shape {:?} needs {}",
            data.len(),
            shape,
            expected
        )));
    }

    Ok(NpyArray {
        shape,
        data: data.to_vec(),
    })
}

fn read_bytes<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    bytes
        .get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| Error::Archive("truncated NPY preamble".to_string()))
}

/// Extract the raw text of `key`'s value from the header dict literal
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    let needle = format!("'{key}':");
    let start = header
        .find(&needle)
        .map(|pos| pos + needle.len())
        .ok_or_else(|| Error::Archive(format!("NPY header has no '{key}' entry")))?;
    let rest = header[start..].trim_start();

    // Tuples contain commas, so they end at the closing parenthesis
    let end = if rest.starts_with('(') {
        rest.find(')').map(|pos| pos + 1)
    } else {
        rest.find(|c| c == ',' || c == '}')
    }
    .ok_or_else(|| Error::Archive(format!("unterminated '{key}' entry in NPY header")))?;

    Ok(rest[..end].trim())
}

fn parse_shape(tuple: &str) -> Result<Vec<usize>> {
    let inner = tuple
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::Archive(format!("malformed NPY shape '{tuple}'")))?;

    inner
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|e| Error::Archive(format!("bad NPY dimension '{dim}': {e}")))
        })
        .collect()
}

/// Encode a `uint8` array as a version 1.0 `.npy` file
pub fn encode_u8_array(shape: &[usize], data: &[u8]) -> Vec<u8> {
    let dims = match shape {
        [single] => format!("{single},"),
        _ => shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "),
    };
    let mut header = format!("{{'descr': '|u1', 'fortran_order': False, 'shape': ({dims}), }}");

    // Preamble + header + newline is padded to a multiple of 64 bytes
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + data.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(data);
    out
}

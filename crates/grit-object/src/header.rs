//! The `"<type> <size>\0"` header prefixed to objects in storage form.

use crate::{ObjectError, ObjectType};

/// A decoded storage header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub obj_type: ObjectType,
    pub size: usize,
}

impl Header {
    /// Decode a header from the front of `data`.
    ///
    /// Returns the header and the number of bytes it occupied (including
    /// the NUL terminator).
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ObjectError> {
        let nul = data
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ObjectError::InvalidHeader("missing NUL terminator".into()))?;
        let head = &data[..nul];
        let space = head
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| ObjectError::InvalidHeader("missing space separator".into()))?;

        let obj_type = ObjectType::from_name(&head[..space])?;
        let size = std::str::from_utf8(&head[space + 1..])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| ObjectError::InvalidHeader("unparsable size field".into()))?;

        Ok((Self { obj_type, size }, nul + 1))
    }

    /// Encode a header for the given type and content size.
    pub fn encode(obj_type: ObjectType, size: usize) -> Vec<u8> {
        format!("{obj_type} {size}\0").into_bytes()
    }
}

use bstr::{BStr, BString};

use crate::ObjectError;

/// A raw commit timestamp: seconds since epoch plus the recorded timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitTime {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Timezone offset in minutes east of UTC.
    pub offset_minutes: i32,
}

/// An author/committer line: `"Name <email> <seconds> <±HHMM>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub time: GitTime,
}

impl Signature {
    /// Parse the value of an `author`/`committer` header.
    pub fn parse(data: &BStr) -> Result<Self, ObjectError> {
        let open = data
            .iter()
            .position(|&b| b == b'<')
            .ok_or_else(|| bad("missing '<'"))?;
        let close = data[open..]
            .iter()
            .position(|&b| b == b'>')
            .map(|p| p + open)
            .ok_or_else(|| bad("missing '>'"))?;

        let name = trim_spaces(&data[..open]);
        let email = &data[open + 1..close];

        let mut rest = data[close + 1..]
            .split(|&b| b == b' ')
            .filter(|f| !f.is_empty());
        let seconds = rest
            .next()
            .and_then(|f| std::str::from_utf8(f).ok())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| bad("unparsable timestamp"))?;
        let offset_minutes = rest
            .next()
            .and_then(parse_tz)
            .ok_or_else(|| bad("unparsable timezone"))?;

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            time: GitTime { seconds, offset_minutes },
        })
    }
}

/// Decode `±HHMM` into minutes east of UTC.
fn parse_tz(field: &[u8]) -> Option<i32> {
    let (sign, digits) = match field.first()? {
        b'+' => (1, &field[1..]),
        b'-' => (-1, &field[1..]),
        _ => (1, field),
    };
    if digits.len() != 4 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let raw: i32 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some(sign * (raw / 100 * 60 + raw % 100))
}

fn trim_spaces(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|&b| b != b' ').unwrap_or(data.len());
    let end = data.iter().rposition(|&b| b != b' ').map_or(start, |p| p + 1);
    &data[start..end]
}

fn bad(reason: &str) -> ObjectError {
    ObjectError::InvalidSignature(reason.into())
}

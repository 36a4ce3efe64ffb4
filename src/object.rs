//! Git object codec (component C). `build`/`parse` round-trip the
//! `type SP size NUL content` framing exactly as `git hash-object` expects.

use crate::errors::CasError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CasError> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            other => Err(CasError::format("object::type", format!("invalid type: {other}"))),
        }
    }
}

/// Build `type SP size NUL content`.
#[must_use]
pub fn build(object_type: ObjectType, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(object_type.as_str().len() + 1 + 20 + 1 + content.len());
    out.extend_from_slice(object_type.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(content.len().to_string().as_bytes());
    out.push(0);
    out.extend_from_slice(content);
    out
}

/// Zero-copy parse result: `content` is a view into the caller's buffer.
pub struct ParsedObject<'a> {
    pub object_type: ObjectType,
    pub content: &'a [u8],
}

pub fn parse(bytes: &[u8]) -> Result<ParsedObject<'_>, CasError> {
    if bytes.is_empty() {
        return Err(CasError::format("object::parse", "empty data"));
    }
    let space_pos = bytes
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| CasError::format("object::parse", "missing space separator"))?;
    let null_pos = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| CasError::format("object::parse", "missing NUL byte"))?;
    if null_pos < space_pos {
        return Err(CasError::format("object::parse", "missing space separator"));
    }

    let type_str = std::str::from_utf8(&bytes[..space_pos])
        .map_err(|_| CasError::format("object::parse", "invalid type encoding"))?;
    let object_type = ObjectType::parse(type_str)
        .map_err(|_| CasError::format("object::parse", format!("invalid type: {type_str}")))?;

    let size_str = &bytes[space_pos + 1..null_pos];
    if size_str.is_empty() || !size_str.iter().all(u8::is_ascii_digit) {
        return Err(CasError::format("object::parse", "invalid size: non-digit characters"));
    }
    let size_str = std::str::from_utf8(size_str).unwrap();
    let declared_size: usize = size_str
        .parse()
        .map_err(|_| CasError::format("object::parse", "invalid size: overflow"))?;

    let content = &bytes[null_pos + 1..];
    if content.len() != declared_size {
        return Err(CasError::format(
            "object::parse",
            format!("size mismatch: declared {declared_size}, actual {}", content.len()),
        ));
    }

    Ok(ParsedObject { object_type, content })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_blob() {
        let built = build(ObjectType::Blob, b"hello");
        let parsed = parse(&built).unwrap();
        assert_eq!(parsed.object_type, ObjectType::Blob);
        assert_eq!(parsed.content, b"hello");
    }

    #[test]
    fn round_trips_empty_blob() {
        let built = build(ObjectType::Blob, b"");
        assert_eq!(built, b"blob 0\0");
        let parsed = parse(&built).unwrap();
        assert_eq!(parsed.content, b"");
    }

    #[test]
    fn rejects_invalid_type() {
        let bytes = b"bogus 5\0hello";
        assert!(parse(bytes).is_err());
    }

    #[test]
    fn rejects_size_mismatch() {
        let bytes = b"blob 99\0hello";
        assert!(parse(bytes).is_err());
    }

    #[test]
    fn rejects_missing_null() {
        assert!(parse(b"blob 5 hello").is_err());
    }
}

use std::io::Read;
use std::path::Path;

/// Reads `path`'s contents, or stdin if `path` is `None` (`-` also means
/// stdin), matching the common CLI convention the teacher's import/export
/// commands followed for file-or-stdin arguments.
pub fn read_input(path: Option<&Path>) -> std::io::Result<Vec<u8>> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read(p),
        _ => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

pub fn parse_object_type(s: &str) -> crate::object::ObjectType {
    crate::object::ObjectType::parse(s).unwrap_or(crate::object::ObjectType::Blob)
}

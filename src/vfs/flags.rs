//! `open()` flag parsing: the seven POSIX fopen-style modes from the
//! operation table (r, w, a, r+, w+, a+, x).

use crate::errors::{CasError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    read: bool,
    write: bool,
    create: bool,
    truncate: bool,
    append: bool,
    exclusive: bool,
}

impl OpenFlags {
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "r" => Ok(Self { read: true, write: false, create: false, truncate: false, append: false, exclusive: false }),
            "r+" => Ok(Self { read: true, write: true, create: false, truncate: false, append: false, exclusive: false }),
            "w" => Ok(Self { read: false, write: true, create: true, truncate: true, append: false, exclusive: false }),
            "w+" => Ok(Self { read: true, write: true, create: true, truncate: true, append: false, exclusive: false }),
            "a" => Ok(Self { read: false, write: true, create: true, truncate: false, append: true, exclusive: false }),
            "a+" => Ok(Self { read: true, write: true, create: true, truncate: false, append: true, exclusive: false }),
            "x" => Ok(Self { read: false, write: true, create: true, truncate: true, append: false, exclusive: true }),
            other => Err(CasError::invalid("vfs::open", format!("unknown open mode {other}"))),
        }
    }

    #[must_use]
    pub fn readable(&self) -> bool {
        self.read
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.write
    }

    #[must_use]
    pub fn creates(&self) -> bool {
        self.create
    }

    #[must_use]
    pub fn truncates(&self) -> bool {
        self.truncate
    }

    #[must_use]
    pub fn appends(&self) -> bool {
        self.append
    }

    #[must_use]
    pub fn exclusive(&self) -> bool {
        self.exclusive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_mode_is_exclusive_create() {
        let f = OpenFlags::parse("x").unwrap();
        assert!(f.creates());
        assert!(f.exclusive());
    }

    #[test]
    fn r_plus_neither_creates_nor_truncates() {
        let f = OpenFlags::parse("r+").unwrap();
        assert!(f.readable());
        assert!(f.writable());
        assert!(!f.creates());
        assert!(!f.truncates());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(OpenFlags::parse("q").is_err());
    }
}

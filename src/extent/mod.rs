mod format;
mod packer;

pub use format::{ExtentHeader, FLAG_COMPRESSED, HEADER_LEN};
pub use packer::{
    Compression, ExtentGcOptions, ExtentGcResult, ExtentMeta, ExtentPacker, ExtentPackerConfig,
    FileRecord,
};

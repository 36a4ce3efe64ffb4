use std::path::PathBuf;

pub enum Command {
    Put { input: Option<PathBuf>, object_type: String },
    Get { hash: String, output: Option<PathBuf> },
    Has { hash: String },
    Delete { hash: String },
    Gc { dry_run: bool },
    Stats,
    Ls { path: String },
    Stat { path: String },
    Mkdir { path: String, recursive: bool, mode: u32 },
    Cat { path: String },
    Write { path: String, input: Option<PathBuf>, mode: u32 },
    Rm { path: String },
    FeatureList,
    FeatureEnable { name: String },
    FeatureDisable { name: String },
}

//! Runtime feature flag registry, independent of Cargo compile-time
//! features. Grounded on `utils::feature_flags`'s global `LazyLock<RwLock<..>>`
//! registry shape.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;

#[derive(Clone, Debug)]
pub struct FeatureFlag {
    pub name: String,
    pub enabled: bool,
    pub description: String,
}

static FLAGS: LazyLock<RwLock<HashMap<String, FeatureFlag>>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    map.insert(
        "existence-cache".to_string(),
        FeatureFlag {
            name: "existence-cache".to_string(),
            enabled: true,
            description: "Bloom-filter-backed existence cache in front of blob storage lookups."
                .to_string(),
        },
    );
    map.insert(
        "branch-overlay".to_string(),
        FeatureFlag {
            name: "branch-overlay".to_string(),
            enabled: false,
            description: "Per-branch copy-on-write page overlay with ancestor fallback."
                .to_string(),
        },
    );
    map.insert(
        "zstd-extents".to_string(),
        FeatureFlag {
            name: "zstd-extents".to_string(),
            enabled: cfg!(feature = "zstd-extents"),
            description: "Zstd compression for packed extents (requires Cargo feature 'zstd-extents')."
                .to_string(),
        },
    );
    RwLock::new(map)
});

pub fn set(name: &str, enabled: bool) -> bool {
    let mut g = FLAGS.write();
    if let Some(f) = g.get_mut(name) {
        f.enabled = enabled;
        true
    } else {
        false
    }
}

pub fn ensure(name: &str, default_enabled: bool, description: &str) {
    let mut g = FLAGS.write();
    g.entry(name.to_string()).or_insert_with(|| FeatureFlag {
        name: name.to_string(),
        enabled: default_enabled,
        description: description.to_string(),
    });
}

#[must_use]
pub fn is_enabled(name: &str) -> bool {
    FLAGS.read().get(name).is_some_and(|f| f.enabled)
}

#[must_use]
pub fn get(name: &str) -> Option<FeatureFlag> {
    FLAGS.read().get(name).cloned()
}

#[must_use]
pub fn list() -> Vec<FeatureFlag> {
    let mut flags: Vec<FeatureFlag> = FLAGS.read().values().cloned().collect();
    flags.sort_by(|a, b| a.name.cmp(&b.name));
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_extents_flag_tracks_cargo_feature() {
        assert_eq!(is_enabled("zstd-extents"), cfg!(feature = "zstd-extents"));
    }

    #[test]
    fn set_on_unknown_flag_returns_false() {
        assert!(!set("does-not-exist", true));
    }

    #[test]
    fn ensure_is_idempotent() {
        ensure("custom-flag", true, "test flag");
        ensure("custom-flag", false, "ignored on second call");
        assert!(is_enabled("custom-flag"));
    }
}

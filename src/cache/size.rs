use super::core::CachedObject;

#[inline]
#[must_use]
pub fn approximate_object_size(obj: &CachedObject) -> u64 {
    // content bytes plus a rough struct/key overhead estimate.
    obj.content.len() as u64 + 64
}

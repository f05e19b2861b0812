//! Key conventions for the environment stack
//!
//! Every cache in the stack is addressed by string keys. A key is either a
//! bare module name (`"a"`, used by the code and ast layers) or a
//! module-qualified class name (`"a.X"`, used by the class layers). The
//! module portion decides overlay ownership: an overlay for module `m` owns
//! exactly the keys whose module is `m`.

/// Dependency marker for external (root) queries with no dependent key.
pub const ROOT_QUERY: &str = "";

/// Module portion of a key.
///
/// For a bare module name this is the whole key; for `module.Class` it is
/// the text before the first `.`.
pub fn module_of(key: &str) -> &str {
    match key.split_once('.') {
        Some((module, _)) => module,
        None => key,
    }
}

/// Split a class key into `(module, class_name)`.
///
/// Returns `None` for keys without a `.` separator or with an empty side.
pub fn split_class_key(key: &str) -> Option<(&str, &str)> {
    let (module, name) = key.split_once('.')?;
    if module.is_empty() || name.is_empty() {
        return None;
    }
    Some((module, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_of_bare_module() {
        assert_eq!(module_of("a"), "a");
    }

    #[test]
    fn test_module_of_class_key() {
        assert_eq!(module_of("a.X"), "a");
    }

    #[test]
    fn test_module_of_root_query_marker() {
        assert_eq!(module_of(ROOT_QUERY), "");
    }

    #[test]
    fn test_split_class_key() {
        assert_eq!(split_class_key("mod.Class"), Some(("mod", "Class")));
        assert_eq!(split_class_key("mod"), None);
        assert_eq!(split_class_key(".Class"), None);
        assert_eq!(split_class_key("mod."), None);
    }

    #[test]
    fn test_split_class_key_keeps_dotted_remainder_together() {
        // The first dot separates module from name; any further dots stay
        // on the name side.
        assert_eq!(split_class_key("m.Outer.Inner"), Some(("m", "Outer.Inner")));
    }
}

//! Registry of include units already processed in a compilation run.
//!
//! Keys are file names stripped of directories and extension. A key is
//! activated at most once; later encounters report `AlreadyProcessed`
//! and the emitter skips the unit.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

/// Registry handle shared by every instance of one root compilation.
pub type SharedRegistry = Rc<RefCell<IncludeRegistry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New,
    AlreadyProcessed,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    offset: usize,
    len: usize,
    processed: bool,
}

#[derive(Debug, Default)]
pub struct IncludeRegistry {
    /// Stored key text; entries point into it by offset and length.
    names: String,
    entries: HashMap<String, Entry>,
}

impl IncludeRegistry {
    pub fn new() -> Self {
        IncludeRegistry::default()
    }

    pub fn shared() -> SharedRegistry {
        Rc::new(RefCell::new(IncludeRegistry::new()))
    }

    /// Key for a path without any case folding.
    pub fn key_for_path(path: &str) -> String {
        strip_path(path).to_string()
    }

    /// Key for an include directive. Keys that are not registered yet
    /// are lowercased; registered keys keep the casing they were stored
    /// with.
    pub fn normalize(&self, path: &str) -> String {
        let stripped = strip_path(path);
        if self.entries.contains_key(stripped) {
            stripped.to_string()
        } else {
            stripped.to_lowercase()
        }
    }

    /// Inserts `key` as processed if absent. Never mutates an existing entry.
    pub fn register_or_touch(&mut self, key: &str) -> Registration {
        if self.entries.contains_key(key) {
            debug!(key, "include already processed");
            return Registration::AlreadyProcessed;
        }
        let entry = Entry {
            offset: self.names.len(),
            len: key.len(),
            processed: true,
        };
        self.names.push_str(key);
        self.entries.insert(key.to_string(), entry);
        debug!(key, "registered include");
        Registration::New
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_processed(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.processed)
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> Vec<&str> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.offset);
        entries
            .into_iter()
            .map(|entry| &self.names[entry.offset..entry.offset + entry.len])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.names.clear();
        self.entries.clear();
    }
}

/// Drops directory components (`\`, `/`, `:`) and the extension.
fn strip_path(path: &str) -> &str {
    let name = match path.rfind(['\\', '/', ':']) {
        Some(index) => &path[index + 1..],
        None => path,
    };
    match name.rfind('.') {
        Some(index) if index > 0 => &name[..index],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_directories_and_extension() {
        assert_eq!(IncludeRegistry::key_for_path("C:\\mods\\scripts\\Lib.nss"), "Lib");
        assert_eq!(IncludeRegistry::key_for_path("a/b/nw_i0_plot.NSS"), "nw_i0_plot");
        assert_eq!(IncludeRegistry::key_for_path("drive:inc"), "inc");
        assert_eq!(IncludeRegistry::key_for_path("x_inc"), "x_inc");
    }

    #[test]
    fn lowercases_only_unregistered_keys() {
        let mut registry = IncludeRegistry::new();
        assert_eq!(registry.normalize("Lib_Util"), "lib_util");
        registry.register_or_touch("Lib_Util");
        assert_eq!(registry.normalize("dir/Lib_Util.nss"), "Lib_Util");
        assert_eq!(registry.normalize("LIB_UTIL"), "lib_util");
    }

    #[test]
    fn register_is_insert_if_absent() {
        let mut registry = IncludeRegistry::new();
        assert_eq!(registry.register_or_touch("inc"), Registration::New);
        assert_eq!(registry.register_or_touch("inc"), Registration::AlreadyProcessed);
        assert_eq!(registry.len(), 1);
        assert!(registry.is_processed("inc"));
    }

    #[test]
    fn keys_come_back_in_registration_order() {
        let mut registry = IncludeRegistry::new();
        for key in ["zeta", "alpha", "Mid"] {
            registry.register_or_touch(key);
        }
        assert_eq!(registry.keys(), vec!["zeta", "alpha", "Mid"]);
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.contains("zeta"));
    }
}

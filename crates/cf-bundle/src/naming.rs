//! Collision-free entry naming inside one archive.

use std::collections::HashSet;

/// Hands out entry names, suffixing duplicates as `name_1.ext`, `name_2.ext`.
#[derive(Debug, Default)]
pub struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name`, or the first free suffixed variant of it.
    pub fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }
        let (stem, ext) = split_extension(name);
        let mut n = 1u64;
        loop {
            let candidate = format!("{stem}_{n}{ext}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Whether `name` has already been handed out.
    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }
}

/// Split `name` into stem and extension (with its dot). Leading-dot names
/// and names without a dot have no extension.
pub(crate) fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claim_is_untouched() {
        let mut names = UniqueNames::new();
        assert_eq!(names.claim("out.png"), "out.png");
        assert!(names.contains("out.png"));
    }

    #[test]
    fn duplicates_get_increasing_suffixes() {
        let mut names = UniqueNames::new();
        assert_eq!(names.claim("out.png"), "out.png");
        assert_eq!(names.claim("out.png"), "out_1.png");
        assert_eq!(names.claim("out.png"), "out_2.png");
    }

    #[test]
    fn suffix_skips_names_already_taken() {
        let mut names = UniqueNames::new();
        names.claim("out_1.png");
        names.claim("out.png");
        assert_eq!(names.claim("out.png"), "out_2.png");
    }

    #[test]
    fn no_extension() {
        let mut names = UniqueNames::new();
        names.claim("README");
        assert_eq!(names.claim("README"), "README_1");
        names.claim(".env");
        assert_eq!(names.claim(".env"), ".env_1");
    }

    #[test]
    fn split_uses_last_dot() {
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
        assert_eq!(split_extension("plain"), ("plain", ""));
    }
}

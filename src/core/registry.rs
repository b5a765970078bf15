// src/core/registry.rs

use serde::{Deserialize, Serialize};

/// One analyzer service: where to reach it and how much its flag counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    pub endpoint: String,
    pub weight: f64,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, weight: f64) -> Self {
        Self { name: name.into(), endpoint: endpoint.into(), weight }
    }
}

/// The ordered, read-only set of analyzers an evaluation runs.
///
/// Registration order is the order reasons, reports and narratives are
/// presented in, regardless of the order in which calls complete.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRegistry {
    modules: Vec<ModuleSpec>,
}

impl ModuleRegistry {
    pub fn new(modules: Vec<ModuleSpec>) -> Self {
        Self { modules }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleSpec> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ModuleSpec> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Weight of a module; modules that are no longer registered count 1.
    pub fn weight(&self, name: &str) -> f64 {
        self.get(name).map_or(1.0, |m| m.weight)
    }

    /// Registration index, or `usize::MAX` for unknown modules so they sort last.
    pub fn position(&self, name: &str) -> usize {
        self.modules.iter().position(|m| m.name == name).unwrap_or(usize::MAX)
    }

    pub fn total_weight(&self) -> f64 {
        self.modules.iter().map(|m| m.weight).sum()
    }

    /// Sorts items by registration order, breaking ties on the module name.
    pub fn sort_by_registration<T>(&self, items: &mut [T], name_of: impl Fn(&T) -> &str) {
        items.sort_by(|a, b| {
            let (na, nb) = (name_of(a), name_of(b));
            self.position(na).cmp(&self.position(nb)).then_with(|| na.cmp(nb))
        });
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new(vec![
            ModuleSpec::new("domain_classifier", "http://127.0.0.1:6001/check", 1.0),
            ModuleSpec::new("anomaly_detector", "http://127.0.0.1:6002/check", 1.0),
            ModuleSpec::new("whois_analyzer", "http://127.0.0.1:6003/check", 1.0),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_modules_weigh_one_and_sort_last() {
        let registry = ModuleRegistry::new(vec![
            ModuleSpec::new("b", "http://b", 2.0),
            ModuleSpec::new("a", "http://a", 0.5),
        ]);
        assert_eq!(registry.weight("a"), 0.5);
        assert_eq!(registry.weight("zzz"), 1.0);
        assert_eq!(registry.total_weight(), 2.5);

        let mut names = vec!["zzz", "a", "b", "yyy"];
        registry.sort_by_registration(&mut names, |n| n);
        assert_eq!(names, vec!["b", "a", "yyy", "zzz"]);
    }
}

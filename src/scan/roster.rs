//! Student roster lookups.
//!
//! The directory is built once from configuration and stays immutable for the
//! run, so it can be shared freely across concurrent document scans.

use std::collections::HashMap;

/// A name variant resolved back to its canonical roster entry.
#[derive(Debug, Clone)]
pub struct VariantEntry {
    /// Canonical student id ("" when the roster has no id for this name).
    pub student_id: String,
    /// Display form of the name (the original roster spelling, dots intact).
    pub display_name: String,
}

/// Container for student roster lookups.
///
/// Names containing the middle-dot separator (common in transliterated
/// minority-language names) are also searchable with the separator stripped;
/// both spellings resolve to the same student.
#[derive(Debug, Clone, Default)]
pub struct StudentDirectory {
    name_to_id: HashMap<String, String>,
    id_to_name: HashMap<String, String>,
    searchable_names: Vec<String>,
    variant_lookup: HashMap<String, VariantEntry>,
}

const NAME_SEPARATOR: char = '·';

impl StudentDirectory {
    /// Build the directory from a name→id mapping.
    pub fn from_mapping(student_map: &HashMap<String, String>) -> Self {
        let mut name_to_id = HashMap::with_capacity(student_map.len());
        let mut id_to_name = HashMap::with_capacity(student_map.len());
        let mut searchable_names: Vec<String> = Vec::with_capacity(student_map.len());
        let mut variant_lookup = HashMap::with_capacity(student_map.len() * 2);

        // Deterministic iteration keeps searchable_names stable across runs.
        let mut entries: Vec<(&String, &String)> = student_map.iter().collect();
        entries.sort();

        for &(name, student_id) in &entries {
            name_to_id.insert(name.clone(), student_id.clone());
            id_to_name.insert(student_id.clone(), name.clone());
            searchable_names.push(name.clone());
            variant_lookup
                .entry(name.clone())
                .or_insert_with(|| VariantEntry {
                    student_id: student_id.clone(),
                    display_name: name.clone(),
                });
        }

        // Separator-stripped variants are appended after the originals and
        // never shadow a roster name that already exists without the dot.
        for &(name, student_id) in &entries {
            if !name.contains(NAME_SEPARATOR) {
                continue;
            }
            let stripped: String = name.chars().filter(|c| *c != NAME_SEPARATOR).collect();
            if name_to_id.contains_key(&stripped) {
                continue;
            }
            if !searchable_names.contains(&stripped) {
                searchable_names.push(stripped.clone());
            }
            variant_lookup.entry(stripped).or_insert_with(|| VariantEntry {
                student_id: student_id.clone(),
                display_name: name.clone(),
            });
        }

        Self {
            name_to_id,
            id_to_name,
            searchable_names,
            variant_lookup,
        }
    }

    /// Every name worth searching for: roster spellings plus stripped variants.
    pub fn searchable_names(&self) -> &[String] {
        &self.searchable_names
    }

    /// Resolve a searched name (original or variant) to its roster entry.
    pub fn resolve_variant(&self, name: &str) -> Option<&VariantEntry> {
        self.variant_lookup.get(name)
    }

    /// Iterate id→name pairs in deterministic order.
    pub fn id_name_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .id_to_name
            .iter()
            .map(|(id, name)| (id.as_str(), name.as_str()))
            .collect();
        pairs.sort();
        pairs
    }

    /// Look up the display name for a student id.
    pub fn resolve_name(&self, student_id: &str) -> Option<&str> {
        self.id_to_name.get(student_id).map(String::as_str)
    }

    /// Look up the id for an exact roster name.
    pub fn find_student_id(&self, name: &str) -> Option<&str> {
        self.name_to_id.get(name).map(String::as_str)
    }

    /// Number of students in the roster.
    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    /// True when the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }
}

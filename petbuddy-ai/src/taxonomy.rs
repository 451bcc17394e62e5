//! Label → species mapping
//!
//! The classifier emits breed labels only. Species is derived from membership
//! in a curated catalog of cat labels; every label outside the catalog maps to
//! Dog, including labels that are neither (a known limitation of a
//! breed-level vocabulary).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Closed species taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    Dog,
    Cat,
}

impl Species {
    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Dog => "Dog",
            Species::Cat => "Cat",
        }
    }
}

impl std::fmt::Display for Species {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a predicted label to a species
///
/// Total over its input: implementations must never fail.
pub trait SpeciesTaxonomy: Send + Sync {
    fn classify_species(&self, label: &str) -> Species;
}

/// Catalog-backed taxonomy: catalog member → Cat, otherwise Dog
#[derive(Debug, Clone)]
pub struct CatalogTaxonomy {
    cat_labels: HashSet<String>,
}

impl CatalogTaxonomy {
    pub fn new<I, S>(cat_labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cat_labels = cat_labels
            .into_iter()
            .map(|label| normalize_label(label.as_ref()))
            .filter(|label| !label.is_empty())
            .collect();
        Self { cat_labels }
    }

    pub fn len(&self) -> usize {
        self.cat_labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cat_labels.is_empty()
    }

    fn is_cat_label(&self, label: &str) -> bool {
        // ImageNet-style labels list synonyms: "tabby, tabby cat"
        label
            .split(',')
            .map(normalize_label)
            .any(|synonym| !synonym.is_empty() && self.cat_labels.contains(&synonym))
    }
}

impl Default for CatalogTaxonomy {
    fn default() -> Self {
        Self::new(default_cat_breeds())
    }
}

impl SpeciesTaxonomy for CatalogTaxonomy {
    fn classify_species(&self, label: &str) -> Species {
        if self.is_cat_label(label) {
            Species::Cat
        } else {
            Species::Dog
        }
    }
}

/// Case-fold and strip separators (`_`, `-`, whitespace)
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !(c.is_whitespace() || *c == '_' || *c == '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// "golden_retriever" → "Golden Retriever"
pub fn humanize_label(label: &str) -> String {
    let primary = label.split(',').next().unwrap_or(label);
    primary
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Built-in cat catalog: ImageNet felid classes plus common domestic breeds
pub fn default_cat_breeds() -> Vec<String> {
    [
        // ImageNet felids
        "tabby",
        "tabby cat",
        "tiger cat",
        "persian cat",
        "siamese cat",
        "egyptian cat",
        "cougar",
        "lynx",
        "leopard",
        "snow leopard",
        "jaguar",
        "lion",
        "tiger",
        "cheetah",
        "wildcat",
        // Domestic breeds
        "persian",
        "siamese",
        "maine coon",
        "ragdoll",
        "bengal",
        "sphynx",
        "british shorthair",
        "abyssinian",
        "birman",
        "russian blue",
        "scottish fold",
        "norwegian forest cat",
        "exotic shorthair",
        "burmese",
        "devon rex",
        "cornish rex",
        "oriental shorthair",
        "savannah",
        "tonkinese",
        "himalayan",
        "domestic shorthair",
        "domestic longhair",
        "cat",
        "kitten",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

//! Country resolution shared by every importer.
//!
//! [`resolve_entity`] maps an ISO3 code, an ISO2 code or any known spelling of
//! a country name to one canonical `(code, name)` pair, so that "Ivory Coast"
//! from one source and "Côte d'Ivoire" from another land on the same entity.
//! Matching ignores case, accents and punctuation.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

const COUNTRIES: &str = include_str!("../data/countries.txt");

/// A canonical country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    /// ISO 3166-1 alpha-3 (XKX for Kosovo)
    pub code: &'static str,
    pub iso2: &'static str,
    pub name: &'static str,
}

struct Registry {
    entities: Vec<Entity>,
    by_iso3: FxHashMap<&'static str, usize>,
    by_iso2: FxHashMap<&'static str, usize>,
    by_name: FxHashMap<String, usize>,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    let mut registry = Registry {
        entities: Vec::new(),
        by_iso3: FxHashMap::default(),
        by_iso2: FxHashMap::default(),
        by_name: FxHashMap::default(),
    };
    for line in COUNTRIES.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split('|');
        let (Some(code), Some(iso2), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let aliases = parts.next().unwrap_or("");

        let idx = registry.entities.len();
        registry.entities.push(Entity { code, iso2, name });
        registry.by_iso3.insert(code, idx);
        registry.by_iso2.insert(iso2, idx);
        for spelling in std::iter::once(name).chain(aliases.split(';')) {
            let key = normalize_name(spelling);
            if !key.is_empty() {
                registry.by_name.entry(key).or_insert(idx);
            }
        }
    }
    registry
});

/// Lowercase, strip accents and punctuation, expand "st", drop "the" and "and".
pub fn normalize_name(name: &str) -> String {
    let folded: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '`'))
        .map(|c| if c == '&' { ' ' } else { c })
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let words: Vec<&str> = folded
        .split_whitespace()
        .filter(|w| !matches!(*w, "the" | "and"))
        .map(|w| if w == "st" { "saint" } else { w })
        .collect();
    words.join(" ")
}

/// Resolve a country code or name to its canonical entity.
///
/// Two- and three-letter inputs are tried as ISO codes first. Names in
/// "Korea, Republic of" order are also tried with the parts swapped.
pub fn resolve_entity(name_or_code: &str) -> Option<Entity> {
    let registry = &*REGISTRY;
    let input = name_or_code.trim();
    if input.is_empty() {
        return None;
    }

    if input.chars().all(|c| c.is_ascii_alphabetic()) {
        let upper = input.to_ascii_uppercase();
        let hit = match upper.len() {
            3 => registry.by_iso3.get(upper.as_str()),
            2 => registry.by_iso2.get(upper.as_str()),
            _ => None,
        };
        if let Some(&idx) = hit {
            return Some(registry.entities[idx]);
        }
    }

    if let Some(&idx) = registry.by_name.get(&normalize_name(input)) {
        return Some(registry.entities[idx]);
    }

    let (head, tail) = input.split_once(',')?;
    let swapped = format!("{} {}", tail.trim(), head.trim());
    registry
        .by_name
        .get(&normalize_name(&swapped))
        .map(|&idx| registry.entities[idx])
}

/// Canonical ISO3 code, or `None` when unrecognized.
pub fn resolve_code(name_or_code: &str) -> Option<&'static str> {
    resolve_entity(name_or_code).map(|e| e.code)
}

/// All known entities, in table order.
pub fn all_entities() -> &'static [Entity] {
    &REGISTRY.entities
}

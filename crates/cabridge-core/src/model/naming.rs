//! Attribute and type naming conventions shared by introspection, inverse
//! detection and owner detection.

use convert_case::{Case, Casing};

/// Conventional suffix of untyped collection properties, e.g. `specimenCollection`.
pub const COLLECTION_SUFFIX: &str = "Collection";

const IRREGULAR: &[(&str, &str)] = &[
    ("child", "children"),
    ("datum", "data"),
    ("person", "people"),
];

/// `firstName` -> `first_name`
#[must_use]
pub fn underscore(name: &str) -> String {
    name.to_case(Case::Snake)
}

/// `first_name` -> `firstName`
#[must_use]
pub fn camelize(name: &str) -> String {
    name.to_case(Case::Camel)
}

/// `specimen_collection_group` -> `SpecimenCollectionGroup`
#[must_use]
pub fn pascalize(name: &str) -> String {
    name.to_case(Case::Pascal)
}

/// Strip a package prefix: `edu.wustl.catissuecore.domain.Site` -> `Site`.
#[must_use]
pub fn demodulize(name: &str) -> &str {
    name.rsplit(['.', ':']).next().unwrap_or(name)
}

/// Underscored simple type name, used to match attributes named after a type.
#[must_use]
pub fn type_symbol(type_name: &str) -> String {
    underscore(demodulize(type_name))
}

#[must_use]
pub fn pluralize(word: &str) -> String {
    let (stem, last) = split_last_word(word);
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == last) {
        return format!("{stem}{plural}");
    }
    if last.ends_with('s') && !last.ends_with("ss") {
        return word.to_string();
    }

    let plural = if ends_with_consonant_y(last) {
        format!("{}ies", &last[..last.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| last.ends_with(s)) {
        format!("{last}es")
    } else {
        format!("{last}s")
    };

    format!("{stem}{plural}")
}

#[must_use]
pub fn singularize(word: &str) -> String {
    let (stem, last) = split_last_word(word);
    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == last) {
        return format!("{stem}{singular}");
    }

    let singular = if let Some(base) = last.strip_suffix("ies") {
        format!("{base}y")
    } else if let Some(base) = ["sses", "xes", "zes", "ches", "shes"]
        .into_iter()
        .find_map(|suffix: &str| {
            last.strip_suffix(suffix)
                .map(|base| format!("{base}{}", &suffix[..suffix.len() - 2]))
        })
    {
        base
    } else if let Some(base) = last.strip_suffix('s')
        && !last.ends_with("ss")
    {
        base.to_string()
    } else {
        last.to_string()
    };

    format!("{stem}{singular}")
}

/// Canonical symbol for a native property name. Collection properties drop a
/// trailing `Collection` and pluralize the stem.
#[must_use]
pub fn attribute_symbol(property: &str, collection: bool) -> String {
    if !collection {
        return underscore(property);
    }

    let stem = property
        .strip_suffix(COLLECTION_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(property);

    pluralize(&underscore(stem))
}

// split_last_word
// operate on the final snake_case segment only
fn split_last_word(word: &str) -> (&str, &str) {
    match word.rfind('_') {
        Some(pos) => (&word[..=pos], &word[pos + 1..]),
        None => ("", word),
    }
}

fn ends_with_consonant_y(word: &str) -> bool {
    let mut chars = word.chars().rev();
    matches!(
        (chars.next(), chars.next()),
        (Some('y'), Some(c)) if !"aeiou".contains(c)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underscore_and_camelize_are_inverse_for_simple_names() {
        assert_eq!(underscore("firstName"), "first_name");
        assert_eq!(camelize("first_name"), "firstName");
        assert_eq!(pascalize("specimen_collection_group"), "SpecimenCollectionGroup");
    }

    #[test]
    fn demodulize_strips_package() {
        assert_eq!(demodulize("edu.wustl.catissuecore.domain.Site"), "Site");
        assert_eq!(demodulize("Site"), "Site");
        assert_eq!(type_symbol("edu.wustl.CollectionProtocol"), "collection_protocol");
    }

    #[test]
    fn pluralize_handles_common_endings() {
        assert_eq!(pluralize("site"), "sites");
        assert_eq!(pluralize("study"), "studies");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("external_identifier"), "external_identifiers");
        assert_eq!(pluralize("child"), "children");
        assert_eq!(pluralize("day"), "days");
    }

    #[test]
    fn singularize_reverses_pluralize() {
        for word in ["site", "study", "address", "child", "specimen_event", "box"] {
            assert_eq!(singularize(&pluralize(word)), word);
        }
    }

    #[test]
    fn collection_symbol_drops_suffix_and_pluralizes() {
        assert_eq!(attribute_symbol("specimenCollection", true), "specimens");
        assert_eq!(attribute_symbol("siteCollection", true), "sites");
        assert_eq!(attribute_symbol("registrations", true), "registrations");
        assert_eq!(attribute_symbol("firstName", false), "first_name");
    }
}

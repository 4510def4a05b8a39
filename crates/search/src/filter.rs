//! Attribute filter syntax: `color:red,black|size:S,M`.

use std::collections::{BTreeMap, BTreeSet};

/// Flatten a filter string into `name:value` terms.
///
/// Groups are separated by `|`, values by `,`. Groups without a `:` or with
/// an empty name are skipped; empty values are dropped.
pub fn parse_filters(raw: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for group in raw.split('|').map(str::trim).filter(|g| !g.is_empty()) {
        let Some((name, values)) = group.split_once(':') else {
            tracing::warn!(group = %group, "malformed filter group");
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            tracing::warn!(group = %group, "filter group without a name");
            continue;
        }
        terms.extend(
            values
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| format!("{name}:{v}")),
        );
    }
    terms
}

/// Group flattened terms by attribute name; values of one name are alternatives.
pub fn group_filters(terms: &[String]) -> BTreeMap<String, BTreeSet<String>> {
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for term in terms {
        if let Some((name, _)) = term.split_once(':') {
            groups.entry(name.to_string()).or_default().insert(term.clone());
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_groups_and_values() {
        assert_eq!(
            parse_filters("color:red,black|size:S,M"),
            vec!["color:red", "color:black", "size:S", "size:M"]
        );
    }

    #[test]
    fn skips_malformed_groups_and_blank_values() {
        assert_eq!(parse_filters("color|:red| size : L , ,|"), vec!["size:L"]);
        assert!(parse_filters("").is_empty());
        assert!(parse_filters("   ").is_empty());
    }

    #[test]
    fn value_may_contain_colons() {
        assert_eq!(parse_filters("ratio:16:9"), vec!["ratio:16:9"]);
    }

    #[test]
    fn groups_by_name() {
        let groups = group_filters(&parse_filters("color:red,black|size:S"));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["color"].len(), 2);
    }
}

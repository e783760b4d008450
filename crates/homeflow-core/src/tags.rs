//! Tag parsing and matching.
//!
//! A tag is either a bare token (`light`) or a `key:value` pair
//! (`room:kitchen`). Keys compare case-insensitively, values exactly; an
//! empty requested value matches any value.

/// Splits a tag at its first `:`. Tags starting with `:` have no value.
pub fn split_tag(tag: &str) -> (&str, &str) {
    if tag.starts_with(':') {
        return (tag, "");
    }
    match tag.split_once(':') {
        Some((key, value)) => (key, value),
        None => (tag, ""),
    }
}

/// True if `expected` is satisfied by `tag`
pub fn tag_matches(tag: &str, expected: &str) -> bool {
    let (key, value) = split_tag(tag);
    let (expected_key, expected_value) = split_tag(expected);
    key.eq_ignore_ascii_case(expected_key) && (expected_value.is_empty() || value == expected_value)
}

/// Every expected tag is present
pub fn has_all_tags<S: AsRef<str>>(tags: &[String], expected: &[S]) -> bool {
    expected
        .iter()
        .all(|e| tags.iter().any(|t| tag_matches(t, e.as_ref())))
}

/// At least one expected tag is present; an empty expectation always matches
pub fn has_at_least_one_tag<S: AsRef<str>>(tags: &[String], expected: &[S]) -> bool {
    expected.is_empty()
        || expected
            .iter()
            .any(|e| tags.iter().any(|t| tag_matches(t, e.as_ref())))
}

/// Logical AND across groups, OR within a group
pub fn has_at_least_one_tag_per_group<S: AsRef<str>>(tags: &[String], groups: &[Vec<S>]) -> bool {
    groups.iter().all(|g| has_at_least_one_tag(tags, g))
}

/// Turns a flat list of tags into single-tag groups, i.e. an all-of query
pub fn single_tag_groups<S: AsRef<str>>(tags: &[S]) -> Vec<Vec<String>> {
    tags.iter().map(|t| vec![t.as_ref().to_string()]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn splits_at_first_colon() {
        assert_eq!(split_tag("f:a:shiZ:s"), ("f", "a:shiZ:s"));
        assert_eq!(split_tag(":yes:man"), (":yes:man", ""));
        assert_eq!(split_tag("footag:"), ("footag", ""));
        assert_eq!(split_tag("plain"), ("plain", ""));
    }

    #[test]
    fn empty_value_is_wildcard() {
        let t = tags(&["room:kitchen", "light"]);
        assert!(has_all_tags(&t, &["ROOM"]));
        assert!(has_all_tags(&t, &["room:kitchen", "light"]));
        assert!(!has_all_tags(&t, &["room:bath"]));
    }

    #[test]
    fn groups_and_across_or_within() {
        let t = tags(&["t1", "t4"]);
        assert!(has_at_least_one_tag_per_group(
            &t,
            &[vec!["t1"], vec!["t2", "t4"]]
        ));
        assert!(!has_at_least_one_tag_per_group(&t, &[vec!["t2"], vec!["t4"]]));
        let none: &[Vec<&str>] = &[];
        assert!(has_at_least_one_tag_per_group(&t, none));
    }
}

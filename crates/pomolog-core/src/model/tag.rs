//! `#hashtags` in workitem names.
//!
//! Tags are not stored. They are derived from the names of a user's
//! workitems whenever asked for, so replay and compaction never need to know
//! about them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use super::user::User;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("valid tag regex"));

/// Tag name to the uids of the workitems carrying it, in display order.
pub type TagIndex = BTreeMap<String, Vec<String>>;

/// Lowercased tags of `name`, each once, in order of first appearance.
pub fn tags_in(name: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for caps in TAG_RE.captures_iter(name) {
        let tag = caps[1].to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Every tag used across `user`'s workitems.
pub fn tag_index(user: &User) -> TagIndex {
    let mut index = TagIndex::new();
    for workitem in user.backlogs().flat_map(|b| b.workitems()) {
        for tag in tags_in(workitem.name()) {
            index.entry(tag).or_default().push(workitem.uid().to_string());
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_without_tags() {
        for name in [
            "There are no tags",
            "Trying ## x",
            "Trying #. x",
            "Trying # x",
            "# trying",
            "##. another",
        ] {
            assert!(tags_in(name).is_empty(), "{name}");
        }
    }

    #[test]
    fn tags_are_lowercased_words() {
        assert_eq!(tags_in("There are #two tags #three"), vec!["two", "three"]);
        assert_eq!(tags_in("#four and #four again"), vec!["four"]);
        assert_eq!(tags_in("###eight"), vec!["eight"]);
        assert_eq!(tags_in("#десять"), vec!["десять"]);
        assert_eq!(tags_in("#twelve_12 #_"), vec!["twelve_12", "_"]);
        assert_eq!(tags_in("#fourteen-14"), vec!["fourteen"]);
        assert_eq!(tags_in("#SIXTEEN #Sixteen"), vec!["sixteen"]);
    }
}

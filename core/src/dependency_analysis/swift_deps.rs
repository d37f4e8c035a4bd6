//! Decoding of a single swiftdeps file into provides / depends facts.
//!
//! A swiftdeps file is a YAML mapping from section name to a sequence of
//! entries. Entries are names, or `[owner, member]` pairs for the member
//! sections, and may carry a `!private` tag.

use super::DependencyItem;
use serde_yaml::Value;
use thiserror::Error;

/// Errors in the swiftdeps file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwiftDepsParseError {
    #[error("could not decode swiftdeps contents: {0}")]
    CouldNotDecode(String),

    #[error("section name is not a string")]
    SectionNameNotString,

    #[error("entry in `{section}` is not a string")]
    NameEntryNotString { section: String },

    #[error("entry in `{section}` is not a pair of strings")]
    MemberEntryNotStringPair { section: String },

    #[error("entry in `{section}` is tagged !private, providers are always public")]
    PrivateProvider { section: String },
}

/// One fact read from a swiftdeps file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fact {
    Provides(DependencyItem),
    Depends {
        item: DependencyItem,
        is_cascading: bool,
    },
    External(String),
}

#[derive(Debug, Clone, Copy)]
enum Section {
    ProvidesTopLevel,
    ProvidesNominal,
    ProvidesMember,
    ProvidesDynamicLookup,
    DependsTopLevel,
    DependsNominal,
    DependsMember,
    DependsDynamicLookup,
    DependsExternal,
}

impl Section {
    fn from_name(name: &str) -> Option<Self> {
        let section = match name {
            "provides-top-level" => Section::ProvidesTopLevel,
            "provides-nominal" => Section::ProvidesNominal,
            "provides-member" => Section::ProvidesMember,
            "provides-dynamic-lookup" => Section::ProvidesDynamicLookup,
            "depends-top-level" => Section::DependsTopLevel,
            "depends-nominal" => Section::DependsNominal,
            "depends-member" => Section::DependsMember,
            "depends-dynamic-lookup" => Section::DependsDynamicLookup,
            "depends-external" => Section::DependsExternal,
            // `interface-hash` is not needed for distributed building.
            _ => return None,
        };
        Some(section)
    }
}

/// Parse the contents of one swiftdeps file.
///
/// Nothing is returned unless the whole file decodes, so a malformed file
/// never leaves half of its facts behind.
pub(crate) fn parse_swift_deps(contents: &str) -> Result<Vec<Fact>, SwiftDepsParseError> {
    let root: Value = serde_yaml::from_str(contents)
        .map_err(|e| SwiftDepsParseError::CouldNotDecode(e.to_string()))?;
    let Value::Mapping(sections) = root else {
        return Err(SwiftDepsParseError::CouldNotDecode(
            "top level is not a mapping".to_string(),
        ));
    };

    let mut facts = Vec::new();
    for (key, value) in &sections {
        let Value::String(name) = key else {
            return Err(SwiftDepsParseError::SectionNameNotString);
        };
        let Some(section) = Section::from_name(name) else {
            continue;
        };

        match section {
            Section::ProvidesTopLevel => {
                for (entry, _) in provider_names(name, value)? {
                    facts.push(Fact::Provides(DependencyItem::TopLevel(entry)));
                }
            }
            Section::ProvidesNominal => {
                for (entry, _) in provider_names(name, value)? {
                    facts.push(Fact::Provides(DependencyItem::Nominal(entry)));
                }
            }
            Section::ProvidesDynamicLookup => {
                for (entry, _) in provider_names(name, value)? {
                    facts.push(Fact::Provides(DependencyItem::DynamicLookup(entry)));
                }
            }
            Section::ProvidesMember => {
                for (owner, member, is_private) in decode_member_sequence(name, value)? {
                    if is_private {
                        return Err(SwiftDepsParseError::PrivateProvider {
                            section: name.clone(),
                        });
                    }
                    facts.push(Fact::Provides(DependencyItem::Member(owner, member)));
                }
            }
            Section::DependsTopLevel => {
                for (entry, is_private) in decode_name_sequence(name, value)? {
                    facts.push(depends(DependencyItem::TopLevel(entry), is_private));
                }
            }
            Section::DependsNominal => {
                for (entry, is_private) in decode_name_sequence(name, value)? {
                    facts.push(depends(DependencyItem::Nominal(entry), is_private));
                }
            }
            Section::DependsDynamicLookup => {
                for (entry, is_private) in decode_name_sequence(name, value)? {
                    facts.push(depends(DependencyItem::DynamicLookup(entry), is_private));
                }
            }
            Section::DependsMember => {
                for (owner, member, is_private) in decode_member_sequence(name, value)? {
                    facts.push(depends(DependencyItem::Member(owner, member), is_private));
                }
            }
            Section::DependsExternal => {
                for (entry, _) in provider_names(name, value)? {
                    facts.push(Fact::External(entry));
                }
            }
        }
    }
    Ok(facts)
}

fn depends(item: DependencyItem, is_private: bool) -> Fact {
    Fact::Depends {
        item,
        is_cascading: !is_private,
    }
}

/// Like [`decode_name_sequence`], for sections whose entries may never be
/// private.
fn provider_names(
    section: &str,
    node: &Value,
) -> Result<Vec<(String, bool)>, SwiftDepsParseError> {
    let names = decode_name_sequence(section, node)?;
    if names.iter().any(|(_, is_private)| *is_private) {
        return Err(SwiftDepsParseError::PrivateProvider {
            section: section.to_string(),
        });
    }
    Ok(names)
}

fn decode_name_sequence(
    section: &str,
    node: &Value,
) -> Result<Vec<(String, bool)>, SwiftDepsParseError> {
    sequence(node)
        .iter()
        .map(|element| {
            let (value, is_private) = untag(element);
            scalar_text(value)
                .map(|name| (name, is_private))
                .ok_or_else(|| SwiftDepsParseError::NameEntryNotString {
                    section: section.to_string(),
                })
        })
        .collect()
}

fn decode_member_sequence(
    section: &str,
    node: &Value,
) -> Result<Vec<(String, String, bool)>, SwiftDepsParseError> {
    sequence(node)
        .iter()
        .map(|element| {
            let (value, is_private) = untag(element);
            match sequence(value) {
                [owner, member] => match (scalar_text(owner), scalar_text(member)) {
                    (Some(owner), Some(member)) => Ok((owner, member, is_private)),
                    _ => Err(SwiftDepsParseError::MemberEntryNotStringPair {
                        section: section.to_string(),
                    }),
                },
                _ => Err(SwiftDepsParseError::MemberEntryNotStringPair {
                    section: section.to_string(),
                }),
            }
        })
        .collect()
}

/// Sequence entries of a node. Anything else, most commonly the null value of
/// an empty section, has no entries.
fn sequence(node: &Value) -> &[Value] {
    match node {
        Value::Sequence(entries) => entries,
        _ => &[],
    }
}

fn untag(node: &Value) -> (&Value, bool) {
    match node {
        Value::Tagged(tagged) => (&tagged.value, tagged.tag == "private"),
        other => (other, false),
    }
}

fn scalar_text(node: &Value) -> Option<String> {
    match node {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_member_pairs_and_private_tags() {
        let facts = parse_swift_deps(
            r#"
depends-member:
- ["4main3FooV", "bar"]
- !private ["Si", "init"]
"#,
        )
        .unwrap();
        assert_eq!(
            facts,
            vec![
                Fact::Depends {
                    item: DependencyItem::Member("4main3FooV".into(), "bar".into()),
                    is_cascading: true,
                },
                Fact::Depends {
                    item: DependencyItem::Member("Si".into(), "init".into()),
                    is_cascading: false,
                },
            ]
        );
    }

    #[test]
    fn test_empty_sections_and_interface_hash_are_skipped() {
        let facts = parse_swift_deps(
            r#"
### Swift dependencies file v0 ###
provides-top-level:
provides-dynamic-lookup:
interface-hash: "2f6b7c"
"#,
        )
        .unwrap();
        assert!(facts.is_empty());
    }

    #[test]
    fn test_numeric_names_keep_their_text() {
        let facts = parse_swift_deps("provides-top-level:\n- 42\n").unwrap();
        assert_eq!(
            facts,
            vec![Fact::Provides(DependencyItem::TopLevel("42".into()))]
        );
    }

    #[test]
    fn test_null_name_entry_is_rejected() {
        let err = parse_swift_deps("depends-nominal:\n- ~\n").unwrap_err();
        assert_eq!(
            err,
            SwiftDepsParseError::NameEntryNotString {
                section: "depends-nominal".into()
            }
        );
    }

    #[test]
    fn test_three_element_member_is_rejected() {
        let err = parse_swift_deps("provides-member:\n- [\"A\", \"b\", \"c\"]\n").unwrap_err();
        assert_eq!(
            err,
            SwiftDepsParseError::MemberEntryNotStringPair {
                section: "provides-member".into()
            }
        );
    }

    #[test]
    fn test_private_external_dependency_is_rejected() {
        let err = parse_swift_deps("depends-external:\n- !private \"/sdk/Swift.swiftmodule\"\n")
            .unwrap_err();
        assert_eq!(
            err,
            SwiftDepsParseError::PrivateProvider {
                section: "depends-external".into()
            }
        );
    }

    #[test]
    fn test_non_mapping_root_cannot_be_decoded() {
        assert!(matches!(
            parse_swift_deps("- just\n- a list\n"),
            Err(SwiftDepsParseError::CouldNotDecode(_))
        ));
    }

    #[test]
    fn test_non_string_section_name_is_rejected() {
        assert_eq!(
            parse_swift_deps("12: [\"a\"]\n"),
            Err(SwiftDepsParseError::SectionNameNotString)
        );
    }
}

use crate::authz::errors::AuthzError;
use crate::authz::types::*;
use kdl::{KdlDocument, KdlNode};

/// Parse a KDL seed document into group definitions.
pub fn parse_kdl_document(source: &str) -> Result<Vec<GroupDefinition>, AuthzError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AuthzError::KdlParse(e.to_string()))?;

    let mut groups = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "group" => groups.push(parse_group(node)?),
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(groups)
}

fn parse_group(node: &KdlNode) -> Result<GroupDefinition, AuthzError> {
    let name = first_string_arg(node).ok_or_else(|| {
        AuthzError::InvalidSeed(
            "group node requires a name argument (e.g. group \"CA Operators\" ca=5)".into(),
        )
    })?;

    let ca_id = integer_prop(node, "ca")?.ok_or_else(|| {
        AuthzError::InvalidSeed(format!("group `{name}` missing `ca` property (e.g. ca=5)"))
    })?;

    let mut entities = Vec::new();
    let mut rules = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "entities" => {
                    for item in dash_items(child) {
                        entities.push(parse_entity(item, ca_id, &name)?);
                    }
                }
                "rules" => {
                    for item in dash_items(child) {
                        rules.push(parse_rule(item, &name)?);
                    }
                }
                other => {
                    return Err(AuthzError::InvalidSeed(format!(
                        "unexpected child `{other}` in group `{name}` (expected `entities` or `rules`)"
                    )));
                }
            }
        }
    }

    Ok(GroupDefinition {
        name,
        ca_id,
        entities,
        rules,
    })
}

/// `- "<match_with>" ["<value>"] [compare="<comparator>"] [ca=<id>]`
fn parse_entity(item: &KdlNode, group_ca: CaId, group: &str) -> Result<AdminEntity, AuthzError> {
    let args = string_args(item);
    let Some(match_with) = args.first() else {
        return Err(AuthzError::InvalidSeed(format!(
            "entity in group `{group}` requires a match attribute (e.g. - \"common_name\" \"alice\")"
        )));
    };
    let match_with: MatchWith = match_with
        .parse()
        .map_err(|e: String| AuthzError::InvalidSeed(format!("group `{group}`: {e}")))?;

    if let MatchWith::Special(special) = match_with {
        return Ok(AdminEntity::special(special));
    }

    let value = args.get(1).ok_or_else(|| {
        AuthzError::InvalidSeed(format!(
            "entity `{match_with}` in group `{group}` requires a value"
        ))
    })?;

    let comparator = match item.get("compare").and_then(|v| v.as_string()) {
        Some(c) => c
            .parse()
            .map_err(|e: String| AuthzError::InvalidSeed(format!("group `{group}`: {e}")))?,
        None => Comparator::EqualCaseInsensitive,
    };

    let ca_id = integer_prop(item, "ca")?.unwrap_or(group_ca);

    Ok(AdminEntity::new(match_with, comparator, value, ca_id))
}

/// `- "<resource>" "accept"|"decline" [recursive=#true]`
fn parse_rule(item: &KdlNode, group: &str) -> Result<AccessRule, AuthzError> {
    let args = string_args(item);
    let (Some(resource), Some(effect)) = (args.first(), args.get(1)) else {
        return Err(AuthzError::InvalidSeed(format!(
            "rule in group `{group}` requires a resource and an effect (e.g. - \"/ca\" \"accept\")"
        )));
    };
    let effect: RuleEffect = effect
        .parse()
        .map_err(|e: String| AuthzError::InvalidSeed(format!("group `{group}`: {e}")))?;
    let recursive = item
        .get("recursive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Ok(AccessRule::new(resource, effect, recursive))
}

fn integer_prop(node: &KdlNode, key: &str) -> Result<Option<CaId>, AuthzError> {
    let Some(value) = node.get(key) else {
        return Ok(None);
    };
    value
        .as_integer()
        .and_then(|v| CaId::try_from(v).ok())
        .map(Some)
        .ok_or_else(|| AuthzError::InvalidSeed(format!("`{key}` must be an integer CA id")))
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    string_args(node).first().map(|s| s.to_string())
}

fn string_args(node: &KdlNode) -> Vec<&str> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .collect()
}

/// Children named "-":
/// ```kdl
/// rules {
///     - "/ca_functionality" "accept" recursive=#true
/// }
/// ```
fn dash_items(node: &KdlNode) -> Vec<&KdlNode> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group() {
        let kdl = r#"
group "CA Operators" ca=5 {
    entities {
        - "common_name" "alice"
        - "serial_number" "1A2B" compare="equal_case"
        - "organizational_unit" "Ops" ca=6
        - "batch_command_line"
    }
    rules {
        - "/ca_functionality" "accept" recursive=#true
        - "/ca/sensitive/" "decline"
    }
}
"#;
        let groups = parse_kdl_document(kdl).unwrap();
        assert_eq!(groups.len(), 1);
        let g = &groups[0];
        assert_eq!(g.name, "CA Operators");
        assert_eq!(g.ca_id, 5);
        assert_eq!(
            g.entities,
            vec![
                AdminEntity::new(MatchWith::CommonName, Comparator::EqualCaseInsensitive, "alice", 5),
                AdminEntity::new(MatchWith::SerialNumber, Comparator::EqualCase, "1A2B", 5),
                AdminEntity::new(MatchWith::OrganizationalUnit, Comparator::EqualCaseInsensitive, "Ops", 6),
                AdminEntity::special(SpecialAdmin::BatchCommandLine),
            ]
        );
        assert_eq!(
            g.rules,
            vec![
                AccessRule::accept("/ca_functionality", true),
                AccessRule::decline("/ca/sensitive"),
            ]
        );
    }

    #[test]
    fn test_parse_group_without_children() {
        let groups = parse_kdl_document(r#"group "Empty" ca=1"#).unwrap();
        assert!(groups[0].entities.is_empty());
        assert!(groups[0].rules.is_empty());
    }

    #[test]
    fn test_unknown_top_level_ignored() {
        let kdl = r#"
profile "Server" id=10
group "Auditors" ca=5
"#;
        let groups = parse_kdl_document(kdl).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Auditors");
    }

    #[test]
    fn test_missing_ca() {
        let err = parse_kdl_document(r#"group "NoCa""#).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidSeed(_)));
    }

    #[test]
    fn test_bad_effect() {
        let kdl = r#"
group "G" ca=1 {
    rules {
        - "/ca" "allow"
    }
}
"#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidSeed(_)));
    }

    #[test]
    fn test_entity_needs_value() {
        let kdl = r#"
group "G" ca=1 {
    entities {
        - "common_name"
    }
}
"#;
        assert!(matches!(
            parse_kdl_document(kdl).unwrap_err(),
            AuthzError::InvalidSeed(_)
        ));
    }

    #[test]
    fn test_unexpected_child() {
        let kdl = r#"
group "G" ca=1 {
    members {
        - "alice"
    }
}
"#;
        assert!(matches!(
            parse_kdl_document(kdl).unwrap_err(),
            AuthzError::InvalidSeed(_)
        ));
    }

    #[test]
    fn test_syntax_error() {
        let err = parse_kdl_document("group \"G\" ca=1 {").unwrap_err();
        assert!(matches!(err, AuthzError::KdlParse(_)));
    }
}

use std::collections::HashSet;
use std::path::Path;

use crate::authz::errors::AuthzError;
use crate::authz::policy::parse_kdl_document;
use crate::authz::types::GroupDefinition;

/// Load all `.kdl` seed files from the given directory, in path order.
///
/// A group declared twice for the same CA is rejected.
pub fn load_group_definitions(dir: &Path) -> Result<Vec<GroupDefinition>, AuthzError> {
    if !dir.is_dir() {
        return Err(AuthzError::InvalidSeed(format!(
            "seed directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "kdl")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    let mut definitions = Vec::new();
    let mut seen = HashSet::new();
    let mut file_count = 0;

    for entry in entries {
        let path = entry.path();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| AuthzError::SeedLoadError {
                path: path.display().to_string(),
                source,
            })?;
        for definition in parse_kdl_document(&contents)? {
            if !seen.insert((definition.name.clone(), definition.ca_id)) {
                return Err(AuthzError::InvalidSeed(format!(
                    "group `{}` for CA {} declared more than once (last in `{}`)",
                    definition.name,
                    definition.ca_id,
                    path.display()
                )));
            }
            definitions.push(definition);
        }
        file_count += 1;
    }

    tracing::info!(
        files = file_count,
        groups = definitions.len(),
        rules = definitions.iter().map(|d| d.rules.len()).sum::<usize>(),
        "Loaded admin group seeds"
    );

    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();

        std::fs::write(
            dir.path().join("b_operators.kdl"),
            r#"
group "CA Operators" ca=5 {
    entities {
        - "common_name" "alice"
    }
    rules {
        - "/ca_functionality" "accept" recursive=#true
    }
}
"#,
        )
        .unwrap();

        std::fs::write(
            dir.path().join("a_auditors.kdl"),
            r#"
group "Auditors" ca=5 {
    rules {
        - "/log_functionality" "accept" recursive=#true
    }
}
group "Auditors" ca=6
"#,
        )
        .unwrap();

        // Not a seed file
        std::fs::write(dir.path().join("README.md"), "not a seed").unwrap();

        let defs = load_group_definitions(dir.path()).unwrap();
        let names: Vec<(String, i32)> = defs.iter().map(|d| (d.name.clone(), d.ca_id)).collect();
        assert_eq!(
            names,
            vec![
                ("Auditors".to_string(), 5),
                ("Auditors".to_string(), 6),
                ("CA Operators".to_string(), 5),
            ]
        );
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.kdl"), r#"group "G" ca=1"#).unwrap();
        std::fs::write(dir.path().join("two.kdl"), r#"group "G" ca=1"#).unwrap();
        let err = load_group_definitions(dir.path()).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidSeed(_)));
    }

    #[test]
    fn test_load_nonexistent_directory() {
        let err = load_group_definitions(Path::new("/nonexistent/path")).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidSeed(_)));
    }
}

//! Protobuf `import` references

use regex::Regex;
use std::sync::OnceLock;

use super::dedup_by_display_name;
use crate::schema::SchemaReference;

/// Imports shipped with every registry; never published as artifacts
const WELL_KNOWN_PREFIX: &str = "google/protobuf/";

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?m)^\s*import\s+(?:(?:public|weak)\s+)?"([^"]+)"\s*;"#)
            .expect("import pattern is valid")
    })
}

/// Detect `import "path";` statements
pub fn detect(content: &str) -> Vec<SchemaReference> {
    let references = import_pattern()
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|path| !path.starts_with(WELL_KNOWN_PREFIX))
        .map(|path| SchemaReference::to_artifact(path, artifact_id_for_import(path)))
        .collect();
    dedup_by_display_name(references)
}

/// `common/money.proto` -> `money`
pub fn artifact_id_for_import(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.strip_suffix(".proto").unwrap_or(file).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imports_are_detected() {
        let proto = r#"
syntax = "proto3";
package acme.orders;

import "common/money.proto";
import public "acme/address.proto";
  import weak "legacy.proto";
import "google/protobuf/timestamp.proto";

message Order {
  Money total = 1;
}
"#;
        let refs = detect(proto);
        let ids: Vec<_> = refs.iter().filter_map(|r| r.artifact_id.as_deref()).collect();
        assert_eq!(ids, vec!["money", "address", "legacy"]);
        assert_eq!(refs[0].display_name, "common/money.proto");
    }

    #[test]
    fn test_commented_imports_are_ignored() {
        let proto = "// import \"old.proto\";\nsyntax = \"proto3\";";
        assert!(detect(proto).is_empty());
    }

    #[test]
    fn test_artifact_id_for_import() {
        assert_eq!(artifact_id_for_import("a/b/c.proto"), "c");
        assert_eq!(artifact_id_for_import("plain"), "plain");
    }
}

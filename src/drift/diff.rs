//! Recursive desired/live diff

use super::{ChangeKind, DriftChange};
use crate::path::{render_field, scalars_equal};
use serde_json::Value;

/// Maps whose extra live keys count as drift
const USER_OWNED_MAPS: &[&[&str]] = &[
    &["metadata", "labels"],
    &["metadata", "annotations"],
    &["data"],
    &["stringData"],
    &["binaryData"],
];

/// Diff `live` against `desired`, skipping any path under an `ignore` prefix
///
/// Map key order is irrelevant; list order is significant. When a list
/// element carries a `name` that differs between the two sides, the whole
/// element is reported as modified rather than diffed field by field.
pub fn diff_values(desired: &Value, live: &Value, ignore: &[Vec<String>]) -> Vec<DriftChange> {
    let mut walker = Walker {
        ignore,
        segments: Vec::new(),
        changes: Vec::new(),
    };
    walker.walk(desired, live, "");
    walker.changes
}

struct Walker<'a> {
    ignore: &'a [Vec<String>],
    segments: Vec<String>,
    changes: Vec<DriftChange>,
}

impl Walker<'_> {
    fn walk(&mut self, desired: &Value, live: &Value, rendered: &str) {
        match (desired, live) {
            (Value::Object(d), Value::Object(l)) => {
                for (key, dv) in d {
                    let path = render_field(rendered, key);
                    self.segments.push(key.clone());
                    if !self.is_ignored() {
                        match l.get(key) {
                            Some(lv) => self.walk(dv, lv, &path),
                            None => self.missing(path, dv),
                        }
                    }
                    self.segments.pop();
                }

                if self.is_user_owned() {
                    for (key, lv) in l.iter().filter(|(k, _)| !d.contains_key(*k)) {
                        self.segments.push(key.clone());
                        if !self.is_ignored() {
                            let path = render_field(rendered, key);
                            self.push(path, ChangeKind::Extra, None, Some(lv));
                        }
                        self.segments.pop();
                    }
                }
            }
            (Value::Array(d), Value::Array(l)) => {
                for (i, dv) in d.iter().enumerate() {
                    let path = format!("{}[{}]", rendered, i);
                    self.segments.push(i.to_string());
                    if !self.is_ignored() {
                        match l.get(i) {
                            Some(lv) if identity_changed(dv, lv) => {
                                self.push(path, ChangeKind::Modified, Some(dv), Some(lv))
                            }
                            Some(lv) => self.walk(dv, lv, &path),
                            None => self.missing(path, dv),
                        }
                    }
                    self.segments.pop();
                }
                for (i, lv) in l.iter().enumerate().skip(d.len()) {
                    self.segments.push(i.to_string());
                    if !self.is_ignored() {
                        let path = format!("{}[{}]", rendered, i);
                        self.push(path, ChangeKind::Extra, None, Some(lv));
                    }
                    self.segments.pop();
                }
            }
            _ => {
                if !scalars_equal(desired, live) {
                    let path = rendered.to_string();
                    self.push(path, ChangeKind::Modified, Some(desired), Some(live));
                }
            }
        }
    }

    /// Desired value absent from live; null and empty containers are defaulting noise
    fn missing(&mut self, path: String, desired: &Value) {
        let empty = match desired {
            Value::Null => true,
            Value::Object(o) => o.is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        };
        if !empty {
            self.push(path, ChangeKind::Missing, Some(desired), None);
        }
    }

    fn push(
        &mut self,
        path: String,
        kind: ChangeKind,
        desired: Option<&Value>,
        live: Option<&Value>,
    ) {
        self.changes.push(DriftChange {
            path,
            kind,
            desired: desired.cloned(),
            live: live.cloned(),
        });
    }

    fn is_ignored(&self) -> bool {
        self.ignore
            .iter()
            .any(|prefix| self.segments.starts_with(prefix))
    }

    fn is_user_owned(&self) -> bool {
        USER_OWNED_MAPS.iter().any(|map| {
            map.len() == self.segments.len()
                && map.iter().zip(&self.segments).all(|(a, b)| a == b)
        })
    }
}

fn identity_changed(desired: &Value, live: &Value) -> bool {
    match (
        desired.get("name").and_then(|n| n.as_str()),
        live.get("name").and_then(|n| n.as_str()),
    ) {
        (Some(d), Some(l)) => d != l,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ignore(paths: &[&[&str]]) -> Vec<Vec<String>> {
        paths
            .iter()
            .map(|p| p.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_identical_documents_have_no_changes() {
        let doc = json!({"spec": {"a": [1, 2, {"b": "c"}], "d": null}});
        assert!(diff_values(&doc, &doc, &[]).is_empty());
    }

    #[test]
    fn test_map_order_irrelevant() {
        let desired: Value = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        let live: Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        assert!(diff_values(&desired, &live, &[]).is_empty());
    }

    #[test]
    fn test_reordered_named_list_reports_whole_elements() {
        let desired = json!({"containers": [
            {"name": "a", "image": "x"},
            {"name": "b", "image": "y"}
        ]});
        let live = json!({"containers": [
            {"name": "b", "image": "y"},
            {"name": "a", "image": "x"}
        ]});
        let changes = diff_values(&desired, &live, &[]);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, "containers[0]");
        assert_eq!(changes[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn test_extra_keys_only_in_user_owned_maps() {
        let desired = json!({"metadata": {"labels": {"app": "web"}}, "spec": {"a": 1}});
        let live = json!({
            "metadata": {"labels": {"app": "web", "team": "x"}},
            "spec": {"a": 1, "defaulted": true}
        });
        let changes = diff_values(&desired, &live, &[]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "metadata.labels.team");
        assert_eq!(changes[0].kind, ChangeKind::Extra);
    }

    #[test]
    fn test_missing_and_ignored() {
        let desired = json!({"spec": {"a": 1, "b": 2}, "status": {"x": 1}});
        let live = json!({"spec": {"a": 1}, "status": {"x": 2}});
        let changes = diff_values(&desired, &live, &ignore(&[&["status"]]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "spec.b");
        assert_eq!(changes[0].kind, ChangeKind::Missing);
        assert_eq!(changes[0].live, None);
    }

    #[test]
    fn test_extra_list_elements() {
        let changes = diff_values(&json!({"l": [1]}), &json!({"l": [1, 2]}), &[]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "l[1]");
        assert_eq!(changes[0].kind, ChangeKind::Extra);
    }

    #[test]
    fn test_ignored_extra_list_elements() {
        let changes = diff_values(
            &json!({"l": [1]}),
            &json!({"l": [1, 2, 3]}),
            &ignore(&[&["l", "1"]]),
        );
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "l[2]");

        let all_ignored = diff_values(&json!({"l": [1]}), &json!({"l": [1, 2]}), &ignore(&[&["l"]]));
        assert!(all_ignored.is_empty());
    }
}

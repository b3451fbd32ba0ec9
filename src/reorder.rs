use crate::error::GradeResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Drop event from the grade sheet: the dragged row and the row it was released over.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragEnd {
    pub active_id: String,
    #[serde(default)]
    pub over_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReorderFailurePolicy {
    /// Reload the server order after a failed persist.
    #[default]
    Refetch,
    /// Leave the optimistic order on screen.
    KeepOptimistic,
}

impl ReorderFailurePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "refetch" => Some(Self::Refetch),
            "keepOptimistic" => Some(Self::KeepOptimistic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum ReorderOutcome {
    Unchanged,
    Persisted { order: Vec<String> },
    Failed { order: Vec<String>, error: String },
}

/// Where a class ordering is stored.
pub trait ReorderBackend {
    fn persist_order(&mut self, class_id: &str, ordered_ids: &[String]) -> GradeResult<()>;
    fn fetch_order(&mut self, class_id: &str) -> GradeResult<Vec<String>>;
}

/// Removes the item at `from` and reinserts it at `to`.
pub fn array_move<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut out = items.to_vec();
    if from >= out.len() || to >= out.len() {
        return out;
    }
    let item = out.remove(from);
    out.insert(to, item);
    out
}

/// New visible order for a drop, or `None` when the drop changes nothing.
pub fn plan_reorder(visible: &[String], event: &DragEnd) -> Option<Vec<String>> {
    let over = event.over_id.as_deref()?;
    let from = visible.iter().position(|id| *id == event.active_id)?;
    let to = visible.iter().position(|id| id == over)?;
    if from == to {
        return None;
    }
    Some(array_move(visible, from, to))
}

/// Writes `reordered` into the slots its members occupy in `full`. Ids of
/// `full` not in `reordered` keep their positions.
pub fn merge_into_slots(full: &[String], reordered: &[String]) -> Vec<String> {
    let members: HashSet<&String> = reordered.iter().collect();
    let mut next = reordered.iter();
    full.iter()
        .map(|id| {
            if members.contains(id) {
                next.next().cloned().unwrap_or_else(|| id.clone())
            } else {
                id.clone()
            }
        })
        .collect()
}

/// Holds the locally displayed order of one class and keeps it in step with
/// the backend across drag-and-drop reorders.
#[derive(Debug, Clone)]
pub struct ReorderCoordinator {
    class_id: String,
    order: Vec<String>,
    policy: ReorderFailurePolicy,
}

impl ReorderCoordinator {
    pub fn new(class_id: impl Into<String>, order: Vec<String>, policy: ReorderFailurePolicy) -> Self {
        Self {
            class_id: class_id.into(),
            order,
            policy,
        }
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// `visible` is the filtered and sorted list the drop happened in. The
    /// new order is applied locally before the backend is called.
    pub fn on_drag_end(
        &mut self,
        visible: &[String],
        event: &DragEnd,
        backend: &mut dyn ReorderBackend,
    ) -> ReorderOutcome {
        let Some(new_visible) = plan_reorder(visible, event) else {
            return ReorderOutcome::Unchanged;
        };

        self.order = merge_into_slots(&self.order, &new_visible);

        match backend.persist_order(&self.class_id, &new_visible) {
            Ok(()) => ReorderOutcome::Persisted {
                order: self.order.clone(),
            },
            Err(e) => {
                warn!(class_id = %self.class_id, error = %e, "reorder persist failed");
                if self.policy == ReorderFailurePolicy::Refetch {
                    match backend.fetch_order(&self.class_id) {
                        Ok(server) => self.order = server,
                        Err(fetch_err) => {
                            warn!(class_id = %self.class_id, error = %fetch_err, "reorder refetch failed");
                        }
                    }
                }
                ReorderOutcome::Failed {
                    order: self.order.clone(),
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GradeError;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn drop_on(active: &str, over: &str) -> DragEnd {
        DragEnd {
            active_id: active.to_string(),
            over_id: Some(over.to_string()),
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        fail: bool,
        server: Vec<String>,
        persisted: Vec<(String, Vec<String>)>,
    }

    impl ReorderBackend for RecordingBackend {
        fn persist_order(&mut self, class_id: &str, ordered_ids: &[String]) -> GradeResult<()> {
            if self.fail {
                return Err(GradeError::Validation("network down".into()));
            }
            self.persisted.push((class_id.to_string(), ordered_ids.to_vec()));
            Ok(())
        }

        fn fetch_order(&mut self, _class_id: &str) -> GradeResult<Vec<String>> {
            Ok(self.server.clone())
        }
    }

    #[test]
    fn drag_b_onto_third_slot() {
        let visible = ids(&["A", "B", "C", "D"]);
        assert_eq!(
            plan_reorder(&visible, &drop_on("B", "C")),
            Some(ids(&["A", "C", "B", "D"]))
        );
        assert_eq!(
            plan_reorder(&visible, &drop_on("D", "A")),
            Some(ids(&["D", "A", "B", "C"]))
        );
    }

    #[test]
    fn same_slot_or_unknown_ids_are_no_ops() {
        let visible = ids(&["A", "B", "C"]);
        assert_eq!(plan_reorder(&visible, &drop_on("B", "B")), None);
        assert_eq!(plan_reorder(&visible, &drop_on("Z", "A")), None);
        assert_eq!(plan_reorder(&visible, &drop_on("A", "Z")), None);
        let no_target = DragEnd {
            active_id: "A".into(),
            over_id: None,
        };
        assert_eq!(plan_reorder(&visible, &no_target), None);
    }

    #[test]
    fn subset_reorder_keeps_hidden_rows_in_place() {
        let full = ids(&["A", "x", "B", "y", "C"]);
        let merged = merge_into_slots(&full, &ids(&["C", "A", "B"]));
        assert_eq!(merged, ids(&["C", "x", "A", "y", "B"]));
    }

    #[test]
    fn successful_drop_persists_visible_order() {
        let mut backend = RecordingBackend::default();
        let mut coord = ReorderCoordinator::new(
            "c1",
            ids(&["A", "B", "C", "D"]),
            ReorderFailurePolicy::Refetch,
        );
        let out = coord.on_drag_end(&ids(&["A", "B", "C", "D"]), &drop_on("B", "C"), &mut backend);
        assert_eq!(
            out,
            ReorderOutcome::Persisted {
                order: ids(&["A", "C", "B", "D"])
            }
        );
        assert_eq!(
            backend.persisted,
            vec![("c1".to_string(), ids(&["A", "C", "B", "D"]))]
        );
    }

    #[test]
    fn no_op_drop_never_calls_backend() {
        let mut backend = RecordingBackend::default();
        let mut coord =
            ReorderCoordinator::new("c1", ids(&["A", "B"]), ReorderFailurePolicy::Refetch);
        let out = coord.on_drag_end(&ids(&["A", "B"]), &drop_on("A", "A"), &mut backend);
        assert_eq!(out, ReorderOutcome::Unchanged);
        assert!(backend.persisted.is_empty());
    }

    #[test]
    fn failed_persist_with_refetch_policy_restores_server_order() {
        let mut backend = RecordingBackend {
            fail: true,
            server: ids(&["A", "B", "C"]),
            ..Default::default()
        };
        let mut coord =
            ReorderCoordinator::new("c1", ids(&["A", "B", "C"]), ReorderFailurePolicy::Refetch);
        let out = coord.on_drag_end(&ids(&["A", "B", "C"]), &drop_on("A", "C"), &mut backend);
        match out {
            ReorderOutcome::Failed { order, error } => {
                assert_eq!(order, ids(&["A", "B", "C"]));
                assert!(error.contains("network down"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(coord.order(), ids(&["A", "B", "C"]).as_slice());
    }

    #[test]
    fn failed_persist_with_keep_optimistic_policy_leaves_local_order() {
        let mut backend = RecordingBackend {
            fail: true,
            server: ids(&["A", "B", "C"]),
            ..Default::default()
        };
        let mut coord = ReorderCoordinator::new(
            "c1",
            ids(&["A", "B", "C"]),
            ReorderFailurePolicy::KeepOptimistic,
        );
        let out = coord.on_drag_end(&ids(&["A", "B", "C"]), &drop_on("A", "C"), &mut backend);
        assert!(matches!(out, ReorderOutcome::Failed { .. }));
        assert_eq!(coord.order(), ids(&["B", "C", "A"]).as_slice());
    }
}

//! Batch bookkeeping shared by the multi-row write paths.

use crate::entity::Entity;

/// Multi-row write operation, used in logs and aggregate errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOp {
    InsertAll,
    UpdateAll,
    RemoveAll,
    PublishAll,
    RemoveMatching,
}

impl BatchOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsertAll => "insert_all",
            Self::UpdateAll => "update_all",
            Self::RemoveAll => "remove_all",
            Self::PublishAll => "publish_all",
            Self::RemoveMatching => "remove_matching",
        }
    }
}

/// Result of a committed batch.
///
/// A cancelled batch is still a success: the processed prefix is committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub total: usize,
    pub processed: usize,
    pub affected_rows: u64,
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.processed == self.total
    }
}

/// Reorders items so each table's rows are contiguous.
///
/// Order within a table is preserved; tables appear in first-seen order.
pub(crate) fn group_by_table<'e, T: Entity>(items: Vec<&'e mut T>) -> Vec<&'e mut T> {
    let mut groups: Vec<(String, Vec<&'e mut T>)> = Vec::new();
    for item in items {
        let table = item.identity().table().to_string();
        match groups.iter_mut().find(|(name, _)| *name == table) {
            Some((_, group)) => group.push(item),
            None => groups.push((table, vec![item])),
        }
    }
    groups.into_iter().flat_map(|(_, group)| group).collect()
}

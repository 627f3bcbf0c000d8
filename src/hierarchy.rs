use std::collections::HashMap;

use crate::model::work_item::{IssueKind, WorkItem};

/// Batch-local identifier, the item's position in the parsed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub usize);

#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub id: ItemId,
    pub item: WorkItem,
    /// Owning item, resolved from the model's parent summary.
    pub parent: Option<ItemId>,
}

/// Items grouped by kind in creation order, with parents resolved to ids.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    levels: [Vec<PlannedItem>; 4],
}

impl Hierarchy {
    /// Group `items` by kind (keeping their relative order) and link each
    /// child to the most recent item before it in creation order whose
    /// summary matches its `parent`. Epics never get a parent.
    pub fn build(items: Vec<WorkItem>) -> Self {
        let mut levels: [Vec<PlannedItem>; 4] = Default::default();
        for (index, item) in items.into_iter().enumerate() {
            let slot = item.kind as usize;
            levels[slot].push(PlannedItem {
                id: ItemId(index),
                item,
                parent: None,
            });
        }

        let mut by_summary: HashMap<String, ItemId> = HashMap::new();
        for level in levels.iter_mut() {
            for planned in level.iter_mut() {
                if planned.item.kind != IssueKind::Epic {
                    planned.parent = planned
                        .item
                        .parent_summary
                        .as_deref()
                        .and_then(|summary| by_summary.get(summary).copied());
                }
                by_summary.insert(planned.item.summary.clone(), planned.id);
            }
        }

        Self { levels }
    }

    pub fn level(&self, kind: IssueKind) -> &[PlannedItem] {
        &self.levels[kind as usize]
    }

    /// Levels in creation order: epics, stories, tasks, sub-tasks.
    pub fn levels(&self) -> impl Iterator<Item = (IssueKind, &[PlannedItem])> {
        IssueKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.level(kind)))
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

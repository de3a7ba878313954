use heron_common::datum::OwnedRow;
use heron_common::schema::{TupleAttr, TupleDesc};
use heron_planner::plan::TargetEntry;

use crate::estate::SlotId;

/// Strips administrative ("junk") columns from result rows.
///
/// The raw shape coming off the plan root can carry columns the executor
/// added for its own bookkeeping — row identities for locking, ordering
/// keys. The filter owns the cleaned shape and a scratch slot to project
/// rows into; the caller only ever sees the cleaned shape.
#[derive(Debug)]
pub struct JunkFilter {
    /// Full target list, junk entries included, in raw-tuple order.
    target_list: Vec<TargetEntry>,
    clean_desc: TupleDesc,
    /// For each clean attribute, its 0-based position in the raw tuple.
    clean_map: Vec<usize>,
    /// Scratch slot that filtered rows are materialized into.
    result_slot: SlotId,
}

impl JunkFilter {
    /// Whether a target list needs filtering at all.
    pub fn needed(target_list: &[TargetEntry]) -> bool {
        target_list.iter().any(|te| te.resjunk)
    }

    pub fn new(target_list: &[TargetEntry], result_slot: SlotId) -> Self {
        let mut attrs = Vec::new();
        let mut clean_map = Vec::new();
        for (pos, te) in target_list.iter().enumerate() {
            if te.resjunk {
                continue;
            }
            attrs.push(TupleAttr {
                name: te.name.clone(),
                data_type: te.data_type.clone(),
            });
            clean_map.push(pos);
        }
        Self {
            target_list: target_list.to_vec(),
            clean_desc: TupleDesc::new(attrs),
            clean_map,
            result_slot,
        }
    }

    pub fn clean_tuple_desc(&self) -> &TupleDesc {
        &self.clean_desc
    }

    pub fn result_slot(&self) -> SlotId {
        self.result_slot
    }

    /// Raw-tuple position of a junk attribute by name. Row-locking code
    /// uses this to find its row-identity columns.
    pub fn find_junk_attr(&self, name: &str) -> Option<usize> {
        self.target_list
            .iter()
            .enumerate()
            .find(|(_, te)| te.resjunk && te.name == name)
            .map(|(pos, _)| pos)
    }

    /// Project a raw row into the cleaned shape.
    pub fn filter_row(&self, raw: &OwnedRow) -> OwnedRow {
        OwnedRow::new(
            self.clean_map
                .iter()
                .map(|&pos| raw.values[pos].clone())
                .collect(),
        )
    }
}

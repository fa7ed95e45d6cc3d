use gateway_core::TabletRecord;
use rand::seq::SliceRandom;

/// Partition `tablets` into a same-cell prefix and different-cell suffix,
/// shuffling each partition independently, so every retry tries an
/// unbiased same-cell candidate before any remote-cell one (spec §4.5
/// step 4).
pub fn cell_affinity_shuffle(tablets: &mut Vec<TabletRecord>, caller_cell: &str) {
    let mut rng = rand::rng();
    let (mut same_cell, mut other_cell): (Vec<_>, Vec<_>) = tablets
        .drain(..)
        .partition(|t| t.alias.cell == caller_cell);
    same_cell.shuffle(&mut rng);
    other_cell.shuffle(&mut rng);
    tablets.extend(same_cell);
    tablets.extend(other_cell);
}

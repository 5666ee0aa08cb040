//! Zonal aggregation: one summary record per grid cell.
//!
//! Fragments are grouped by cell id in a single pass. Each group tracks
//! its distinct patch ids, compensated sums of area and perimeter, and the
//! patch ids of its first and last fragment. Cells without fragments get
//! no record.
//!
//! This is step 8 in the pipeline.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hasher;

use siphasher::sip::SipHasher13;

use crate::metrics::CompensatedSum;
use crate::types::{
    CellId, CellSummary, Extent, GridCell, MeasuredFragment, PatchId, PipelineError, StageName,
};

/// Fixed keys so that fingerprints are comparable across runs and hosts.
const FINGERPRINT_KEYS: (u64, u64) = (0x7061_7463_6867_7269, 0x6420_726f_7773_0001);

#[derive(Debug)]
struct Accumulator {
    first: PatchId,
    last: PatchId,
    surface: CompensatedSum,
    perimeter: CompensatedSum,
    patches: HashSet<PatchId>,
}

impl Accumulator {
    fn new(patch_id: PatchId) -> Self {
        Self {
            first: patch_id,
            last: patch_id,
            surface: CompensatedSum::default(),
            perimeter: CompensatedSum::default(),
            patches: HashSet::new(),
        }
    }

    fn add(&mut self, fragment: &MeasuredFragment) {
        self.last = fragment.patch_id;
        self.surface.add(fragment.area);
        self.perimeter.add(fragment.perimeter);
        self.patches.insert(fragment.patch_id);
    }
}

/// Reduce measured fragments to per-cell summaries, ordered by cell id.
///
/// # Errors
///
/// Returns [`PipelineError::Stage`] if a fragment refers to a cell id
/// that is not in `cells`.
pub fn aggregate(
    fragments: &[MeasuredFragment],
    cells: &[GridCell],
) -> Result<Vec<CellSummary>, PipelineError> {
    let mut groups: BTreeMap<CellId, Accumulator> = BTreeMap::new();
    for fragment in fragments {
        groups
            .entry(fragment.cell_id)
            .or_insert_with(|| Accumulator::new(fragment.patch_id))
            .add(fragment);
    }

    let extents: HashMap<CellId, Extent> = cells.iter().map(|c| (c.id, c.extent)).collect();
    let summaries = groups
        .into_iter()
        .map(|(id, acc)| {
            let extent = extents.get(&id).ok_or_else(|| PipelineError::Stage {
                stage: StageName::Aggregate,
                reason: format!("fragment refers to unknown grid cell {id}"),
            })?;
            Ok(CellSummary {
                id,
                left: extent.left,
                top: extent.top,
                right: extent.right,
                bottom: extent.bottom,
                first_patch_id: acc.first,
                last_patch_id: acc.last,
                surface: acc.surface.value(),
                perimeter: acc.perimeter.value(),
                patch_count: u32::try_from(acc.patches.len()).unwrap_or(u32::MAX),
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    tracing::debug!(cells = summaries.len(), "aggregated fragments");
    Ok(summaries)
}

/// Order-sensitive hash of summary rows.
///
/// Equal rows in equal order always produce the same value, so two runs
/// over the same input can be compared without diffing tables.
#[must_use]
pub fn fingerprint(summaries: &[CellSummary]) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(FINGERPRINT_KEYS.0, FINGERPRINT_KEYS.1);
    hasher.write_usize(summaries.len());
    for s in summaries {
        hasher.write_u64(s.id);
        for v in [s.left, s.top, s.right, s.bottom, s.surface, s.perimeter] {
            hasher.write_u64(v.to_bits());
        }
        hasher.write_u32(s.first_patch_id);
        hasher.write_u32(s.last_patch_id);
        hasher.write_u32(s.patch_count);
    }
    hasher.finish()
}

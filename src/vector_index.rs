//! Vector Index (spec.md §4.4).
//!
//! A hand-rolled in-memory L2 flat index wrapped in an id-mapped layer —
//! deliberately minimal per the spec (no ANN structure is warranted at this
//! scale): `Vec<f32>` storage plus a `HashMap<id, slot>` mirrors
//! `faiss.IndexIDMap2(faiss.IndexFlatL2(dim))` from the original tool.
//! Concurrency (mutex, writer-confined-to-commit) is enforced by callers
//! (the Indexer); this type itself is a plain, non-thread-safe structure.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

pub const SENTINEL_ID: i64 = -1;

pub struct VectorIndex {
    dim: usize,
    /// Dense storage; deleted slots are tombstoned (kept as zeros) rather
    /// than compacted, so existing slot indices in `id_to_slot` stay valid.
    vectors: Vec<f32>,
    id_to_slot: HashMap<i64, usize>,
    slot_to_id: Vec<Option<i64>>,
    free_slots: Vec<usize>,
}

impl VectorIndex {
    pub fn new(dim: usize) -> Self {
        VectorIndex { dim, vectors: Vec::new(), id_to_slot: HashMap::new(), slot_to_id: Vec::new(), free_slots: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.id_to_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_slot.is_empty()
    }

    /// Adds vectors keyed by id; pre-existing ids are replaced in place.
    pub fn add(&mut self, ids: &[i64], vectors: &[Vec<f32>]) {
        for (id, vector) in ids.iter().zip(vectors.iter()) {
            debug_assert_eq!(vector.len(), self.dim);
            if let Some(&slot) = self.id_to_slot.get(id) {
                self.vectors[slot * self.dim..(slot + 1) * self.dim].copy_from_slice(vector);
                continue;
            }
            let slot = if let Some(slot) = self.free_slots.pop() {
                self.vectors[slot * self.dim..(slot + 1) * self.dim].copy_from_slice(vector);
                self.slot_to_id[slot] = Some(*id);
                slot
            } else {
                let slot = self.slot_to_id.len();
                self.vectors.extend_from_slice(vector);
                self.slot_to_id.push(Some(*id));
                slot
            };
            self.id_to_slot.insert(*id, slot);
        }
    }

    /// Silently ignores absent ids.
    pub fn remove(&mut self, ids: &[i64]) {
        for id in ids {
            if let Some(slot) = self.id_to_slot.remove(id) {
                self.slot_to_id[slot] = None;
                self.vectors[slot * self.dim..(slot + 1) * self.dim].fill(0.0);
                self.free_slots.push(slot);
            }
        }
    }

    /// Euclidean-distance nearest neighbors. Missing slots (fewer than `k`
    /// live vectors) are padded with the sentinel id and +infinity.
    pub fn search(&self, query: &[f32], k: usize) -> (Vec<f32>, Vec<i64>) {
        let mut scored: Vec<(f32, i64)> = self
            .slot_to_id
            .iter()
            .enumerate()
            .filter_map(|(slot, id)| {
                let id = (*id)?;
                let v = &self.vectors[slot * self.dim..(slot + 1) * self.dim];
                let dist: f32 = v.iter().zip(query.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                Some((dist, id))
            })
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let mut distances: Vec<f32> = scored.iter().map(|(d, _)| *d).collect();
        let mut ids: Vec<i64> = scored.iter().map(|(_, i)| *i).collect();
        while ids.len() < k {
            distances.push(f32::INFINITY);
            ids.push(SENTINEL_ID);
        }
        (distances, ids)
    }

    /// Single-file snapshot: dim, then each live (id, vector) pair.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(&(self.dim as u64).to_le_bytes())?;
        file.write_all(&(self.len() as u64).to_le_bytes())?;
        for (slot, id) in self.slot_to_id.iter().enumerate() {
            let Some(id) = id else { continue };
            file.write_all(&id.to_le_bytes())?;
            let v = &self.vectors[slot * self.dim..(slot + 1) * self.dim];
            for c in v {
                file.write_all(&c.to_le_bytes())?;
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut buf8 = [0u8; 8];
        file.read_exact(&mut buf8)?;
        let dim = u64::from_le_bytes(buf8) as usize;
        file.read_exact(&mut buf8)?;
        let count = u64::from_le_bytes(buf8) as usize;

        let mut index = VectorIndex::new(dim);
        let mut ids = Vec::with_capacity(count);
        let mut vectors = Vec::with_capacity(count);
        for _ in 0..count {
            let mut id_buf = [0u8; 8];
            file.read_exact(&mut id_buf)?;
            let id = i64::from_le_bytes(id_buf);
            let mut vector = vec![0f32; dim];
            for c in vector.iter_mut() {
                let mut cb = [0u8; 4];
                file.read_exact(&mut cb).map_err(Error::from)?;
                *c = f32::from_le_bytes(cb);
            }
            ids.push(id);
            vectors.push(vector);
        }
        index.add(&ids, &vectors);
        Ok(index)
    }

    pub fn load_or_new(path: &Path, dim: usize) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|_| VectorIndex::new(dim))
        } else {
            VectorIndex::new(dim)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_search_remove_round_trip() {
        let mut idx = VectorIndex::new(2);
        idx.add(&[1, 2, 3], &[vec![0.0, 0.0], vec![1.0, 0.0], vec![5.0, 5.0]]);
        assert_eq!(idx.len(), 3);

        let (dist, ids) = idx.search(&[0.0, 0.0], 2);
        assert_eq!(ids, vec![1, 2]);
        assert!(dist[0] <= dist[1]);

        idx.remove(&[1]);
        assert_eq!(idx.len(), 2);
        let (_, ids) = idx.search(&[0.0, 0.0], 1);
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn remove_absent_id_is_noop() {
        let mut idx = VectorIndex::new(2);
        idx.add(&[1], &[vec![0.0, 0.0]]);
        idx.remove(&[999]);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn search_pads_missing_slots_with_sentinel() {
        let mut idx = VectorIndex::new(1);
        idx.add(&[1], &[vec![0.0]]);
        let (dist, ids) = idx.search(&[0.0], 3);
        assert_eq!(ids, vec![1, SENTINEL_ID, SENTINEL_ID]);
        assert_eq!(dist[1], f32::INFINITY);
    }

    #[test]
    fn save_and_load_round_trips_ids_and_vectors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.faiss");
        let mut idx = VectorIndex::new(2);
        idx.add(&[7, 8], &[vec![1.5, -2.5], vec![0.0, 3.25]]);
        idx.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        let (_, ids) = loaded.search(&[1.5, -2.5], 1);
        assert_eq!(ids, vec![7]);
    }

    #[test]
    fn id_reuse_after_delete_then_insert() {
        let mut idx = VectorIndex::new(1);
        idx.add(&[1, 2], &[vec![0.0], vec![1.0]]);
        idx.remove(&[1]);
        idx.add(&[1], &[vec![9.0]]);
        assert_eq!(idx.len(), 2);
        let (_, ids) = idx.search(&[9.0], 1);
        assert_eq!(ids, vec![1]);
    }
}

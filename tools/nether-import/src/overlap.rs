//! Corner-overlap index
//!
//! Groups triangle corners whose positions coincide within a threshold.
//! Used for vertex welding and for the position-only depth index stream.
//!
//! Lifecycle: [`OverlapIndex::add`] any number of times, then
//! [`OverlapIndex::finish_adding`] once, then query. Using it out of order is
//! a contract violation reported as [`OverlapError`] (and a debug assertion).

use glam::Vec3;
use hashbrown::HashSet;
use smallvec::SmallVec;

use crate::error::{ImportError, OverlapError, TopologyError};

/// Buckets above this size switch to a hash set while merging
const SMALL_BUCKET_LIMIT: usize = 12;

const NO_BUCKET: u32 = u32::MAX;

/// A set of mutually overlapping corners
#[derive(Debug, Clone)]
enum Bucket {
    Small(SmallVec<[u32; SMALL_BUCKET_LIMIT]>),
    Large(HashSet<u32>),
}

impl Bucket {
    fn pair(a: u32, b: u32) -> Self {
        let mut members = SmallVec::new();
        members.push(a);
        members.push(b);
        Bucket::Small(members)
    }

    fn len(&self) -> usize {
        match self {
            Bucket::Small(members) => members.len(),
            Bucket::Large(members) => members.len(),
        }
    }

    /// Insert a corner, promoting to a hash set when the array grows too large
    fn insert(&mut self, corner: u32) {
        match self {
            Bucket::Small(members) => {
                if members.contains(&corner) {
                    return;
                }
                members.push(corner);
                if members.len() > SMALL_BUCKET_LIMIT {
                    let set: HashSet<u32> = members.drain(..).collect();
                    *self = Bucket::Large(set);
                }
            }
            Bucket::Large(members) => {
                members.insert(corner);
            }
        }
    }

    fn take_members(&mut self) -> Vec<u32> {
        match std::mem::replace(self, Bucket::Small(SmallVec::new())) {
            Bucket::Small(members) => members.into_vec(),
            Bucket::Large(members) => members.into_iter().collect(),
        }
    }

    /// Collapse to a sorted array
    fn demote(&mut self) {
        let mut members = self.take_members();
        members.sort_unstable();
        *self = Bucket::Small(SmallVec::from_vec(members));
    }

    fn as_slice(&self) -> &[u32] {
        match self {
            Bucket::Small(members) => members.as_slice(),
            // Never observable: demote() runs on every bucket in finish_adding()
            Bucket::Large(_) => &[],
        }
    }
}

/// Corner id -> set of corners at the same position
#[derive(Debug, Clone)]
pub struct OverlapIndex {
    buckets: Vec<Bucket>,
    bucket_of: Vec<u32>,
    finished: bool,
}

impl OverlapIndex {
    /// Empty index over `corner_count` corners
    pub fn new(corner_count: usize) -> Self {
        Self {
            buckets: Vec::new(),
            bucket_of: vec![NO_BUCKET; corner_count],
            finished: false,
        }
    }

    /// Build a finished index for the corners of `indices`
    ///
    /// Corners are sorted along z so each one only tests neighbours inside the
    /// threshold band; those then get the full 3D distance check.
    pub fn build(positions: &[Vec3], indices: &[u32], threshold: f32) -> Result<Self, ImportError> {
        let mut corners: Vec<(u32, Vec3)> = Vec::with_capacity(indices.len());
        for (corner, &index) in indices.iter().enumerate() {
            let position = positions.get(index as usize).copied().ok_or(
                TopologyError::ControlPointOutOfRange {
                    corner,
                    control_point: index,
                    count: positions.len(),
                },
            )?;
            corners.push((corner as u32, position));
        }
        corners.sort_by(|a, b| a.1.z.total_cmp(&b.1.z));

        let threshold_sq = threshold * threshold;
        let mut index = Self::new(indices.len());
        for i in 0..corners.len() {
            let (corner_i, pos_i) = corners[i];
            for &(corner_j, pos_j) in &corners[i + 1..] {
                if (pos_j.z - pos_i.z).abs() > threshold {
                    break;
                }
                if pos_i.distance_squared(pos_j) <= threshold_sq {
                    index.add(corner_i, corner_j)?;
                }
            }
        }
        index.finish_adding();

        tracing::debug!(
            "Overlap index: {} corners, {} shared buckets",
            indices.len(),
            index.bucket_count()
        );
        Ok(index)
    }

    /// Build over an already-expanded position array (corner i at `positions[i]`)
    pub fn build_identity(positions: &[Vec3], threshold: f32) -> Result<Self, ImportError> {
        let indices: Vec<u32> = (0..positions.len() as u32).collect();
        Self::build(positions, &indices, threshold)
    }

    /// Record that two corners overlap, merging their buckets
    pub fn add(&mut self, a: u32, b: u32) -> Result<(), OverlapError> {
        debug_assert!(!self.is_finished(), "overlap index modified after finish_adding()");
        if self.is_finished() {
            return Err(OverlapError::AlreadyFinished);
        }
        debug_assert!(
            (a.max(b) as usize) < self.corner_count(),
            "overlap corner out of range"
        );
        if a == b {
            return Ok(());
        }

        let bucket_a = self.bucket_of[a as usize];
        let bucket_b = self.bucket_of[b as usize];
        match (bucket_a, bucket_b) {
            (NO_BUCKET, NO_BUCKET) => {
                let id = self.buckets.len() as u32;
                self.buckets.push(Bucket::pair(a, b));
                self.bucket_of[a as usize] = id;
                self.bucket_of[b as usize] = id;
            }
            (id, NO_BUCKET) => {
                self.buckets[id as usize].insert(b);
                self.bucket_of[b as usize] = id;
            }
            (NO_BUCKET, id) => {
                self.buckets[id as usize].insert(a);
                self.bucket_of[a as usize] = id;
            }
            (x, y) if x == y => {}
            (x, y) => {
                // Fold the smaller bucket into the larger one
                let (keep, drop) = if self.buckets[x as usize].len() >= self.buckets[y as usize].len()
                {
                    (x, y)
                } else {
                    (y, x)
                };
                let moved = self.buckets[drop as usize].take_members();
                for corner in moved {
                    self.buckets[keep as usize].insert(corner);
                    self.bucket_of[corner as usize] = keep;
                }
            }
        }
        Ok(())
    }

    /// Freeze the index: drop merged-away buckets and sort the rest
    pub fn finish_adding(&mut self) {
        if self.finished {
            return;
        }

        let mut remap = vec![NO_BUCKET; self.buckets.len()];
        let mut kept = Vec::with_capacity(self.buckets.len());
        for (old, mut bucket) in self.buckets.drain(..).enumerate() {
            if bucket.len() == 0 {
                continue;
            }
            bucket.demote();
            remap[old] = kept.len() as u32;
            kept.push(bucket);
        }
        for bucket in &mut self.bucket_of {
            if *bucket != NO_BUCKET {
                *bucket = remap[*bucket as usize];
            }
        }

        self.buckets = kept;
        self.finished = true;
    }

    /// Sorted corners overlapping `corner` (itself included), or empty if it is unique
    pub fn find_overlapping(&self, corner: u32) -> Result<&[u32], OverlapError> {
        debug_assert!(self.is_finished(), "overlap index queried before finish_adding()");
        if !self.is_finished() {
            return Err(OverlapError::NotFinished);
        }
        match self.bucket_of.get(corner as usize) {
            Some(&id) if id != NO_BUCKET => Ok(self.buckets[id as usize].as_slice()),
            _ => Ok(&[]),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn corner_count(&self) -> usize {
        self.bucket_of.len()
    }

    /// Number of non-trivial buckets (corners that share a position)
    pub fn bucket_count(&self) -> usize {
        self.buckets.iter().filter(|b| b.len() > 0).count()
    }
}

//! Index BVH

use crate::common::{classification_matches, SpatialEntry};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lumen_core::base::*;
use lumen_core::geometry::{Bounds3f, Normal3f, Point3f};
use ordered_float::OrderedFloat;
use std::io::{Read, Write};

/// Tag bit marking a node as a leaf; the remaining bits hold the entry index
/// for leaves and the skip offset for interior nodes.
const LEAF_BIT: u32 = 0x8000_0000;

/// One flattened BVH node. The array is laid out in depth-first order so a
/// failed bounding box test jumps straight to the next sibling via the skip
/// offset.
#[derive(Copy, Clone, Debug)]
pub struct IndexBvhNode {
    /// Minimum corner of the node bounds.
    pub bbox_min: [Float; 3],

    /// Maximum corner of the node bounds.
    pub bbox_max: [Float; 3],

    /// Leaf bit plus entry index (leaf) or skip offset (interior).
    pub node_data: u32,
}

impl IndexBvhNode {
    fn contains(&self, p: &Point3f) -> bool {
        p.x >= self.bbox_min[0]
            && p.x <= self.bbox_max[0]
            && p.y >= self.bbox_min[1]
            && p.y <= self.bbox_max[1]
            && p.z >= self.bbox_min[2]
            && p.z <= self.bbox_max[2]
    }
}

/// A static BVH over externally owned entries, built once from the finalized
/// entry array and supporting only nearest-entry and in-radius queries.
pub struct IndexBvh {
    nodes: Vec<IndexBvhNode>,
    entry_radius2: Float,
    normal_cos_angle: Float,
}

impl IndexBvh {
    /// Build the BVH for a finalized entry array.
    ///
    /// * `entries`          - The entry array.
    /// * `entry_radius`     - Lookup radius shared by all entries.
    /// * `normal_angle_deg` - Maximum angle between matching surface normals.
    pub fn new<E: SpatialEntry>(entries: &[E], entry_radius: Float, normal_angle_deg: Float) -> Self {
        let mut nodes = Vec::with_capacity(2 * entries.len());
        if !entries.is_empty() {
            let mut indices: Vec<u32> = (0..entries.len() as u32).collect();
            build_rec(entries, &mut indices, entry_radius, &mut nodes);
        }

        info!("Index BVH built with {} nodes for {} entries", nodes.len(), entries.len());

        Self {
            nodes,
            entry_radius2: entry_radius * entry_radius,
            normal_cos_angle: radians(normal_angle_deg).cos(),
        }
    }

    /// Returns `true` when the BVH indexes no entries.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of flattened nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the index of the nearest stored entry within the lookup
    /// radius matching the query classification, with its squared distance.
    ///
    /// * `entries`   - The entry array.
    /// * `p`         - The query point.
    /// * `n`         - The query normal.
    /// * `is_volume` - The query volume flag.
    pub fn nearest_entry<E: SpatialEntry>(
        &self,
        entries: &[E],
        p: &Point3f,
        n: &Normal3f,
        is_volume: bool,
    ) -> Option<(usize, Float)> {
        let mut best = None;
        let mut best_dist2 = self.entry_radius2;

        let mut current = 0_usize;
        let stop = self.nodes.len();
        while current < stop {
            let node = &self.nodes[current];
            if node.node_data & LEAF_BIT != 0 {
                let entry_index = (node.node_data & !LEAF_BIT) as usize;
                let entry = &entries[entry_index];
                let dist2 = p.distance_squared(&entry.position());
                if dist2 < best_dist2
                    && classification_matches(&entry.normal(), entry.is_volume(), n, is_volume, self.normal_cos_angle)
                {
                    best = Some(entry_index);
                    best_dist2 = dist2;
                }
                current += 1;
            } else if node.contains(p) {
                current += 1;
            } else {
                current = node.node_data as usize;
            }
        }

        best.map(|index| (index, best_dist2))
    }

    /// Visit every stored entry within the lookup radius matching the query
    /// classification.
    ///
    /// * `entries`   - The entry array.
    /// * `p`         - The query point.
    /// * `n`         - The query normal.
    /// * `is_volume` - The query volume flag.
    /// * `visitor`   - Called with each entry index and squared distance.
    pub fn for_each_near<E: SpatialEntry, F: FnMut(usize, Float)>(
        &self,
        entries: &[E],
        p: &Point3f,
        n: &Normal3f,
        is_volume: bool,
        mut visitor: F,
    ) {
        let mut current = 0_usize;
        let stop = self.nodes.len();
        while current < stop {
            let node = &self.nodes[current];
            if node.node_data & LEAF_BIT != 0 {
                let entry_index = (node.node_data & !LEAF_BIT) as usize;
                let entry = &entries[entry_index];
                let dist2 = p.distance_squared(&entry.position());
                if dist2 < self.entry_radius2
                    && classification_matches(&entry.normal(), entry.is_volume(), n, is_volume, self.normal_cos_angle)
                {
                    visitor(entry_index, dist2);
                }
                current += 1;
            } else if node.contains(p) {
                current += 1;
            } else {
                current = node.node_data as usize;
            }
        }
    }

    /// Write the flattened node array and query parameters.
    ///
    /// * `writer` - The destination stream.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.nodes.len() as u32)?;
        writer.write_f32::<LittleEndian>(self.entry_radius2)?;
        writer.write_f32::<LittleEndian>(self.normal_cos_angle)?;
        for node in &self.nodes {
            for v in node.bbox_min.iter().chain(node.bbox_max.iter()) {
                writer.write_f32::<LittleEndian>(*v)?;
            }
            writer.write_u32::<LittleEndian>(node.node_data)?;
        }
        Ok(())
    }

    /// Read back a BVH written by `write_to`.
    ///
    /// * `reader` - The source stream.
    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let node_count = reader.read_u32::<LittleEndian>()? as usize;
        let entry_radius2 = reader.read_f32::<LittleEndian>()?;
        let normal_cos_angle = reader.read_f32::<LittleEndian>()?;

        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let mut bbox_min = [0.0_f32; 3];
            let mut bbox_max = [0.0_f32; 3];
            for v in bbox_min.iter_mut() {
                *v = reader.read_f32::<LittleEndian>()?;
            }
            for v in bbox_max.iter_mut() {
                *v = reader.read_f32::<LittleEndian>()?;
            }
            let node_data = reader.read_u32::<LittleEndian>()?;
            nodes.push(IndexBvhNode { bbox_min, bbox_max, node_data });
        }

        Ok(Self {
            nodes,
            entry_radius2,
            normal_cos_angle,
        })
    }
}

// Emits the subtree over `indices` in depth-first order and returns its
// bounds.
fn build_rec<E: SpatialEntry>(
    entries: &[E],
    indices: &mut [u32],
    entry_radius: Float,
    nodes: &mut Vec<IndexBvhNode>,
) -> Bounds3f {
    if indices.len() == 1 {
        let entry_index = indices[0];
        let bbox = Bounds3f::from_point(entries[entry_index as usize].position()).expand(entry_radius);
        nodes.push(IndexBvhNode {
            bbox_min: [bbox.p_min.x, bbox.p_min.y, bbox.p_min.z],
            bbox_max: [bbox.p_max.x, bbox.p_max.y, bbox.p_max.z],
            node_data: LEAF_BIT | entry_index,
        });
        return bbox;
    }

    // Median split along the widest centroid axis.
    let centroid_bounds = indices
        .iter()
        .fold(Bounds3f::EMPTY, |b, &i| b.union_point(&entries[i as usize].position()));
    let axis = centroid_bounds.maximum_extent();
    indices.sort_by_key(|&i| OrderedFloat(entries[i as usize].position()[axis]));
    let mid = indices.len() / 2;

    let my_offset = nodes.len();
    nodes.push(IndexBvhNode {
        bbox_min: [0.0; 3],
        bbox_max: [0.0; 3],
        node_data: 0,
    });

    let (left, right) = indices.split_at_mut(mid);
    let left_bbox = build_rec(entries, left, entry_radius, nodes);
    let right_bbox = build_rec(entries, right, entry_radius, nodes);

    let bbox = left_bbox.union(&right_bbox);
    nodes[my_offset].bbox_min = [bbox.p_min.x, bbox.p_min.y, bbox.p_min.z];
    nodes[my_offset].bbox_max = [bbox.p_max.x, bbox.p_max.y, bbox.p_max.z];
    nodes[my_offset].node_data = nodes.len() as u32;

    bbox
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::rng::Rng;

    struct TestEntry {
        p: Point3f,
        n: Normal3f,
        is_volume: bool,
    }

    impl SpatialEntry for TestEntry {
        fn position(&self) -> Point3f {
            self.p
        }

        fn normal(&self) -> Normal3f {
            self.n
        }

        fn is_volume(&self) -> bool {
            self.is_volume
        }
    }

    fn entry(x: Float, y: Float, z: Float, is_volume: bool) -> TestEntry {
        TestEntry {
            p: Point3f::new(x, y, z),
            n: Normal3f::new(0.0, 0.0, 1.0),
            is_volume,
        }
    }

    #[test]
    fn nearest_of_exact_position_is_the_entry() {
        let entries = vec![
            entry(0.0, 0.0, 0.0, false),
            entry(1.0, 0.0, 0.0, false),
            entry(0.0, 2.0, 0.0, false),
        ];
        let bvh = IndexBvh::new(&entries, 0.25, 25.0);

        let up = Normal3f::new(0.0, 0.0, 1.0);
        let hit = bvh.nearest_entry(&entries, &Point3f::new(1.0, 0.0, 0.0), &up, false);
        assert_eq!(hit.map(|(i, _)| i), Some(1));
        assert_eq!(hit.map(|(_, d2)| d2), Some(0.0));
    }

    #[test]
    fn classification_mismatch_returns_none() {
        let entries = vec![entry(0.0, 0.0, 0.0, false)];
        let bvh = IndexBvh::new(&entries, 0.25, 25.0);

        let up = Normal3f::new(0.0, 0.0, 1.0);
        assert!(bvh.nearest_entry(&entries, &Point3f::ZERO, &up, true).is_none());
        let tilted = Normal3f::new(1.0, 0.0, 0.0);
        assert!(bvh.nearest_entry(&entries, &Point3f::ZERO, &tilted, false).is_none());
    }

    #[test]
    fn empty_bvh_answers_no_queries() {
        let entries: Vec<TestEntry> = Vec::new();
        let bvh = IndexBvh::new(&entries, 0.25, 25.0);
        assert!(bvh.is_empty());
        let up = Normal3f::new(0.0, 0.0, 1.0);
        assert!(bvh.nearest_entry(&entries, &Point3f::ZERO, &up, false).is_none());
    }

    #[test]
    fn matches_brute_force_on_random_points() {
        let mut rng = Rng::new(17);
        let radius = 0.3_f32;
        let entries: Vec<TestEntry> = (0..128)
            .map(|_| {
                entry(
                    rng.uniform_float() * 4.0 - 2.0,
                    rng.uniform_float() * 4.0 - 2.0,
                    rng.uniform_float() * 4.0 - 2.0,
                    false,
                )
            })
            .collect();
        let bvh = IndexBvh::new(&entries, radius, 25.0);
        let up = Normal3f::new(0.0, 0.0, 1.0);

        for _ in 0..256 {
            let q = Point3f::new(
                rng.uniform_float() * 4.0 - 2.0,
                rng.uniform_float() * 4.0 - 2.0,
                rng.uniform_float() * 4.0 - 2.0,
            );
            let expected = entries
                .iter()
                .enumerate()
                .map(|(i, e)| (i, q.distance_squared(&e.p)))
                .filter(|&(_, d2)| d2 < radius * radius)
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                .map(|(i, _)| i);
            assert_eq!(bvh.nearest_entry(&entries, &q, &up, false).map(|(i, _)| i), expected);
        }
    }

    #[test]
    fn in_radius_visitor_reports_every_neighbor() {
        let entries = vec![
            entry(0.0, 0.0, 0.0, false),
            entry(0.05, 0.0, 0.0, false),
            entry(0.5, 0.0, 0.0, false),
        ];
        let bvh = IndexBvh::new(&entries, 0.1, 25.0);
        let up = Normal3f::new(0.0, 0.0, 1.0);

        let mut seen = Vec::new();
        bvh.for_each_near(&entries, &Point3f::ZERO, &up, false, |i, _| seen.push(i));
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn serialized_bvh_round_trips() {
        let entries = vec![
            entry(0.0, 0.0, 0.0, false),
            entry(1.0, 1.0, 1.0, false),
            entry(-1.0, 0.5, 0.25, false),
        ];
        let bvh = IndexBvh::new(&entries, 0.25, 25.0);

        let mut buffer = Vec::new();
        bvh.write_to(&mut buffer).unwrap();
        let loaded = IndexBvh::read_from(&mut buffer.as_slice()).unwrap();

        assert_eq!(loaded.node_count(), bvh.node_count());
        let up = Normal3f::new(0.0, 0.0, 1.0);
        for e in &entries {
            let a = bvh.nearest_entry(&entries, &e.p, &up, false);
            let b = loaded.nearest_entry(&entries, &e.p, &up, false);
            assert_eq!(a, b);
        }
    }
}

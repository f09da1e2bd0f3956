//! Tessellation adjacency indices

use glam::Vec2;
use hashbrown::HashMap;
use smallvec::SmallVec;

use super::FullVertex;

type PositionKey = [u32; 3];

fn position_key(vertex: &FullVertex) -> PositionKey {
    vertex.position.to_array().map(f32::to_bits)
}

/// A directed edge of some triangle and the vertex opposite it
#[derive(Clone, Copy)]
struct EdgeCandidate {
    from: u32,
    to: u32,
    opposite: u32,
}

fn uv_matches(a: Vec2, b: Vec2) -> bool {
    a.to_array().map(f32::to_bits) == b.to_array().map(f32::to_bits)
}

/// Build the adjacency stream for one section.
///
/// Emits `[v0, v1, v2, n0, n1, n2]` per triangle, where `n_k` is the vertex
/// opposite edge `(v_k, v_k+1)` in the neighbouring triangle. Edges are
/// matched on position only, so neighbours across UV seams and hard edges are
/// still found; when several neighbours exist the one whose UVs match along
/// the edge wins. Boundary edges fall back to the triangle's own opposite
/// vertex.
pub fn build_adjacency(vertices: &[FullVertex], indices: &[u32]) -> Vec<u32> {
    let mut edges: HashMap<(PositionKey, PositionKey), SmallVec<[EdgeCandidate; 2]>> =
        HashMap::with_capacity(indices.len());
    for tri in indices.chunks_exact(3) {
        for k in 0..3 {
            let (from, to, opposite) = (tri[k], tri[(k + 1) % 3], tri[(k + 2) % 3]);
            let key = (
                position_key(&vertices[from as usize]),
                position_key(&vertices[to as usize]),
            );
            edges.entry(key).or_default().push(EdgeCandidate { from, to, opposite });
        }
    }

    let mut output = Vec::with_capacity(indices.len() * 2);
    for tri in indices.chunks_exact(3) {
        output.extend_from_slice(tri);
        for k in 0..3 {
            let (from, to, own_opposite) = (tri[k], tri[(k + 1) % 3], tri[(k + 2) % 3]);
            let (a, b) = (&vertices[from as usize], &vertices[to as usize]);

            // The neighbour walks the shared edge the other way
            let reverse_key = (position_key(b), position_key(a));
            let neighbour = edges.get(&reverse_key).and_then(|candidates| {
                candidates
                    .iter()
                    .find(|c| {
                        uv_matches(vertices[c.to as usize].uvs[0], a.uvs[0])
                            && uv_matches(vertices[c.from as usize].uvs[0], b.uvs[0])
                    })
                    .or_else(|| candidates.first())
                    .copied()
            });

            output.push(neighbour.map_or(own_opposite, |c| c.opposite));
        }
    }
    output
}

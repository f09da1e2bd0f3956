//! Vertex cache optimisation
//!
//! Forsyth-style greedy triangle ordering with a 16-entry cache model, using
//! the score tables from meshoptimizer's vcacheoptimizer.

const CACHE_SIZE: usize = 16;
const VALENCE_SIZE: usize = 8;
const CACHE_SCORES: [f32; CACHE_SIZE + 1] = [
    0.0, 0.779, 0.791, 0.789, 0.981, 0.843, 0.726, 0.847, 0.882, 0.867, 0.799, 0.642, 0.613, 0.600,
    0.568, 0.372, 0.234,
];
const VALENCE_SCORES: [f32; VALENCE_SIZE + 1] =
    [0.0, 0.995, 0.713, 0.450, 0.404, 0.059, 0.005, 0.147, 0.006];

/// Vertex -> triangles lookup, packed into one array
struct TriangleAdjacency {
    counts: Vec<usize>,
    offsets: Vec<usize>,
    data: Vec<usize>,
}

impl TriangleAdjacency {
    fn new(triangles: &[[usize; 3]], vertex_count: usize) -> Self {
        let mut counts = vec![0; vertex_count];
        for triangle in triangles {
            for &vertex in triangle {
                counts[vertex] += 1;
            }
        }

        let mut offsets = vec![0; vertex_count];
        let mut offset = 0;
        for vertex in 0..vertex_count {
            offsets[vertex] = offset;
            offset += counts[vertex];
        }

        let mut data = vec![0; triangles.len() * 3];
        let mut cursor = offsets.clone();
        for (triangle_index, triangle) in triangles.iter().enumerate() {
            for &vertex in triangle {
                data[cursor[vertex]] = triangle_index;
                cursor[vertex] += 1;
            }
        }

        Self {
            counts,
            offsets,
            data,
        }
    }

    fn live(&self, vertex: usize) -> &[usize] {
        let start = self.offsets[vertex];
        &self.data[start..start + self.counts[vertex]]
    }

    /// Drop an emitted triangle from a vertex's live list
    fn remove(&mut self, vertex: usize, triangle: usize) {
        let start = self.offsets[vertex];
        let end = start + self.counts[vertex];
        if let Some(pos) = self.data[start..end].iter().position(|&t| t == triangle) {
            self.data.swap(start + pos, end - 1);
            self.counts[vertex] -= 1;
        }
    }
}

fn valence_score(live_triangles: usize) -> f32 {
    VALENCE_SCORES[live_triangles.min(VALENCE_SIZE)]
}

/// Reorder a triangle list for post-transform cache locality.
///
/// Returns a permutation of the input triangles; each triangle keeps its
/// winding.
pub fn optimize_vertex_cache(indices: &[u32]) -> Vec<u32> {
    let triangles: Vec<[usize; 3]> = indices
        .chunks_exact(3)
        .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
        .collect();
    let triangle_count = triangles.len();
    if triangle_count == 0 {
        return Vec::new();
    }
    let vertex_count = indices.iter().copied().max().map_or(0, |m| m as usize + 1);

    let mut adjacency = TriangleAdjacency::new(&triangles, vertex_count);

    let mut vertex_scores: Vec<f32> = (0..vertex_count)
        .map(|v| valence_score(adjacency.counts[v]))
        .collect();
    let mut triangle_scores: Vec<f32> = triangles
        .iter()
        .map(|t| t.iter().map(|&v| vertex_scores[v]).sum())
        .collect();
    let mut emitted = vec![false; triangle_count];

    let mut output = Vec::with_capacity(triangle_count * 3);
    let mut cache = [0usize; CACHE_SIZE + 3];
    let mut cache_count = 0;
    let mut current = 0;
    let mut input_cursor = 1;

    loop {
        let triangle = triangles[current];
        output.extend(triangle.map(|v| v as u32));
        emitted[current] = true;
        triangle_scores[current] = 0.0;

        // New cache: this triangle's vertices first, then the survivors
        let mut next_cache = [0usize; CACHE_SIZE + 3];
        next_cache[..3].copy_from_slice(&triangle);
        let mut cache_write = 3;
        for &cached in &cache[..cache_count] {
            if !triangle.contains(&cached) {
                next_cache[cache_write] = cached;
                cache_write += 1;
            }
        }
        cache = next_cache;
        cache_count = cache_write.min(CACHE_SIZE);

        for vertex in triangle {
            adjacency.remove(vertex, current);
        }

        // Rescore everything that was in the cache, including evicted entries
        let mut best: Option<usize> = None;
        let mut best_score = 0.0;
        for (position, &vertex) in cache[..cache_write].iter().enumerate() {
            if adjacency.counts[vertex] == 0 {
                continue;
            }
            let cache_position = if position < CACHE_SIZE { position + 1 } else { 0 };
            let score = CACHE_SCORES[cache_position] + valence_score(adjacency.counts[vertex]);
            let delta = score - vertex_scores[vertex];
            vertex_scores[vertex] = score;

            for &neighbour in adjacency.live(vertex) {
                let neighbour_score = triangle_scores[neighbour] + delta;
                if best_score < neighbour_score {
                    best = Some(neighbour);
                    best_score = neighbour_score;
                }
                triangle_scores[neighbour] = neighbour_score;
            }
        }

        if best.is_none() {
            while input_cursor < triangle_count {
                if !emitted[input_cursor] {
                    best = Some(input_cursor);
                    break;
                }
                input_cursor += 1;
            }
        }

        match best {
            Some(next) => current = next,
            None => break,
        }
    }

    output
}

/// Renumber vertices in first-use order across all sections.
///
/// Rewrites `sections` in place and returns the reordered vertex buffer.
/// Vertices no section references are dropped.
pub fn reorder_vertices_by_first_use<V: Copy>(vertices: &[V], sections: &mut [Vec<u32>]) -> Vec<V> {
    let mut new_index = vec![u32::MAX; vertices.len()];
    let mut reordered = Vec::with_capacity(vertices.len());
    for section in sections.iter_mut() {
        for index in section.iter_mut() {
            let old = *index as usize;
            if new_index[old] == u32::MAX {
                new_index[old] = reordered.len() as u32;
                reordered.push(vertices[old]);
            }
            *index = new_index[old];
        }
    }
    reordered
}

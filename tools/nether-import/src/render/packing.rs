//! Vertex stream packing
//!
//! Compact vertices are uploaded as two streams:
//! - position stream: f32x3 per vertex
//! - attribute stream: [`PackedAttributes`] per vertex, followed for skinned
//!   meshes by a separate [`PackedSkin`] stream

use bytemuck::{Pod, Zeroable, cast_slice};
use glam::{Vec2, Vec3, Vec4};
use half::f16;

use super::FullVertex;

// ============================================================================
// Layouts
// ============================================================================

/// Shading attributes of one vertex (20 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PackedAttributes {
    /// Octahedral normal, 2x snorm16
    pub normal: u32,
    /// Octahedral tangent, 2x snorm16; the low bit of the second component is
    /// the bitangent sign (set = negative)
    pub tangent: u32,
    pub uv0: [f16; 2],
    pub uv1: [f16; 2],
    pub color: [u8; 4],
}

/// Skin influences of one vertex (16 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PackedSkin {
    /// Section-local bone indices
    pub bones: [u8; 8],
    /// Unorm8 weights, summing to exactly 255
    pub weights: [u8; 8],
}

pub const PACKED_ATTRIBUTES_STRIDE: usize = std::mem::size_of::<PackedAttributes>();
pub const PACKED_SKIN_STRIDE: usize = std::mem::size_of::<PackedSkin>();

// ============================================================================
// Scalar Conversion
// ============================================================================

/// Maps [-1.0, 1.0] to [-32767, 32767]
#[inline]
pub fn f32_to_snorm16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Maps [0.0, 1.0] to [0, 255]
#[inline]
pub fn f32_to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

#[inline]
pub fn pack_uv_f16(uv: Vec2) -> [f16; 2] {
    [f16::from_f32(uv.x), f16::from_f32(uv.y)]
}

#[inline]
pub fn pack_color_unorm8(color: Vec4) -> [u8; 4] {
    color.to_array().map(f32_to_unorm8)
}

// ============================================================================
// Octahedral Directions
// ============================================================================

/// Encode a direction to octahedral coordinates in [-1, 1]²
#[inline]
pub fn encode_octahedral(dir: Vec3) -> (f32, f32) {
    let dir = dir.normalize_or_zero();

    let l1_norm = dir.x.abs() + dir.y.abs() + dir.z.abs();
    if l1_norm == 0.0 {
        return (0.0, 0.0);
    }

    let mut u = dir.x / l1_norm;
    let mut v = dir.y / l1_norm;

    // Fold the lower hemisphere over the diagonals
    if dir.z < 0.0 {
        let (u_abs, v_abs) = (u.abs(), v.abs());
        u = (1.0 - v_abs) * u.signum();
        v = (1.0 - u_abs) * v.signum();
    }

    (u, v)
}

#[inline]
pub fn decode_octahedral(u: f32, v: f32) -> Vec3 {
    let mut dir = Vec3::new(u, v, 1.0 - u.abs() - v.abs());

    if dir.z < 0.0 {
        let old_x = dir.x;
        dir.x = (1.0 - dir.y.abs()) * old_x.signum();
        dir.y = (1.0 - old_x.abs()) * dir.y.signum();
    }

    dir.normalize_or_zero()
}

#[inline]
pub fn pack_octahedral_u32(dir: Vec3) -> u32 {
    let (u, v) = encode_octahedral(dir);
    (f32_to_snorm16(u) as u16 as u32) | ((f32_to_snorm16(v) as u16 as u32) << 16)
}

#[inline]
pub fn unpack_octahedral_u32(packed: u32) -> Vec3 {
    let u = (packed & 0xFFFF) as i16 as f32 / 32767.0;
    let v = (packed >> 16) as i16 as f32 / 32767.0;
    decode_octahedral(u, v)
}

const TANGENT_SIGN_BIT: u32 = 1 << 16;

/// Octahedral tangent with the bitangent sign folded into bit 16
#[inline]
pub fn pack_tangent_u32(tangent: Vec3, handedness: f32) -> u32 {
    let packed = pack_octahedral_u32(tangent) & !TANGENT_SIGN_BIT;
    if handedness < 0.0 {
        packed | TANGENT_SIGN_BIT
    } else {
        packed
    }
}

/// Returns the tangent and its bitangent sign
#[inline]
pub fn unpack_tangent_u32(packed: u32) -> (Vec3, f32) {
    let sign = if packed & TANGENT_SIGN_BIT != 0 { -1.0 } else { 1.0 };
    (unpack_octahedral_u32(packed & !TANGENT_SIGN_BIT), sign)
}

// ============================================================================
// Bone Weights
// ============================================================================

/// Quantise weights to unorm8 so they sum to exactly 255.
///
/// Rounding error goes to the entries with the largest remainders. Input
/// weights are expected to sum to 1; an all-zero input stays zero.
pub fn quantize_weights(weights: &[f32]) -> [u8; 8] {
    let mut out = [0u8; 8];
    let mut remainders = [(0.0f32, 0usize); 8];
    let mut total = 0u32;
    for (i, &w) in weights.iter().take(8).enumerate() {
        let scaled = w.clamp(0.0, 1.0) * 255.0;
        let floor = scaled.floor();
        out[i] = floor as u8;
        total += out[i] as u32;
        remainders[i] = (scaled - floor, i);
    }
    if total == 0 {
        return out;
    }

    let count = weights.len().min(8);
    remainders[..count].sort_by(|a, b| b.0.total_cmp(&a.0));
    let mut missing = 255u32.saturating_sub(total);
    for &(_, i) in remainders[..count].iter().cycle() {
        if missing == 0 {
            break;
        }
        if out[i] < 255 {
            out[i] += 1;
            missing -= 1;
        }
    }
    out
}

// ============================================================================
// Streams
// ============================================================================

pub fn pack_vertex(vertex: &FullVertex) -> PackedAttributes {
    PackedAttributes {
        normal: pack_octahedral_u32(vertex.normal),
        tangent: pack_tangent_u32(vertex.tangent, vertex.handedness),
        uv0: pack_uv_f16(vertex.uvs[0]),
        uv1: pack_uv_f16(vertex.uvs[1]),
        color: pack_color_unorm8(vertex.color),
    }
}

/// Position stream bytes (f32x3 per vertex)
pub fn pack_positions(positions: impl Iterator<Item = Vec3>) -> Vec<u8> {
    let positions: Vec<Vec3> = positions.collect();
    cast_slice(&positions).to_vec()
}

/// Attribute stream bytes
pub fn pack_attributes(vertices: &[FullVertex]) -> Vec<u8> {
    let packed: Vec<PackedAttributes> = vertices.iter().map(pack_vertex).collect();
    cast_slice(&packed).to_vec()
}

/// Skin stream bytes
pub fn pack_skin(skin: &[PackedSkin]) -> Vec<u8> {
    cast_slice(skin).to_vec()
}

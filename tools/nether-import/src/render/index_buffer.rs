//! 16/32-bit index buffers

/// Largest vertex count addressable with 16-bit indices
pub const MAX_16_BIT_VERTICES: usize = u16::MAX as usize;

/// The single index width rule: 32-bit iff the vertex buffer has more than
/// 65535 vertices.
#[inline]
pub fn use_32_bit_indices(vertex_count: usize) -> bool {
    vertex_count > MAX_16_BIT_VERTICES
}

/// Index data in the narrowest width the vertex buffer allows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    /// Pick the width for `vertex_count` vertices and convert.
    ///
    /// Every index must be below `vertex_count`.
    pub fn from_indices(indices: &[u32], vertex_count: usize) -> Self {
        debug_assert!(indices.iter().all(|&i| (i as usize) < vertex_count));
        if use_32_bit_indices(vertex_count) {
            IndexBuffer::U32(indices.to_vec())
        } else {
            IndexBuffer::U16(indices.iter().map(|&i| i as u16).collect())
        }
    }

    pub fn is_32_bit(&self) -> bool {
        matches!(self, IndexBuffer::U32(_))
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(indices) => indices.len(),
            IndexBuffer::U32(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, position: usize) -> Option<u32> {
        match self {
            IndexBuffer::U16(indices) => indices.get(position).map(|&i| i as u32),
            IndexBuffer::U32(indices) => indices.get(position).copied(),
        }
    }

    /// Widened copy of the indices
    pub fn to_vec(&self) -> Vec<u32> {
        match self {
            IndexBuffer::U16(indices) => indices.iter().map(|&i| i as u32).collect(),
            IndexBuffer::U32(indices) => indices.clone(),
        }
    }

    /// Bytes per index
    pub fn stride(&self) -> usize {
        if self.is_32_bit() { 4 } else { 2 }
    }

    /// Little-endian bytes for upload
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            IndexBuffer::U16(indices) => indices.iter().flat_map(|i| i.to_le_bytes()).collect(),
            IndexBuffer::U32(indices) => indices.iter().flat_map(|i| i.to_le_bytes()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_rule_boundary() {
        assert!(!use_32_bit_indices(0));
        assert!(!use_32_bit_indices(65_535));
        assert!(use_32_bit_indices(65_536));
    }

    #[test]
    fn test_narrow_buffer() {
        let buffer = IndexBuffer::from_indices(&[0, 1, 65_534], 65_535);
        assert!(!buffer.is_32_bit());
        assert_eq!(buffer.stride(), 2);
        assert_eq!(buffer.get(2), Some(65_534));
        assert_eq!(buffer.to_le_bytes(), vec![0, 0, 1, 0, 0xFE, 0xFF]);
    }

    #[test]
    fn test_wide_buffer() {
        let buffer = IndexBuffer::from_indices(&[70_000, 2], 70_001);
        assert!(buffer.is_32_bit());
        assert_eq!(buffer.to_vec(), vec![70_000, 2]);
        assert_eq!(&buffer.to_le_bytes()[..4], &70_000u32.to_le_bytes());
    }
}

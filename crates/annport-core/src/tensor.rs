use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
    I8,
}

impl DType {
    pub fn byte_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::U8 => 1,
            DType::I8 => 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    /// Element count. Scalars hold one element, any zero dimension makes it 0.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
}

/// Shape, element type and quantization of one graph input or output.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorDescriptor {
    pub shape: Shape,
    pub dtype: DType,
    pub quant_scale: f32,
    pub quant_offset: i32,
    pub is_input: bool,
}

impl TensorDescriptor {
    pub fn new(shape: Shape, dtype: DType) -> Self {
        Self {
            shape,
            dtype,
            quant_scale: 0.0,
            quant_offset: 0,
            is_input: false,
        }
    }

    pub fn with_quantization(mut self, scale: f32, offset: i32) -> Self {
        self.quant_scale = scale;
        self.quant_offset = offset;
        self
    }

    /// Copy of this descriptor with the input flag forced on.
    pub fn as_input(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            dtype: self.dtype,
            quant_scale: self.quant_scale,
            quant_offset: self.quant_offset,
            is_input: true,
        }
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn byte_len(&self) -> usize {
        self.numel() * self.dtype.byte_size()
    }
}

/// Up to four 16-bit dimensions packed into one `u64`.
///
/// Dimension `d` lives in bits `[16 * d, 16 * d + 16)`. Unused lanes are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CompactShape(pub u64);

impl CompactShape {
    pub const MAX_RANK: usize = 4;
    pub const MAX_DIM: usize = u16::MAX as usize;

    /// Packs `dims`, dropping everything past the fourth dimension and masking
    /// each dimension to 16 bits.
    pub fn encode(dims: &[usize]) -> Self {
        let packed = dims
            .iter()
            .take(Self::MAX_RANK)
            .enumerate()
            .fold(0u64, |acc, (d, &size)| {
                acc | ((size as u64 & 0xFFFF) << (d * 16))
            });
        Self(packed)
    }

    /// Like [`CompactShape::encode`] but refuses shapes that would not survive.
    pub fn try_encode(dims: &[usize]) -> Option<Self> {
        if Self::fits(dims) {
            Some(Self::encode(dims))
        } else {
            None
        }
    }

    pub fn fits(dims: &[usize]) -> bool {
        dims.len() <= Self::MAX_RANK && dims.iter().all(|&d| d <= Self::MAX_DIM)
    }

    pub fn lanes(self) -> [u16; 4] {
        let mut lanes = [0u16; 4];
        for (d, lane) in lanes.iter_mut().enumerate() {
            *lane = ((self.0 >> (d * 16)) & 0xFFFF) as u16;
        }
        lanes
    }

    /// Decoded dimensions with trailing zero lanes removed.
    pub fn dims(self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(Self::MAX_RANK);
        let mut rest = self.0;
        while rest != 0 {
            dims.push((rest & 0xFFFF) as usize);
            rest >>= 16;
        }
        dims
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

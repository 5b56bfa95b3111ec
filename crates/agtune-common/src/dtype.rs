//! Reduced-precision element types supported by the all-gather GEMM kernel.
//!
//! Host buffers always hold `f32`; a [`DType`] describes which storage
//! format those values are representable in. [`DType::round`] snaps an `f32`
//! onto the format's grid so that host data carries exactly the precision a
//! device buffer of that type would.

use half::{bf16, f16};
use serde::{Deserialize, Serialize};

/// Element type of a tuning configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// Brain floating point (8-bit exponent, 7-bit mantissa).
    BF16,
    /// IEEE half precision (5-bit exponent, 10-bit mantissa).
    F16,
}

impl DType {
    /// All supported element types, in declaration order.
    pub const ALL: [DType; 2] = [DType::BF16, DType::F16];

    /// Short lowercase name (`bf16`, `f16`).
    pub const fn name(self) -> &'static str {
        match self {
            Self::BF16 => "bf16",
            Self::F16 => "f16",
        }
    }

    /// Storage size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        2
    }

    /// Round an `f32` to the nearest value representable in this type.
    #[inline]
    pub fn round(self, value: f32) -> f32 {
        match self {
            Self::BF16 => bf16::from_f32(value).to_f32(),
            Self::F16 => f16::from_f32(value).to_f32(),
        }
    }

    /// Round every element of `values` in place.
    pub fn round_slice(self, values: &mut [f32]) {
        for v in values.iter_mut() {
            *v = self.round(*v);
        }
    }

    /// Machine epsilon of the format.
    pub fn epsilon(self) -> f32 {
        match self {
            Self::BF16 => bf16::EPSILON.to_f32(),
            Self::F16 => f16::EPSILON.to_f32(),
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bf16" | "bfloat16" => Ok(Self::BF16),
            "f16" | "fp16" | "float16" | "half" => Ok(Self::F16),
            other => Err(format!("unknown dtype: {other}")),
        }
    }
}

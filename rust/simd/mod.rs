//! Fixed-width SIMD vectors and the instruction-set tiers they belong to.
//!
//! Kernels and the expression evaluator are written against [`SimdVector`],
//! a register-sized value with loads, stores, broadcasts, fused multiply-add
//! and a horizontal sum. Implementations:
//!
//! | Tier     | `f32`           | `f64`          | Enabled by                     |
//! |----------|-----------------|----------------|--------------------------------|
//! | Serial   | `Packed<f32,1>` | `Packed<f64,1>`| `serial` feature, other arches |
//! | SSE      | `x86::F32x4`    | `x86::F64x2`   | x86-64 baseline                |
//! | AVX      | `x86::F32x8`    | `x86::F64x4`   | `target_feature = "avx"`       |
//! | AVX-512  | `x86::F32x16`   | `x86::F64x8`   | `target_feature = "avx512f"`   |
//! | NEON     | `neon::F32x4`   | `neon::F64x2`  | aarch64 `neon`                 |
//!
//! Tiers are resolved at build time from `cfg(target_feature)`. Build with
//! `RUSTFLAGS="-C target-cpu=native"` to enable everything the host supports.

use core::fmt::Debug;
use core::ops::{Add, Div, Mul, Neg, Sub};

use crate::scalars::Element;

mod portable;
pub use portable::Packed;

#[cfg(target_arch = "x86_64")]
pub mod x86;

#[cfg(target_arch = "aarch64")]
pub mod neon;

/// Upper bound on the lane count of any native vector.
pub const MAX_LANES: usize = 16;

/// A fixed-width vector of `LANES` elements living in registers.
pub trait SimdVector:
    Copy
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    type Scalar: Element;
    const LANES: usize;

    fn splat(value: Self::Scalar) -> Self;

    #[inline(always)]
    fn zero() -> Self {
        Self::splat(Self::Scalar::ZERO)
    }

    /// Loads the first `LANES` elements of `src`. Panics if `src` is shorter.
    fn load(src: &[Self::Scalar]) -> Self;

    /// Like [`SimdVector::load`], for `src` aligned to the vector width.
    #[inline(always)]
    fn load_aligned(src: &[Self::Scalar]) -> Self {
        Self::load(src)
    }

    /// Stores all lanes into the front of `dst`. Panics if `dst` is shorter.
    fn store(self, dst: &mut [Self::Scalar]);

    /// Like [`SimdVector::store`], for `dst` aligned to the vector width.
    #[inline(always)]
    fn store_aligned(self, dst: &mut [Self::Scalar]) {
        self.store(dst)
    }

    /// Loads `src.len() < LANES` elements, zeroing the upper lanes.
    #[inline(always)]
    fn load_partial(src: &[Self::Scalar]) -> Self {
        let mut buffer = [Self::Scalar::ZERO; MAX_LANES];
        buffer[..src.len()].copy_from_slice(src);
        Self::load(&buffer)
    }

    /// Stores the lowest `dst.len()` lanes.
    #[inline(always)]
    fn store_partial(self, dst: &mut [Self::Scalar]) {
        let mut buffer = [Self::Scalar::ZERO; MAX_LANES];
        self.store(&mut buffer);
        let count = dst.len();
        dst.copy_from_slice(&buffer[..count]);
    }

    /// Gathers lane `i` from `f(i)`.
    #[inline(always)]
    fn from_fn(mut f: impl FnMut(usize) -> Self::Scalar) -> Self {
        let mut buffer = [Self::Scalar::ZERO; MAX_LANES];
        for (lane, slot) in buffer[..Self::LANES].iter_mut().enumerate() {
            *slot = f(lane);
        }
        Self::load(&buffer)
    }

    #[inline(always)]
    fn lane(self, index: usize) -> Self::Scalar {
        let mut buffer = [Self::Scalar::ZERO; MAX_LANES];
        self.store(&mut buffer);
        buffer[index]
    }

    /// Computes `self * a + b` lane-wise, fused when the tier supports it.
    fn mul_add(self, a: Self, b: Self) -> Self;

    fn abs(self) -> Self;

    #[cfg(feature = "std")]
    fn sqrt(self) -> Self;

    /// Horizontal sum of all lanes.
    fn reduce_sum(self) -> Self::Scalar;
}

// region: Native Vector Selection

#[cfg(feature = "serial")]
pub type NativeF32 = Packed<f32, 1>;
#[cfg(feature = "serial")]
pub type NativeF64 = Packed<f64, 1>;

#[cfg(all(
    not(feature = "serial"),
    target_arch = "x86_64",
    target_feature = "avx512f"
))]
pub type NativeF32 = x86::F32x16;
#[cfg(all(
    not(feature = "serial"),
    target_arch = "x86_64",
    target_feature = "avx512f"
))]
pub type NativeF64 = x86::F64x8;

#[cfg(all(
    not(feature = "serial"),
    target_arch = "x86_64",
    target_feature = "avx",
    not(target_feature = "avx512f")
))]
pub type NativeF32 = x86::F32x8;
#[cfg(all(
    not(feature = "serial"),
    target_arch = "x86_64",
    target_feature = "avx",
    not(target_feature = "avx512f")
))]
pub type NativeF64 = x86::F64x4;

#[cfg(all(
    not(feature = "serial"),
    target_arch = "x86_64",
    not(target_feature = "avx")
))]
pub type NativeF32 = x86::F32x4;
#[cfg(all(
    not(feature = "serial"),
    target_arch = "x86_64",
    not(target_feature = "avx")
))]
pub type NativeF64 = x86::F64x2;

#[cfg(all(
    not(feature = "serial"),
    target_arch = "aarch64",
    target_feature = "neon"
))]
pub type NativeF32 = neon::F32x4;
#[cfg(all(
    not(feature = "serial"),
    target_arch = "aarch64",
    target_feature = "neon"
))]
pub type NativeF64 = neon::F64x2;

#[cfg(all(
    not(feature = "serial"),
    not(target_arch = "x86_64"),
    not(all(target_arch = "aarch64", target_feature = "neon"))
))]
pub type NativeF32 = Packed<f32, 1>;
#[cfg(all(
    not(feature = "serial"),
    not(target_arch = "x86_64"),
    not(all(target_arch = "aarch64", target_feature = "neon"))
))]
pub type NativeF64 = Packed<f64, 1>;

// endregion: Native Vector Selection

// region: Tiers

/// Compile-time instruction-set tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Baseline scalar code.
    Serial,
    /// 128-bit x86 SSE/SSE2.
    Sse,
    /// 256-bit x86 AVX, optionally with FMA.
    Avx,
    /// 512-bit x86 AVX-512F.
    Avx512,
    /// 128-bit Arm NEON.
    Neon,
}

impl Tier {
    /// Register width in bits.
    pub const fn width_bits(self) -> usize {
        match self {
            Tier::Serial => 0,
            Tier::Sse | Tier::Neon => 128,
            Tier::Avx => 256,
            Tier::Avx512 => 512,
        }
    }
}

/// The tier this build targets.
pub const TIER: Tier = if cfg!(feature = "serial") {
    Tier::Serial
} else if cfg!(all(target_arch = "x86_64", target_feature = "avx512f")) {
    Tier::Avx512
} else if cfg!(all(target_arch = "x86_64", target_feature = "avx")) {
    Tier::Avx
} else if cfg!(target_arch = "x86_64") {
    Tier::Sse
} else if cfg!(all(target_arch = "aarch64", target_feature = "neon")) {
    Tier::Neon
} else {
    Tier::Serial
};

/// Number of `T` lanes in the narrowest native vector holding `n` elements,
/// or in the widest native vector when none is wide enough.
pub const fn best_width<T: Element>(n: usize) -> usize {
    let widest = <T::Simd as SimdVector>::LANES;
    let element_bits = core::mem::size_of::<T>() * 8;
    let mut lanes = if matches!(TIER, Tier::Serial) {
        1
    } else {
        128 / element_bits
    };
    while lanes < n && lanes < widest {
        lanes *= 2;
    }
    if lanes > widest {
        widest
    } else {
        lanes
    }
}

// endregion: Tiers

// region: Capabilities

/// Query the capabilities compiled into this build.
pub mod capabilities {
    use super::{Tier, TIER};

    /// Returns the bitmask of enabled capabilities.
    /// Use with `cap::*` constants to check for specific features.
    ///
    /// # Example
    /// ```
    /// use fixtensor::{cap, capabilities};
    ///
    /// let caps = capabilities::available();
    /// assert!(caps & cap::SERIAL != 0);
    /// ```
    pub const fn available() -> u64 {
        let mut caps = super::cap::SERIAL;
        if cfg!(feature = "serial") {
            return caps;
        }
        if cfg!(target_arch = "x86_64") {
            caps |= super::cap::SSE;
        }
        if cfg!(all(target_arch = "x86_64", target_feature = "avx")) {
            caps |= super::cap::AVX;
        }
        if cfg!(all(target_arch = "x86_64", target_feature = "fma")) {
            caps |= super::cap::FMA;
        }
        if cfg!(all(target_arch = "x86_64", target_feature = "avx512f")) {
            caps |= super::cap::AVX512;
        }
        if cfg!(all(target_arch = "aarch64", target_feature = "neon")) {
            caps |= super::cap::NEON | super::cap::FMA;
        }
        caps
    }

    /// The widest tier enabled in this build.
    pub const fn tier() -> Tier {
        TIER
    }

    /// Returns `true` if accumulations use fused multiply-add.
    pub const fn has_fma() -> bool {
        available() & super::cap::FMA != 0
    }
}

/// Capability bit flags.
pub mod cap {
    pub const SERIAL: u64 = 1 << 0; // Always: Fallback
    pub const SSE: u64 = 1 << 1; // x86-64 baseline
    pub const AVX: u64 = 1 << 2; // 2011: Intel Sandy Bridge
    pub const FMA: u64 = 1 << 3; // 2013: Intel Haswell, any aarch64
    pub const AVX512: u64 = 1 << 4; // 2017: Intel Skylake-X
    pub const NEON: u64 = 1 << 5; // Arm Advanced SIMD
}

// endregion: Capabilities

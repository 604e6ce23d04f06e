//! Scalar types and devices as the engine encodes them.

use libc::c_int;

use crate::error::{Error, Result};

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Uint8,
    Int8,
    Int16,
    Int,
    Int64,
    Half,
    Float,
    Double,
    Bool,
    BFloat16,
}

impl Kind {
    pub(crate) fn c_int(self) -> c_int {
        match self {
            Kind::Uint8 => 0,
            Kind::Int8 => 1,
            Kind::Int16 => 2,
            Kind::Int => 3,
            Kind::Int64 => 4,
            Kind::Half => 5,
            Kind::Float => 6,
            Kind::Double => 7,
            Kind::Bool => 11,
            Kind::BFloat16 => 15,
        }
    }

    pub(crate) fn of_c_int(code: c_int) -> Result<Kind> {
        match code {
            0 => Ok(Kind::Uint8),
            1 => Ok(Kind::Int8),
            2 => Ok(Kind::Int16),
            3 => Ok(Kind::Int),
            4 => Ok(Kind::Int64),
            5 => Ok(Kind::Half),
            6 => Ok(Kind::Float),
            7 => Ok(Kind::Double),
            11 => Ok(Kind::Bool),
            15 => Ok(Kind::BFloat16),
            other => Err(Error::UnknownKind(other)),
        }
    }

    /// Size of one element in bytes.
    pub fn elt_size_in_bytes(self) -> usize {
        match self {
            Kind::Uint8 | Kind::Int8 | Kind::Bool => 1,
            Kind::Int16 | Kind::Half | Kind::BFloat16 => 2,
            Kind::Int | Kind::Float => 4,
            Kind::Int64 | Kind::Double => 8,
        }
    }

    pub fn is_floating_point(self) -> bool {
        matches!(
            self,
            Kind::Half | Kind::Float | Kind::Double | Kind::BFloat16
        )
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Host scalar types that can be marshalled to and from engine buffers.
///
/// Sealed: the engine writes raw element bytes into slices of these types, so
/// only types for which every engine-produced bit pattern is valid implement it.
pub trait Element: sealed::Sealed + Copy + Default + Send + Sync + 'static {
    const KIND: Kind;
}

macro_rules! element {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Element for $ty {
                const KIND: Kind = Kind::$kind;
            }
        )*
    };
}

element! {
    u8 => Uint8,
    i8 => Int8,
    i16 => Int16,
    i32 => Int,
    i64 => Int64,
    half::f16 => Half,
    f32 => Float,
    f64 => Double,
    bool => Bool,
    half::bf16 => BFloat16,
}

/// Where a tensor's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Cuda(usize),
}

impl Device {
    pub(crate) fn c_int(self) -> c_int {
        match self {
            Device::Cpu => -1,
            Device::Cuda(index) => index as c_int,
        }
    }

    pub(crate) fn of_c_int(code: c_int) -> Device {
        if code < 0 {
            Device::Cpu
        } else {
            Device::Cuda(code as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Kind; 10] = [
        Kind::Uint8,
        Kind::Int8,
        Kind::Int16,
        Kind::Int,
        Kind::Int64,
        Kind::Half,
        Kind::Float,
        Kind::Double,
        Kind::Bool,
        Kind::BFloat16,
    ];

    #[test]
    fn codes_are_engine_codes() {
        for kind in ALL {
            assert_eq!(Kind::of_c_int(kind.c_int()).unwrap(), kind);
        }
        assert!(matches!(Kind::of_c_int(9), Err(Error::UnknownKind(9))));
    }

    fn assert_element_size<T: Element>() {
        assert_eq!(T::KIND.elt_size_in_bytes(), std::mem::size_of::<T>());
    }

    #[test]
    fn element_sizes_match_host_types() {
        assert_element_size::<u8>();
        assert_element_size::<i8>();
        assert_element_size::<i16>();
        assert_element_size::<i32>();
        assert_element_size::<i64>();
        assert_element_size::<half::f16>();
        assert_element_size::<f32>();
        assert_element_size::<f64>();
        assert_element_size::<bool>();
        assert_element_size::<half::bf16>();
    }

    #[test]
    fn device_codes() {
        assert_eq!(Device::of_c_int(-1), Device::Cpu);
        assert_eq!(Device::of_c_int(2), Device::Cuda(2));
        assert_eq!(Device::Cuda(1).c_int(), 1);
        assert_eq!(Device::Cpu.c_int(), -1);
    }
}

use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;

/// `HandleIndex` type is arbitrary. Keeping it 32-bits allows for
/// a single 64-bits word per `Handle`.
pub type HandleIndex = u32;

/// `Handle` is made up of two field, `index` and `version`. `index` is the
/// address of a slot inside some pool. This value is recycled when an
/// `Handle` is freed, which means two different handles could share the
/// same index. We solve this by introducing `version`: a live handle always
/// carries an odd version, and every free bumps it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle {
    index: HandleIndex,
    version: HandleIndex,
}

impl Handle {
    /// Constructs a new `Handle`.
    #[inline]
    pub fn new(index: HandleIndex, version: HandleIndex) -> Self {
        Handle { index, version }
    }

    /// Constructs a nil/uninitialized `Handle`.
    #[inline]
    pub fn nil() -> Self {
        Handle {
            index: 0,
            version: 0,
        }
    }

    /// Returns true if this `Handle` has been initialized.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.version > 0
    }

    /// Invalidate this `Handle` to default value.
    #[inline]
    pub fn invalidate(&mut self) {
        self.index = 0;
        self.version = 0;
    }

    /// Returns index value.
    #[inline]
    pub fn index(self) -> HandleIndex {
        self.index
    }

    /// Returns version value.
    #[inline]
    pub fn version(self) -> HandleIndex {
        self.version
    }

    /// Packs this handle into a single integer. Since every issued handle has
    /// a non-zero version, zero is reserved for "no handle".
    #[inline]
    pub fn to_raw(self) -> u64 {
        (u64::from(self.version) << 32) | u64::from(self.index)
    }

    /// Unpacks a handle produced by `to_raw`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Handle {
            index: raw as HandleIndex,
            version: (raw >> 32) as HandleIndex,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle ({}, {})", self.index, self.version)
    }
}

pub trait HandleLike: Debug + Copy + Hash + PartialEq + Eq + Send + Sync {
    fn new(index: HandleIndex, version: HandleIndex) -> Self;
    fn index(&self) -> HandleIndex;
    fn version(&self) -> HandleIndex;
}

impl HandleLike for Handle {
    #[inline]
    fn new(index: HandleIndex, version: HandleIndex) -> Self {
        Handle { index, version }
    }

    #[inline]
    fn index(&self) -> HandleIndex {
        self.index
    }

    #[inline]
    fn version(&self) -> HandleIndex {
        self.version
    }
}

/// Declares a strongly typed wrapper around `Handle`.
#[macro_export]
macro_rules! impl_handle {
    ($name:ident) => {
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::utils::handle::Handle);

        impl $name {
            /// Constructs a nil handle which never refers to anything.
            #[inline]
            pub fn nil() -> Self {
                $name($crate::utils::handle::Handle::nil())
            }

            /// Returns true if this handle has been initialized.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0.is_valid()
            }

            /// Packs this handle into a non-zero integer.
            #[inline]
            pub fn to_raw(self) -> u64 {
                self.0.to_raw()
            }

            /// Unpacks a handle from an integer produced by `to_raw`.
            #[inline]
            pub fn from_raw(raw: u64) -> Self {
                $name($crate::utils::handle::Handle::from_raw(raw))
            }
        }

        impl From<$name> for $crate::utils::handle::Handle {
            fn from(handle: $name) -> Self {
                handle.0
            }
        }

        impl From<$crate::utils::handle::Handle> for $name {
            fn from(handle: $crate::utils::handle::Handle) -> Self {
                $name(handle)
            }
        }

        impl $crate::utils::handle::HandleLike for $name {
            #[inline]
            fn new(
                index: $crate::utils::handle::HandleIndex,
                version: $crate::utils::handle::HandleIndex,
            ) -> Self {
                $name($crate::utils::handle::Handle::new(index, version))
            }

            #[inline]
            fn index(&self) -> $crate::utils::handle::HandleIndex {
                self.0.index()
            }

            #[inline]
            fn version(&self) -> $crate::utils::handle::HandleIndex {
                self.0.version()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(
                    f,
                    "{} ({}, {})",
                    stringify!($name),
                    self.0.index(),
                    self.0.version()
                )
            }
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn basic() {
        let mut h2 = Handle::new(2, 5);
        assert_eq!(h2.index(), 2);
        assert_eq!(h2.version(), 5);
        assert!(h2.is_valid());

        h2.invalidate();
        assert_eq!(h2.index(), 0);
        assert_eq!(h2.version(), 0);
        assert!(!h2.is_valid());
    }

    #[test]
    fn raw() {
        let h = Handle::new(0, 1);
        assert_ne!(h.to_raw(), 0);
        assert_eq!(Handle::from_raw(h.to_raw()), h);
        assert_eq!(Handle::nil().to_raw(), 0);
        assert!(!Handle::from_raw(0).is_valid());

        let h = Handle::new(0xFFFF_FFFF, 7);
        assert_eq!(Handle::from_raw(h.to_raw()), h);
    }

    impl_handle!(TypeSafeHandle);

    #[test]
    fn type_safe_handle() {
        let h1 = TypeSafeHandle::default();
        assert_eq!(h1, TypeSafeHandle::from(Handle::default()));
        assert!(!h1.is_valid());

        let h2: TypeSafeHandle = HandleLike::new(3, 1);
        assert_eq!(Handle::from(h2), Handle::new(3, 1));
        assert_eq!(format!("{}", h2), "TypeSafeHandle (3, 1)");
    }
}

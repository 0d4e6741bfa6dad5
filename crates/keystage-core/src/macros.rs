//! Internal macros.

/// Declare a typed arena handle.
///
/// ```ignore
/// define_handle! {
///     /// A registered port.
///     PortId
/// }
/// ```
macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name($crate::arena::RawHandle);

        impl $name {
            /// A handle that never resolves.
            #[allow(dead_code)]
            pub(crate) const fn placeholder() -> Self {
                Self($crate::arena::RawHandle::PLACEHOLDER)
            }
        }

        impl $crate::arena::ArenaHandle for $name {
            #[inline]
            fn from_raw(raw: $crate::arena::RawHandle) -> Self {
                Self(raw)
            }

            #[inline]
            fn raw(self) -> $crate::arena::RawHandle {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

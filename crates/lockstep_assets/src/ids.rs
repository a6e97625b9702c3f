//! Identifiers handed out by the renderer and the loader.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Sentinel for "no resource".
            pub const INVALID: Self = Self(u32::MAX);

            /// Returns false for the [`Self::INVALID`] sentinel.
            #[inline]
            #[must_use]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}#{}", stringify!($name), self.0)
                } else {
                    write!(f, "{}#invalid", stringify!($name))
                }
            }
        }
    };
}

resource_id!(
    /// GPU-side model (vertex + index buffers and per-mesh materials).
    ModelId
);
resource_id!(
    /// GPU-side texture.
    TextureId
);
resource_id!(
    /// Material a texture is bound to.
    MaterialId
);

/// Opaque handle to the game object that requested a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Owner#{}", self.0)
    }
}

static NEXT_LOAD_TASK: AtomicU64 = AtomicU64::new(1);

/// Caller-scoped batch of texture loads ("all textures of material set X").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTaskId(u64);

impl LoadTaskId {
    /// Returns a new, globally unique id. Ids increase monotonically.
    #[must_use]
    pub fn generate() -> Self {
        Self(NEXT_LOAD_TASK.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoadTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoadTask#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_monotonic() {
        let a = LoadTaskId::generate();
        let b = LoadTaskId::generate();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_sentinel() {
        assert!(!ModelId::INVALID.is_valid());
        assert!(TextureId(0).is_valid());
        assert_eq!(MaterialId::default(), MaterialId::INVALID);
        assert_eq!(TextureId::INVALID.to_string(), "TextureId#invalid");
    }
}

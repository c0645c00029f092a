//! Per-engine registry: what an engine caches from its runtime.

use std::path::PathBuf;

use serde::Serialize;

use crate::boot::BootImage;
use crate::governor::AllocationGovernor;
use crate::rstr::{PendingString, RosieString};
use crate::runtime::{JsonEncoder, PatternRuntime};
use crate::violation::ViolationFormatter;

/// Identity of the booted runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootModule {
    pub name: String,
    pub version: String,
    pub rpl_version: String,
    pub home: PathBuf,
    pub libdir: PathBuf,
}

pub struct Registry {
    pub root: RootModule,
    pub json_encoder: JsonEncoder,
    pub violation_formatter: ViolationFormatter,
    pub governor: AllocationGovernor,
    /// Most recent match result in engine-cached mode.
    pending: Option<PendingString>,
}

impl Registry {
    pub fn populate(image: &BootImage, runtime: &dyn PatternRuntime) -> Self {
        Self {
            root: RootModule {
                name: "rosie".to_string(),
                version: image.manifest.rosie_version.clone(),
                rpl_version: image.manifest.rpl_version.clone(),
                home: image.home.clone(),
                libdir: image.libdir.clone(),
            },
            json_encoder: runtime.json_encoder(),
            violation_formatter: runtime.violation_formatter(),
            governor: AllocationGovernor::new(),
            pending: None,
        }
    }

    /// Cache `pending`, freeing the previous entry, and return a view of
    /// the new one that stays valid until the next call to `stash`.
    pub fn stash(&mut self, pending: PendingString) -> RosieString {
        let alias = pending.alias();
        self.pending = Some(pending);
        alias
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::BootManifest;
    use crate::runtime::{RplRuntime, RuntimeFactory};

    fn image() -> BootImage {
        BootImage {
            home: PathBuf::from("/opt/rosie"),
            libdir: PathBuf::from("/opt/rosie/lib"),
            libpath: Vec::new(),
            manifest: BootManifest {
                rosie_version: "1.3.0".to_string(),
                rpl_version: "1.1".to_string(),
                libpath: Vec::new(),
                prelude: String::new(),
            },
        }
    }

    #[test]
    fn test_populate() {
        let image = image();
        let runtime = RplRuntime::boot(&image).unwrap();
        let registry = Registry::populate(&image, runtime.as_ref());
        assert_eq!(registry.root.version, "1.3.0");
        assert_eq!(registry.root.libdir, PathBuf::from("/opt/rosie/lib"));
        assert_eq!(registry.governor.limit_mb(), 0);
        assert!(!registry.has_pending());
    }

    #[test]
    fn test_stash_replaces_previous() {
        let image = image();
        let runtime = RplRuntime::boot(&image).unwrap();
        let mut registry = Registry::populate(&image, runtime.as_ref());
        let first = registry.stash(PendingString::new(b"first".to_vec()).unwrap());
        assert_eq!(unsafe { first.as_bytes() }, Some(&b"first"[..]));
        let second = registry.stash(PendingString::new(b"second".to_vec()).unwrap());
        assert_eq!(unsafe { second.as_bytes() }, Some(&b"second"[..]));
        registry.clear_pending();
        assert!(!registry.has_pending());
    }
}

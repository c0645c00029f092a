//! Boot loader.
//!
//! The install home is resolved once per process: from the `ROSIE_HOME`
//! environment variable if set, else from the location compiled into the
//! library. A home starting with `//` is relative to the directory that
//! contains the library binary itself, found by asking the OS which
//! mapped file holds this code. Reading the boot manifest and booting a
//! runtime from it is serialized by a process-wide lock.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RosieError};

/// Home directory baked in at build time.
pub const COMPILED_HOME: &str = match option_env!("ROSIE_HOME") {
    Some(home) => home,
    None => "//rosie",
};

/// Prefix marking a home relative to the library's own directory.
pub const RELATIVE_MARKER: &str = "//";

/// Boot manifest, relative to the home directory.
pub const BOOT_MANIFEST: &str = "lib/boot.yaml";

static PROCESS_HOME: OnceLock<std::result::Result<PathBuf, String>> = OnceLock::new();
static BOOT_LOCK: Mutex<()> = Mutex::new(());

/// Contents of `lib/boot.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootManifest {
    pub rosie_version: String,
    pub rpl_version: String,
    /// Package directories, relative to the home unless absolute.
    #[serde(default)]
    pub libpath: Vec<String>,
    /// RPL source loaded into every engine.
    #[serde(default)]
    pub prelude: String,
}

/// Everything a runtime needs to boot.
#[derive(Debug, Clone)]
pub struct BootImage {
    pub home: PathBuf,
    pub libdir: PathBuf,
    pub libpath: Vec<PathBuf>,
    pub manifest: BootManifest,
}

/// The process-wide home, resolved on first use.
pub fn process_home() -> Result<PathBuf> {
    PROCESS_HOME
        .get_or_init(resolve_home)
        .clone()
        .map_err(RosieError::Boot)
}

fn resolve_home() -> std::result::Result<PathBuf, String> {
    let declared = match env::var("ROSIE_HOME") {
        Ok(home) if !home.is_empty() => home,
        _ => COMPILED_HOME.to_string(),
    };
    let home = resolve_declared(&declared)?;
    debug!(home = %home.display(), declared = %declared, "resolved install home");
    Ok(home)
}

fn resolve_declared(declared: &str) -> std::result::Result<PathBuf, String> {
    match declared.strip_prefix(RELATIVE_MARKER) {
        Some(relative) => Ok(library_dir()?.join(relative)),
        None => Ok(PathBuf::from(declared)),
    }
}

/// Directory of the binary that contains this library.
pub fn library_dir() -> std::result::Result<PathBuf, String> {
    let path = library_path()?;
    path.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| format!("library path {} has no parent directory", path.display()))
}

#[cfg(target_os = "linux")]
fn library_path() -> std::result::Result<PathBuf, String> {
    let address = library_path as usize;
    let maps = fs::read_to_string("/proc/self/maps")
        .map_err(|e| format!("cannot read /proc/self/maps: {e}"))?;
    for line in maps.lines() {
        let mut fields = line.split_whitespace();
        let (Some(range), Some(_perms), Some(_offset), Some(_dev), Some(_inode)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            continue;
        };
        let Some((lo, hi)) = range.split_once('-') else {
            continue;
        };
        let (Ok(lo), Ok(hi)) = (usize::from_str_radix(lo, 16), usize::from_str_radix(hi, 16)) else {
            continue;
        };
        if (lo..hi).contains(&address) {
            let file: String = fields.collect::<Vec<_>>().join(" ");
            if file.starts_with('/') {
                return Ok(PathBuf::from(file));
            }
        }
    }
    executable_path()
}

#[cfg(not(target_os = "linux"))]
fn library_path() -> std::result::Result<PathBuf, String> {
    executable_path()
}

fn executable_path() -> std::result::Result<PathBuf, String> {
    env::current_exe().map_err(|e| format!("cannot locate the library binary: {e}"))
}

/// Read and parse the boot manifest under `home`.
///
/// Engine construction calls this, and boots the runtime from the image,
/// inside [`with_boot_lock`].
pub fn load_image(home: &Path) -> Result<BootImage> {
    let manifest_path = home.join(BOOT_MANIFEST);
    let text = fs::read_to_string(&manifest_path).map_err(|e| {
        RosieError::Boot(format!(
            "cannot read boot program {}: {e}",
            manifest_path.display()
        ))
    })?;
    let manifest: BootManifest = serde_yaml::from_str(&text).map_err(|e| {
        RosieError::Boot(format!(
            "corrupt boot program {}: {e}",
            manifest_path.display()
        ))
    })?;
    let libpath = manifest
        .libpath
        .iter()
        .map(|entry| {
            let entry = Path::new(entry);
            if entry.is_absolute() {
                entry.to_path_buf()
            } else {
                home.join(entry)
            }
        })
        .collect();
    debug!(manifest = %manifest_path.display(), version = %manifest.rosie_version, "boot program read");
    Ok(BootImage {
        home: home.to_path_buf(),
        libdir: home.join("lib"),
        libpath,
        manifest,
    })
}

/// Run `f` while holding the process-wide boot lock.
pub fn with_boot_lock<T>(f: impl FnOnce() -> T) -> T {
    // The lock guards no data; poisoning is ignored.
    let _guard = BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(dir: &Path, text: &str) {
        fs::create_dir_all(dir.join("lib")).unwrap();
        let mut file = fs::File::create(dir.join(BOOT_MANIFEST)).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_image() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "rosie_version: \"1.3.0\"\nrpl_version: \"1.1\"\nlibpath: [rpl, /abs/rpl]\nprelude: |\n  alias d = [:digit:]\n",
        );
        let image = load_image(dir.path()).unwrap();
        assert_eq!(image.manifest.rosie_version, "1.3.0");
        assert_eq!(image.libdir, dir.path().join("lib"));
        assert_eq!(image.libpath[0], dir.path().join("rpl"));
        assert_eq!(image.libpath[1], PathBuf::from("/abs/rpl"));
        assert!(image.manifest.prelude.contains("alias d"));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_image(dir.path()).unwrap_err();
        assert!(matches!(err, RosieError::Boot(ref msg) if msg.contains("cannot read boot program")));
    }

    #[test]
    fn test_corrupt_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "rosie_version: [unterminated\n");
        let err = load_image(dir.path()).unwrap_err();
        assert!(matches!(err, RosieError::Boot(ref msg) if msg.contains("corrupt boot program")));
    }

    #[test]
    fn test_relative_home_uses_library_dir() {
        let resolved = resolve_declared("//share/rosie").unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("share/rosie"));
        assert_eq!(resolve_declared("/opt/rosie").unwrap(), PathBuf::from("/opt/rosie"));
    }

    #[test]
    fn test_library_dir_exists() {
        let dir = library_dir().unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_boot_lock_returns_value() {
        assert_eq!(with_boot_lock(|| 7), 7);
    }
}

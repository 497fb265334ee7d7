//! Small filesystem helpers shared by the persistence and share-file code.

use anyhow::{bail, Error};
use nix::sys::stat;
use nix::unistd;
use std::fs::File;
use std::io::Write;
use std::os::unix::io::FromRawFd;
use std::path::Path;

/// Write `data` to `path` atomically: write to a `mkstemp`-generated
/// sibling file, then rename over the destination. Works across threads
/// and processes racing to update the same file, unlike write-then-rename
/// without the temp file.
pub fn atomic_write<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<(), Error> {
    let path = path.as_ref();

    let mut template = path.to_owned();
    template.set_extension("tmp_XXXXXX");
    let (fd, tmp_path) = match unistd::mkstemp(&template) {
        Ok((fd, path)) => (fd, path),
        Err(err) => bail!("mkstemp {:?} failed: {}", template, err),
    };
    let tmp_path = tmp_path.as_path();

    let mode =
        stat::Mode::S_IRUSR | stat::Mode::S_IWUSR | stat::Mode::S_IRGRP | stat::Mode::S_IROTH;
    if let Err(err) = stat::fchmod(fd, mode) {
        let _ = unistd::unlink(tmp_path);
        bail!("fchmod {:?} failed: {}", tmp_path, err);
    }

    let mut file = unsafe { File::from_raw_fd(fd) };
    if let Err(err) = file.write_all(data) {
        let _ = unistd::unlink(tmp_path);
        bail!("write failed: {}", err);
    }

    if let Err(err) = std::fs::rename(tmp_path, path) {
        let _ = unistd::unlink(tmp_path);
        bail!("atomic rename failed for file {:?} - {}", path, err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        atomic_write(&path, b"{\"ok\":true}").unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(data, b"{\"ok\":true}");
    }

    #[test]
    fn atomic_write_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(data, b"second");
    }
}

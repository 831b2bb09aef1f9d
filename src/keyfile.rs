// Appending the engine's public key to an authorized_keys style file.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;

/// Append `key` to `path`, creating the file (mode 0600 on Unix) and its
/// parent directory if needed. The key always ends up on its own line.
pub fn append_key(path: &Path, key: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut options = OpenOptions::new();
    options.create(true).read(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    let mut line = String::new();
    if !ends_with_newline(&mut file)? {
        line.push('\n');
    }
    line.push_str(key.trim_end_matches(['\r', '\n']));
    line.push('\n');
    file.write_all(line.as_bytes())?;
    Ok(())
}

// An empty file counts as ending in a newline.
fn ends_with_newline(file: &mut fs::File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ssh").join("authorized_keys");
        append_key(&path, "ssh-rsa AAAA engine").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "ssh-rsa AAAA engine\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn appends_without_clobbering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authorized_keys");
        fs::write(&path, "ssh-ed25519 BBBB existing\n").unwrap();
        append_key(&path, "ssh-rsa AAAA engine\n").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "ssh-ed25519 BBBB existing\nssh-rsa AAAA engine\n"
        );
    }

    #[test]
    fn starts_new_line_when_file_lacks_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authorized_keys");
        fs::write(&path, "ssh-ed25519 BBBB existing").unwrap();
        append_key(&path, "ssh-rsa AAAA engine").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "ssh-ed25519 BBBB existing\nssh-rsa AAAA engine\n"
        );
    }
}

//! Streaming SHA-256 file fingerprints.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes read per block; memory use is bounded by this regardless of file size.
const BLOCK_SIZE: usize = 8192;

/// Lowercase hex SHA-256 of the file's full contents.
///
/// # Errors
///
/// Fails if the file cannot be opened or a read fails partway through.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    fingerprint_reader(&mut file)
}

/// Lowercase hex SHA-256 of everything `reader` yields.
pub fn fingerprint_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut block = [0u8; BLOCK_SIZE];
    loop {
        let n = match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&block[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_identical_bytes_identical_fingerprint() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        fs::write(&a, "hello world").unwrap();
        fs::write(&b, "hello world").unwrap();
        assert_eq!(fingerprint_file(&a).unwrap(), fingerprint_file(&b).unwrap());
    }

    #[test]
    fn test_one_byte_changes_fingerprint() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        fs::write(&a, "hello world").unwrap();
        let before = fingerprint_file(&a).unwrap();
        fs::write(&a, "hello worle").unwrap();
        assert_ne!(before, fingerprint_file(&a).unwrap());
    }

    #[test]
    fn test_known_digest_across_block_boundary() {
        let data = vec![b'x'; BLOCK_SIZE * 3 + 17];
        let streamed = fingerprint_reader(&mut data.as_slice()).unwrap();
        assert_eq!(streamed, hex::encode(Sha256::digest(&data)));
        assert_eq!(
            fingerprint_reader(&mut &b""[..]).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = fingerprint_file(&tmp.path().join("missing.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}

use super::Algorithm;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub const READ_CHUNK_SIZE: usize = 64 * 1024; // 64KiB

/// In-process SHA family digests, streamed in fixed-size chunks.
#[derive(Debug, Clone, Copy)]
pub struct NativeDigest {
    algorithm: Algorithm,
}

impl NativeDigest {
    /// Blake2b is only computed through [`super::DelegatedDigest`].
    pub fn new(algorithm: Algorithm) -> Self {
        debug_assert!(algorithm != Algorithm::Blake2b);
        Self { algorithm }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn compute(&self, path: &Path) -> io::Result<String> {
        let file = File::open(path)?;
        match self.algorithm {
            Algorithm::Sha1 => stream_digest::<Sha1, _>(file),
            Algorithm::Sha256 => stream_digest::<Sha256, _>(file),
            Algorithm::Sha384 => stream_digest::<Sha384, _>(file),
            Algorithm::Sha512 => stream_digest::<Sha512, _>(file),
            Algorithm::Blake2b => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "blake2b has no in-process implementation",
            )),
        }
    }
}

fn stream_digest<D: Digest, R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_empty_input_digests() {
        assert_eq!(
            stream_digest::<Sha1, _>(Cursor::new(b"")).unwrap(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_eq!(
            stream_digest::<Sha256, _>(Cursor::new(b"")).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_chunked_read_matches_one_shot() {
        let data = vec![0x5Au8; READ_CHUNK_SIZE * 3 + 17];
        let streamed = stream_digest::<Sha384, _>(Cursor::new(&data)).unwrap();
        assert_eq!(streamed, hex::encode(Sha384::digest(&data)));
        assert_eq!(streamed.len(), Algorithm::Sha384.hex_len());
    }
}

// MIT LICENSE
//
// Copyright (c) 2024 Hoard Engine Contributors
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! The fast-hash content fingerprint.
//!
//! Scanners identify file contents without reading whole files: the
//! fast-hash is the MD5 hex digest of the ASCII decimal file size followed
//! by the entire contents for small files, or by three fixed-size chunks
//! (head, middle, tail) for large ones. Both sides of a sync must use the
//! same chunk size or the fingerprints will not line up.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use md5::{Digest, Md5};

/// Default chunk size used by the sampling scheme.
pub const DEFAULT_CHUNK_SIZE: u64 = 1 << 16;

/// Computes the fast-hash of a file on disk.
pub fn fast_hash(path: &Path, chunk_size: u64) -> io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.seek(SeekFrom::End(0))?;

    let mut hasher = Md5::new();
    hasher.update(size.to_string().as_bytes());

    if size <= 3 * chunk_size {
        file.seek(SeekFrom::Start(0))?;
        let mut contents = Vec::with_capacity(size as usize);
        file.read_to_end(&mut contents)?;
        hasher.update(&contents);
    } else {
        let mut chunk = vec![0u8; chunk_size as usize];
        for offset in [0, size / 2 - chunk_size / 2, size - chunk_size] {
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut chunk)?;
            hasher.update(&chunk);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Computes the fast-hash of an in-memory buffer; identical to
/// [`fast_hash`] over a file with these contents.
pub fn fast_hash_bytes(data: &[u8], chunk_size: u64) -> String {
    let size = data.len() as u64;

    let mut hasher = Md5::new();
    hasher.update(size.to_string().as_bytes());

    if size <= 3 * chunk_size {
        hasher.update(data);
    } else {
        for offset in [0, size / 2 - chunk_size / 2, size - chunk_size] {
            hasher.update(&data[offset as usize..(offset + chunk_size) as usize]);
        }
    }

    hex::encode(hasher.finalize())
}

/// MD5 of the complete file contents, the optional secondary witness
/// carried on blobs.
pub fn file_md5(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 1 << 23];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn small_file_hashes_size_and_contents() {
        // size 5 -> digest of b"5hello"
        let expected = hex::encode(Md5::digest(b"5hello"));
        assert_eq!(fast_hash_bytes(b"hello", DEFAULT_CHUNK_SIZE), expected);
    }

    #[test]
    fn large_file_samples_three_chunks() {
        let chunk = 4u64;
        let data: Vec<u8> = (0u8..32).collect();
        // size 32 > 3 * 4: chunks at 0, 14 (= 32/2 - 2), 28.
        let mut manual = Vec::new();
        manual.extend_from_slice(b"32");
        manual.extend_from_slice(&data[0..4]);
        manual.extend_from_slice(&data[14..18]);
        manual.extend_from_slice(&data[28..32]);
        let expected = hex::encode(Md5::digest(&manual));
        assert_eq!(fast_hash_bytes(&data, chunk), expected);
    }

    #[test]
    fn file_and_bytes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        File::create(&path).unwrap().write_all(&data).unwrap();

        assert_eq!(
            fast_hash(&path, DEFAULT_CHUNK_SIZE).unwrap(),
            fast_hash_bytes(&data, DEFAULT_CHUNK_SIZE)
        );
        assert_eq!(
            file_md5(&path).unwrap(),
            hex::encode(Md5::digest(&data))
        );
    }

    #[test]
    fn boundary_is_inclusive() {
        // Exactly 3 chunks long still reads the whole file.
        let data = vec![7u8; 12];
        let whole = {
            let mut manual = Vec::new();
            manual.extend_from_slice(b"12");
            manual.extend_from_slice(&data);
            hex::encode(Md5::digest(&manual))
        };
        assert_eq!(fast_hash_bytes(&data, 4), whole);
    }
}

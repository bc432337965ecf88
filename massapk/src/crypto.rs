//! Password based encryption of backup archives.
//!
//! Envelope layout:
//!
//! | Field       | Size                                  |
//! | ----------- | ------------------------------------- |
//! | magic       | 8 bytes, `MAPKAE01`                   |
//! | memory KiB  | u32 LE, Argon2id memory cost          |
//! | iterations  | u32 LE, Argon2id time cost            |
//! | parallelism | u32 LE, Argon2id lanes                |
//! | salt        | 16 bytes                              |
//! | nonce       | 7 bytes, STREAM nonce prefix          |
//! | segments    | AES-256-GCM STREAM (BE32) segments    |
//!
//! Every segment but the last holds [SEGMENT_SIZE] bytes of plaintext plus a
//! 16 byte tag. The last one is flagged as such, so a truncated envelope
//! fails to authenticate.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::stream::{DecryptorBE32, EncryptorBE32};
use aes_gcm::aead::KeyInit;
use aes_gcm::Aes256Gcm;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use crate::utils::{path_str, remove_path};

/// Extension given to encrypted backups
pub const ENCRYPTED_EXT: &'static str = "aes";

pub const MAGIC: &[u8; 8] = b"MAPKAE01";
pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 7;
pub const KEY_SIZE: usize = 32;
pub const TAG_SIZE: usize = 16;
pub const SEGMENT_SIZE: usize = 64 * 1024;

const HEADER_SIZE: usize = MAGIC.len() + 12 + SALT_SIZE + NONCE_SIZE;

/// Refuse to derive keys with more memory than this (KiB) when reading an
/// envelope
const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    fn derive_key(&self, password: &str, salt: &[u8]) -> crate::Result<[u8; KEY_SIZE]> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| crate::Error::Encrypt(format!("invalid key derivation params: {}", e)))?;

        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut key = [0u8; KEY_SIZE];
        argon
            .hash_password_into(password.as_bytes(), salt, &mut key)
            .map_err(|e| crate::Error::Encrypt(format!("key derivation failed: {}", e)))?;
        Ok(key)
    }
}

/// Encrypts and decrypts streams under a password
pub struct Envelope {
    password: String,
    params: KdfParams,
}

/// Reads until `buf` is full or the reader is exhausted
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn new_cipher(key: &[u8; KEY_SIZE]) -> crate::Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|e| crate::Error::Encrypt(e.to_string()))
}

impl Envelope {
    pub fn new<S: Into<String>>(password: S) -> Self {
        Self {
            password: password.into(),
            params: KdfParams::default(),
        }
    }

    /// Key derivation cost used when encrypting. Decryption always uses the
    /// parameters stored in the envelope.
    pub fn with_params(mut self, params: KdfParams) -> Self {
        self.params = params;
        self
    }

    /// Encrypts everything from `reader` into `writer`, returning the number of
    /// plaintext bytes
    pub fn encrypt<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> crate::Result<u64> {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let key = self.params.derive_key(&self.password, &salt)?;
        let cipher = new_cipher(&key)?;

        writer.write_all(MAGIC)?;
        writer.write_all(&self.params.memory_kib.to_le_bytes())?;
        writer.write_all(&self.params.iterations.to_le_bytes())?;
        writer.write_all(&self.params.parallelism.to_le_bytes())?;
        writer.write_all(&salt)?;
        writer.write_all(&nonce)?;

        let mut encryptor = EncryptorBE32::from_aead(cipher, GenericArray::from_slice(&nonce));
        let mut buf = vec![0u8; SEGMENT_SIZE];
        let mut total = 0u64;

        loop {
            let n = read_full(&mut reader, &mut buf)?;
            total += n as u64;
            if n == buf.len() {
                let segment = encryptor
                    .encrypt_next(&buf[..])
                    .map_err(|e| crate::Error::Encrypt(e.to_string()))?;
                writer.write_all(&segment)?;
            } else {
                let segment = encryptor
                    .encrypt_last(&buf[..n])
                    .map_err(|e| crate::Error::Encrypt(e.to_string()))?;
                writer.write_all(&segment)?;
                break;
            }
        }

        writer.flush()?;
        Ok(total)
    }

    /// Decrypts an envelope from `reader` into `writer`, returning the number
    /// of plaintext bytes. A wrong password fails on the first segment.
    pub fn decrypt<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> crate::Result<u64> {
        let mut header = [0u8; HEADER_SIZE];
        let n = read_full(&mut reader, &mut header)?;
        if n < HEADER_SIZE || &header[..MAGIC.len()] != MAGIC {
            return Err(crate::Error::BadEnvelope("missing header".into()));
        }

        let field = |idx: usize| {
            let start = MAGIC.len() + idx * 4;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&header[start..start + 4]);
            u32::from_le_bytes(raw)
        };
        let params = KdfParams {
            memory_kib: field(0),
            iterations: field(1),
            parallelism: field(2),
        };
        if params.memory_kib > MAX_MEMORY_KIB {
            return Err(crate::Error::BadEnvelope(format!(
                "unreasonable memory cost {} KiB",
                params.memory_kib
            )));
        }

        let salt_start = MAGIC.len() + 12;
        let salt = &header[salt_start..salt_start + SALT_SIZE];
        let nonce = &header[salt_start + SALT_SIZE..];

        let key = params
            .derive_key(&self.password, salt)
            .map_err(|e| crate::Error::BadEnvelope(e.to_string()))?;
        let cipher = new_cipher(&key)?;

        let mut decryptor = DecryptorBE32::from_aead(cipher, GenericArray::from_slice(nonce));
        let mut buf = vec![0u8; SEGMENT_SIZE + TAG_SIZE];
        let mut total = 0u64;

        loop {
            let n = read_full(&mut reader, &mut buf)?;
            if n == buf.len() {
                let plain = decryptor
                    .decrypt_next(&buf[..])
                    .map_err(|_| crate::Error::Decrypt)?;
                total += plain.len() as u64;
                writer.write_all(&plain)?;
            } else {
                let plain = decryptor
                    .decrypt_last(&buf[..n])
                    .map_err(|_| crate::Error::Decrypt)?;
                total += plain.len() as u64;
                writer.write_all(&plain)?;
                break;
            }
        }

        writer.flush()?;
        Ok(total)
    }

    /// Encrypts the file at `src` into `dst`. `dst` is removed on failure.
    pub fn encrypt_file(&self, src: &Path, dst: &Path) -> crate::Result<u64> {
        let reader = BufReader::new(open(src)?);
        let writer = BufWriter::new(File::create(dst)?);
        let res = self.encrypt(reader, writer);
        if res.is_err() {
            discard(dst);
        }
        res
    }

    /// Decrypts the file at `src` into `dst`. `dst` is removed on failure so
    /// no partially decrypted data is left behind.
    pub fn decrypt_file(&self, src: &Path, dst: &Path) -> crate::Result<u64> {
        let reader = BufReader::new(open(src)?);
        let writer = BufWriter::new(File::create(dst)?);
        let res = self.decrypt(reader, writer);
        if res.is_err() {
            discard(dst);
        }
        res
    }
}

fn open(path: &Path) -> crate::Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => crate::Error::MissingFile(path_str(path).into_owned()),
        _ => e.into(),
    })
}

fn discard(path: &Path) {
    if let Err(e) = remove_path(path) {
        log::warn!("failed to remove {:?}: {}", path, e);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{tmp_dir, TmpDir};
    use rstest::*;
    use std::fs;

    fn fast() -> KdfParams {
        KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn envelope(password: &str) -> Envelope {
        Envelope::new(password).with_params(fast())
    }

    fn encrypt(password: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let n = envelope(password).encrypt(data, &mut out).expect("encrypt");
        assert_eq!(n, data.len() as u64);
        out
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[rstest]
    #[case(0)]
    #[case(11)]
    #[case(SEGMENT_SIZE)]
    #[case(2 * SEGMENT_SIZE + 17)]
    fn test_round_trip(#[case] len: usize) {
        let data = payload(len);
        let encrypted = encrypt("hunter2", &data);
        assert_ne!(&encrypted[HEADER_SIZE..], data.as_slice());

        let mut decrypted = Vec::new();
        let n = envelope("hunter2")
            .decrypt(encrypted.as_slice(), &mut decrypted)
            .expect("decrypt");
        assert_eq!(n, len as u64);
        assert_eq!(decrypted, data);
    }

    #[test]
    fn test_header_records_params() {
        let encrypted = encrypt("pw", b"data");
        assert_eq!(&encrypted[..8], MAGIC);
        assert_eq!(&encrypted[8..12], &64u32.to_le_bytes());
        // Decrypting with different configured params still works
        let mut out = Vec::new();
        Envelope::new("pw")
            .decrypt(encrypted.as_slice(), &mut out)
            .expect("decrypt");
        assert_eq!(out, b"data");
    }

    #[test]
    fn test_wrong_password() {
        let encrypted = encrypt("right", &payload(1000));
        let mut out = Vec::new();
        let res = envelope("wrong").decrypt(encrypted.as_slice(), &mut out);
        assert!(matches!(res, Err(crate::Error::Decrypt)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_tampered() {
        let mut encrypted = encrypt("pw", &payload(100));
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x01;
        let res = envelope("pw").decrypt(encrypted.as_slice(), Vec::new());
        assert!(matches!(res, Err(crate::Error::Decrypt)));
    }

    #[test]
    fn test_truncated() {
        let encrypted = encrypt("pw", &payload(SEGMENT_SIZE * 2 + 5));
        // Drop the final segment, what's left ends on a full segment
        let cut = HEADER_SIZE + SEGMENT_SIZE + TAG_SIZE;
        let res = envelope("pw").decrypt(&encrypted[..cut], Vec::new());
        assert!(matches!(res, Err(crate::Error::Decrypt)));
    }

    #[test]
    fn test_not_an_envelope() {
        let res = envelope("pw").decrypt(&b"PK\x03\x04 definitely a zip"[..], Vec::new());
        assert!(matches!(res, Err(crate::Error::BadEnvelope(_))));
    }

    #[rstest]
    fn test_files(tmp_dir: TmpDir) {
        let zip = tmp_dir.create_file_name("backup.zip", Some("zip bytes"));
        let aes = tmp_dir.get_path().join("backup.aes");
        let restored = tmp_dir.get_path().join("restored.zip");

        envelope("pw").encrypt_file(&zip, &aes).expect("encrypt file");
        assert!(aes.exists());

        let res = envelope("nope").decrypt_file(&aes, &restored);
        assert!(matches!(res, Err(crate::Error::Decrypt)));
        assert!(!restored.exists());

        envelope("pw").decrypt_file(&aes, &restored).expect("decrypt file");
        assert_eq!(fs::read_to_string(&restored).unwrap(), "zip bytes");

        let res = envelope("pw").encrypt_file(&tmp_dir.get_path().join("missing.zip"), &aes);
        assert!(matches!(res, Err(crate::Error::MissingFile(_))));
    }
}

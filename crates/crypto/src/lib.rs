use anyhow::{anyhow, Context, Result};
use secrecy::SecretVec;
use std::io::Read;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Reads an age identity file: one `AGE-SECRET-KEY-1...` per line, `#` comments allowed.
pub fn load_identities(path: &Path) -> Result<Vec<age::x25519::Identity>> {
    let text = Zeroizing::new(
        std::fs::read_to_string(path).with_context(|| format!("open identity {}", path.display()))?,
    );
    let ids = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .enumerate()
        .map(|(i, l)| {
            l.parse::<age::x25519::Identity>()
                .map_err(|e| anyhow!("{}: identity {}: {e}", path.display(), i + 1))
        })
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        anyhow::bail!("{}: no identities found", path.display());
    }
    Ok(ids)
}

pub fn decrypt_age_bytes(rdr: impl Read, ids: &[age::x25519::Identity]) -> Result<SecretVec<u8>> {
    let decryptor = age::Decryptor::new(rdr).context("read age header")?;
    let mut plain = decryptor
        .decrypt(ids.iter().map(|i| i as &dyn age::Identity))
        .context("no matching identity")?;
    let mut out = Vec::new();
    plain.read_to_end(&mut out)?;
    Ok(SecretVec::new(out))
}

/// Decrypts `path` when it ends in `.age`, otherwise returns its contents as-is.
pub fn read_maybe_encrypted(path: &Path, identity_files: &[PathBuf]) -> Result<SecretVec<u8>> {
    let f = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    if path.extension().and_then(|e| e.to_str()) == Some("age") {
        if identity_files.is_empty() {
            anyhow::bail!("{} is encrypted; pass --age-identity", path.display());
        }
        let mut ids = Vec::new();
        for p in identity_files { ids.extend(load_identities(p)?); }
        return decrypt_age_bytes(std::io::BufReader::new(f), &ids).with_context(|| format!("decrypt {}", path.display()));
    }
    let mut out = Vec::new();
    std::io::BufReader::new(f).read_to_end(&mut out)?;
    Ok(SecretVec::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    fn encrypt(plain: &[u8], to: &age::x25519::Recipient) -> Vec<u8> {
        let enc = age::Encryptor::with_recipients(std::iter::once(to as &dyn age::Recipient)).unwrap();
        let mut out = Vec::new();
        let mut w = enc.wrap_output(&mut out).unwrap();
        w.write_all(plain).unwrap();
        w.finish().unwrap();
        out
    }

    #[test]
    fn decrypts_for_matching_identity() {
        let id = age::x25519::Identity::generate();
        let cipher = encrypt(b"project: demo\n", &id.to_public());
        let plain = decrypt_age_bytes(&cipher[..], &[id]).unwrap();
        assert_eq!(plain.expose_secret().as_slice(), b"project: demo\n");
    }

    #[test]
    fn rejects_foreign_identity() {
        let cipher = encrypt(b"x", &age::x25519::Identity::generate().to_public());
        assert!(decrypt_age_bytes(&cipher[..], &[age::x25519::Identity::generate()]).is_err());
    }

    #[test]
    fn identity_file_without_keys_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# created: 2024-01-01\n\n").unwrap();
        let Err(err) = load_identities(f.path()) else { panic!("expected an error") };
        assert!(err.to_string().contains("no identities"));
    }

    #[test]
    fn malformed_identity_is_reported() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# key\nAGE-SECRET-KEY-1NOTAKEY").unwrap();
        let Err(err) = load_identities(f.path()) else { panic!("expected an error") };
        assert!(err.to_string().contains("identity 1"));
    }

    #[test]
    fn plain_files_pass_through() {
        let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(f, "project: demo").unwrap();
        let body = read_maybe_encrypted(f.path(), &[]).unwrap();
        assert_eq!(body.expose_secret().as_slice(), b"project: demo");
    }

    #[test]
    fn encrypted_files_need_an_identity() {
        let f = tempfile::Builder::new().suffix(".age").tempfile().unwrap();
        let Err(err) = read_maybe_encrypted(f.path(), &[]) else { panic!("expected an error") };
        assert!(err.to_string().contains("--age-identity"));
    }
}

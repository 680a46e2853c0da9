//! Generated identity pools.

use std::path::Path;

use localnet_core::identity::{CERT_FILE_NAME, KEY_FILE_NAME};
use localnet_core::IdentityPool;
use tempfile::TempDir;

/// Self-signed staking identities written out as `keys{1..N}/staker.{crt,key}`.
pub struct IdentityFixture {
    dir: TempDir,
    pairs: Vec<(Vec<u8>, Vec<u8>)>,
}

impl IdentityFixture {
    /// Generate `count` fresh certificate/key pairs on disk.
    pub fn generate(count: usize) -> Self {
        let dir = tempfile::Builder::new()
            .prefix("localnet-keys-")
            .tempdir()
            .expect("create identity fixture dir");

        let pairs: Vec<_> = (0..count).map(generate_pair).collect();
        for (slot, (certificate, key)) in pairs.iter().enumerate() {
            let slot_dir = dir.path().join(format!("keys{}", slot + 1));
            std::fs::create_dir_all(&slot_dir).expect("create keys dir");
            std::fs::write(slot_dir.join(CERT_FILE_NAME), certificate).expect("write cert");
            std::fs::write(slot_dir.join(KEY_FILE_NAME), key).expect("write key");
        }

        Self { dir, pairs }
    }

    /// Directory to pass as the identity pool location
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// PEM pairs in slot order
    pub fn pem_pairs(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.pairs.clone()
    }

    /// Pool built from the in-memory pairs
    pub fn pool(&self) -> IdentityPool {
        IdentityPool::from_pem_pairs(self.pem_pairs()).expect("generated identities are valid")
    }
}

fn generate_pair(slot: usize) -> (Vec<u8>, Vec<u8>) {
    let key = rcgen::KeyPair::generate().expect("generate key");
    let params = rcgen::CertificateParams::new(vec![format!("node{}.localnet", slot + 1)])
        .expect("certificate params");
    let cert = params.self_signed(&key).expect("self-sign certificate");
    (cert.pem().into_bytes(), key.serialize_pem().into_bytes())
}

//! # Key Schedule
//!
//! RFC 5246 §6.3 / §8.1 applied to the PSK premaster secret:
//!
//! ```text
//! master  = PRF(premaster, "master secret", client_random || server_random)[0..48]
//! block   = PRF(master, "key expansion", server_random || client_random)
//!         = client_write_key || server_write_key || client_write_IV || server_write_IV
//! verify  = PRF(master, "client finished" | "server finished", Hash(transcript))[0..12]
//! ```
//!
//! AEAD suites carry no MAC keys.

use shared_crypto::{prf, CryptoError, RecordCipher, SecretKey};

use super::cipher_suite::CipherSuite;
use super::handshake::VERIFY_DATA_LEN;

pub const MASTER_SECRET_LEN: usize = 48;

/// Which side of the handshake we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    /// Used only by the test client driver.
    Client,
}

impl Role {
    fn finished_label(self) -> &'static [u8] {
        match self {
            Role::Server => b"server finished",
            Role::Client => b"client finished",
        }
    }

    pub fn peer(self) -> Role {
        match self {
            Role::Server => Role::Client,
            Role::Client => Role::Server,
        }
    }
}

pub fn master_secret(
    suite: CipherSuite,
    premaster: &SecretKey,
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<SecretKey, CryptoError> {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    let master = prf(
        suite.prf_hash(),
        premaster.as_bytes(),
        b"master secret",
        &seed,
        MASTER_SECRET_LEN,
    )?;
    Ok(SecretKey::from_bytes(master))
}

/// verify_data sent by `sender` over the transcript hash.
pub fn verify_data(
    suite: CipherSuite,
    master: &SecretKey,
    sender: Role,
    transcript_hash: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    prf(
        suite.prf_hash(),
        master.as_bytes(),
        sender.finished_label(),
        transcript_hash,
        VERIFY_DATA_LEN,
    )
}

/// Epoch-1 read/write ciphers for one side of a session.
#[derive(Debug)]
pub struct SessionKeys {
    pub read: RecordCipher,
    pub write: RecordCipher,
}

impl SessionKeys {
    pub fn derive(
        suite: CipherSuite,
        master: &SecretKey,
        client_random: &[u8; 32],
        server_random: &[u8; 32],
        role: Role,
    ) -> Result<Self, CryptoError> {
        let aead = suite.aead();
        let key_len = aead.key_len();
        let iv_len = aead.fixed_iv_len();

        let mut seed = Vec::with_capacity(64);
        seed.extend_from_slice(server_random);
        seed.extend_from_slice(client_random);
        let block = SecretKey::from_bytes(prf(
            suite.prf_hash(),
            master.as_bytes(),
            b"key expansion",
            &seed,
            2 * (key_len + iv_len),
        )?);

        let b = block.as_bytes();
        let (client_key, rest) = b.split_at(key_len);
        let (server_key, rest) = rest.split_at(key_len);
        let (client_iv, server_iv) = rest.split_at(iv_len);

        let client = RecordCipher::new(aead, client_key, client_iv)?;
        let server = RecordCipher::new(aead, server_key, server_iv)?;

        Ok(match role {
            Role::Server => Self {
                read: client,
                write: server,
            },
            Role::Client => Self {
                read: server,
                write: client,
            },
        })
    }
}

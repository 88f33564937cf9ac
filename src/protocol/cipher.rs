//! Authenticated encryption of whole units.
//!
//! ## Layout
//! ```text
//! [Nonce(24)] [Ciphertext + Tag(16)]
//! ```

use super::layer::{codes, Decoded, LayerContext, ProtocolLayer};
use crate::error::{Error, Result};
use crate::utils::crypto::{Crypto, KEY_SIZE, NONCE_SIZE};

const TAG_SIZE: usize = 16;

#[derive(Debug)]
pub struct CipherLayer {
    crypto: Crypto,
}

impl CipherLayer {
    pub const NAME: &'static str = "cipher";

    /// The caller's key buffer is zeroized.
    pub fn new(key: &mut [u8; KEY_SIZE]) -> Self {
        Self {
            crypto: Crypto::new(key),
        }
    }
}

impl ProtocolLayer for CipherLayer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn encode(&self, data: Vec<u8>, _ctx: &mut LayerContext<'_>) -> Result<Vec<u8>> {
        let nonce = Crypto::generate_nonce()?;
        let sealed = self.crypto.encrypt(&data, &nonce)?;
        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decode(&self, data: &[u8], _ctx: &mut LayerContext<'_>) -> Result<Decoded> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::protocol(
                Self::NAME,
                codes::TRUNCATED,
                format!("sealed unit too short: {} bytes", data.len()),
            ));
        }

        let (nonce, sealed) = data.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        let plain = self
            .crypto
            .decrypt(sealed, &nonce_bytes)
            .map_err(|_| Error::protocol(Self::NAME, codes::DECRYPT, "authentication failed"))?;
        Ok(Decoded::whole(plain, data.len()))
    }
}

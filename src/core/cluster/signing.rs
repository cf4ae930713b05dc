// src/core/cluster/signing.rs

//! HMAC signing for cluster bus messages. When a cluster password is set,
//! every gossip datagram carries an HMAC-SHA256 signature over its encoded
//! payload; unsigned or badly signed packets are dropped by the receiver.

use super::gossip::GossipMessage;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 produces 32 bytes.
pub type Signature = [u8; 32];

/// The wire envelope actually sent over UDP: the gossip message plus its signature.
#[derive(Serialize, Deserialize, bincode::Encode, bincode::Decode, Debug, Clone)]
pub struct SignedGossipMessage {
    pub message: GossipMessage,
    pub signature: Signature,
}

impl SignedGossipMessage {
    /// Wraps a gossip message, signing it when a password is configured.
    /// Without a password the signature is all zeroes.
    pub fn new(message: GossipMessage, password: &Option<String>) -> Result<Self, &'static str> {
        let Some(pass) = password else {
            return Ok(Self {
                message,
                signature: [0u8; 32],
            });
        };

        let encoded = bincode::encode_to_vec(&message, bincode::config::standard())
            .map_err(|_| "Failed to encode gossip message for signing")?;

        let mut mac = HmacSha256::new_from_slice(pass.as_bytes())
            .map_err(|_| "Failed to create HMAC instance")?;
        mac.update(&encoded);

        let signature: Signature = mac
            .finalize()
            .into_bytes()
            .as_slice()
            .try_into()
            .map_err(|_| "Invalid signature length")?;

        Ok(Self { message, signature })
    }

    /// Verifies the signature of a received message against the local password.
    pub fn verify(&self, password: &Option<String>) -> Result<bool, &'static str> {
        let Some(pass) = password else {
            // No password configured: accept only unsigned messages.
            return Ok(self.signature == [0u8; 32]);
        };

        if self.signature == [0u8; 32] {
            return Ok(false);
        }

        let encoded = bincode::encode_to_vec(&self.message, bincode::config::standard())
            .map_err(|_| "Failed to encode received gossip message for verification")?;

        let mut mac = HmacSha256::new_from_slice(pass.as_bytes())
            .map_err(|_| "Failed to create HMAC instance for verification")?;
        mac.update(&encoded);

        Ok(mac.verify_slice(&self.signature).is_ok())
    }
}

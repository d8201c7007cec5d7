//! Signed envelopes for anything that crosses a process boundary: the
//! distributed pub/sub event bus and the inter-engine message bus
//! (spec.md §4.1, §4.13, §6: "signed envelope `{sender, messageType,
//! payload, hmac}`; HMAC covers `sender||messageType||payload`").

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub message_type: String,
    pub payload: Vec<u8>,
    pub hmac: Vec<u8>,
}

impl Envelope {
    /// Signs `payload` under `shared_secret`, covering
    /// `sender || message_type || payload`.
    pub fn sign(sender: &str, message_type: &str, payload: Vec<u8>, shared_secret: &[u8]) -> Self {
        let hmac = compute_hmac(sender, message_type, &payload, shared_secret);
        Self {
            sender: sender.to_string(),
            message_type: message_type.to_string(),
            payload,
            hmac,
        }
    }

    /// Verifies the envelope's HMAC in constant time. Receivers reject
    /// missing/invalid HMACs outright (spec.md §6).
    pub fn verify(&self, shared_secret: &[u8]) -> bool {
        let expected = compute_hmac(&self.sender, &self.message_type, &self.payload, shared_secret);
        expected.ct_eq(&self.hmac).into()
    }

    /// True when this envelope originated from our own instance id; the
    /// distributed bus rejects these to avoid re-delivering to self
    /// (spec.md §8: "publishing an event with the local instanceId is
    /// never re-delivered to self").
    pub fn is_own_origin(&self, instance_id: &str) -> bool {
        self.sender == instance_id
    }
}

fn compute_hmac(sender: &str, message_type: &str, payload: &[u8], shared_secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(shared_secret).expect("HMAC accepts any key length");
    mac.update(sender.as_bytes());
    mac.update(message_type.as_bytes());
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let env = Envelope::sign("engine-1", "TellMessage", b"hello".to_vec(), b"secret");
        assert!(env.verify(b"secret"));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let mut env = Envelope::sign("engine-1", "TellMessage", b"hello".to_vec(), b"secret");
        env.payload = b"tampered".to_vec();
        assert!(!env.verify(b"secret"));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let env = Envelope::sign("engine-1", "TellMessage", b"hello".to_vec(), b"secret");
        assert!(!env.verify(b"wrong-secret"));
    }

    #[test]
    fn own_origin_detected_by_sender_id() {
        let env = Envelope::sign("engine-1", "TellMessage", vec![], b"secret");
        assert!(env.is_own_origin("engine-1"));
        assert!(!env.is_own_origin("engine-2"));
    }
}

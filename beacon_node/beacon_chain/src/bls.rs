//! The injectable BLS verification seam (§4.F.5, §6). The real pairing implementation is out of
//! scope for this core; callers wire in whatever `bls::BlsVerifier` their deployment needs.

use types::{PublicKeyBytes, SignatureBytes};

pub trait BlsVerifier: Send + Sync {
    fn verify(&self, pubkeys: &[PublicKeyBytes], message: &[u8], signature: &SignatureBytes) -> bool;
}

/// Accepts every signature without inspecting it. Used by tests and by deployments that verify
/// signatures upstream of this core (e.g. at the gossip-validation layer).
pub struct NullBlsVerifier;

impl BlsVerifier for NullBlsVerifier {
    fn verify(&self, _pubkeys: &[PublicKeyBytes], _message: &[u8], _signature: &SignatureBytes) -> bool {
        true
    }
}

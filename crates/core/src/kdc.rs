//! Verifier side checks of the disclosed key schedule values.

use std::{collections::BTreeMap, path::Path};

use hmac_sha256::{hkdf_expand_label, hmac_continue, hmac_sha256, Digest};
use tls_core::cipher::{IV_LEN, KEY_LEN};
use tracing::{debug, instrument};

use crate::{
    key_schedule::{expand_inner_hash, CLIENT_AP_TRAFFIC, FINISHED, SERVER_AP_TRAFFIC},
    params::TlsParameters,
    storage,
    transcript::Checkpoints,
    Error,
};

/// Checks the server Finished message against the disclosed key schedule
/// values.
///
/// Two checks must pass:
///
/// 1. Continuing the disclosed SHTS inner hash from the `opad` digest of the
///    handshake secret yields the disclosed SHTS.
/// 2. The Finished verify data equals `HMAC(finished_key, H7)` with the
///    finished key derived from that SHTS.
#[instrument(level = "debug", skip_all, err)]
pub fn verify_server_finished(
    params: &TlsParameters,
    checkpoints: &Checkpoints,
    finished: &[u8],
) -> Result<(), Error> {
    let shts_ok = verify_shts(params)?;
    if !shts_ok {
        debug!("SHTS does not match the disclosed inner hash");
    }

    let finished_key = hkdf_expand_label(&params.shts, FINISHED, &[], 32)?;
    let expected = hmac_sha256(&finished_key, &checkpoints.h7)?;
    let finished_ok = expected.as_slice() == finished;
    if !finished_ok {
        debug!("server Finished does not match SHTS and H7");
    }

    if shts_ok && finished_ok {
        debug!("server Finished verified");
        Ok(())
    } else {
        Err(Error::authentication()
            .with_msg("server Finished verification against disclosed key schedule failed"))
    }
}

fn verify_shts(params: &TlsParameters) -> Result<bool, Error> {
    if params.shts.len() != 32 || params.shts_in.len() != 32 || params.hs_opad.len() != 32 {
        return Err(Error::authentication()
            .with_msg("SHTS, SHTSin and the handshake secret opad digest must be 32 bytes"));
    }

    Ok(hmac_continue(&params.shts_in, &params.hs_opad)?.as_slice() == params.shts.as_slice())
}

/// Key schedule public input computed by the verifier from the disclosed
/// `ipad` digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdcPublicInput {
    /// `opad` first block digest of the handshake secret, as disclosed.
    pub hs_opad: Vec<u8>,
    /// Master secret inner hash.
    pub ms_in: Digest,
    /// Server application traffic secret inner hash.
    pub sats_in: Digest,
    /// Client application traffic secret inner hash.
    pub cats_in: Digest,
    /// Server application key inner hash.
    pub tk_sapp_in: Digest,
    /// Server application IV inner hash.
    pub iv_sapp_in: Digest,
    /// Client application key inner hash.
    pub tk_capp_in: Digest,
    /// Client application IV inner hash.
    pub iv_capp_in: Digest,
}

impl KdcPublicInput {
    /// Computes the public input.
    pub fn compute(params: &TlsParameters, checkpoints: &Checkpoints) -> Result<Self, Error> {
        Ok(Self {
            hs_opad: params.hs_opad.clone(),
            ms_in: hmac_continue(&[0u8; 32], &params.dhs_ipad)?,
            sats_in: expand_inner_hash(&params.ms_ipad, SERVER_AP_TRAFFIC, &checkpoints.h3, 32)?,
            cats_in: expand_inner_hash(&params.ms_ipad, CLIENT_AP_TRAFFIC, &checkpoints.h3, 32)?,
            tk_sapp_in: expand_inner_hash(&params.sats_ipad, b"key", &[], KEY_LEN as u16)?,
            iv_sapp_in: expand_inner_hash(&params.sats_ipad, b"iv", &[], IV_LEN as u16)?,
            tk_capp_in: expand_inner_hash(&params.cats_ipad, b"key", &[], KEY_LEN as u16)?,
            iv_capp_in: expand_inner_hash(&params.cats_ipad, b"iv", &[], IV_LEN as u16)?,
        })
    }

    /// Returns the hex encoded fields by their file names.
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("intermediateHashHSopad", hex::encode(&self.hs_opad)),
            ("MSin", hex::encode(self.ms_in)),
            ("SATSin", hex::encode(self.sats_in)),
            ("tkSappIn", hex::encode(self.tk_sapp_in)),
            ("ivSappIn", hex::encode(self.iv_sapp_in)),
            ("CATSin", hex::encode(self.cats_in)),
            ("tkCappIn", hex::encode(self.tk_capp_in)),
            ("ivCappIn", hex::encode(self.iv_capp_in)),
        ])
    }

    /// Writes the public input to `path`.
    pub fn store(&self, path: &Path) -> Result<(), Error> {
        storage::write_json(path, &self.to_map())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_schedule::KeySchedule;
    use rstest::*;
    use tls_core::{cipher::CipherState, fixtures::SessionFixture, HandshakeReplay};

    #[fixture]
    fn session() -> (Vec<u8>, Checkpoints, KeySchedule) {
        let fixture = SessionFixture::new();
        let keys =
            CipherState::from_traffic_secret(&fixture.secrets.server_handshake_traffic_secret)
                .unwrap();
        let handshake = HandshakeReplay::new(&fixture.client_capture, &fixture.server_capture)
            .unwrap()
            .finish(keys, None)
            .unwrap();
        let checkpoints = Checkpoints::from_handshake(&handshake);
        let schedule =
            KeySchedule::derive(&fixture.secrets.handshake_secret, &checkpoints).unwrap();

        (
            handshake.finished_verify_data().to_vec(),
            checkpoints,
            schedule,
        )
    }

    #[rstest]
    fn test_verify_server_finished(session: (Vec<u8>, Checkpoints, KeySchedule)) {
        let (finished, checkpoints, schedule) = session;
        let params = TlsParameters::from_schedule(&schedule);

        verify_server_finished(&params, &checkpoints, &finished).unwrap();
    }

    #[rstest]
    #[case::shts(0)]
    #[case::shts_in(1)]
    #[case::hs_opad(2)]
    #[case::finished(3)]
    fn test_verify_server_finished_tampered(
        session: (Vec<u8>, Checkpoints, KeySchedule),
        #[case] field: usize,
    ) {
        let (mut finished, checkpoints, schedule) = session;
        let mut params = TlsParameters::from_schedule(&schedule);
        match field {
            0 => params.shts[0] ^= 1,
            1 => params.shts_in[31] ^= 1,
            2 => params.hs_opad[5] ^= 1,
            _ => finished[0] ^= 1,
        }

        let err = verify_server_finished(&params, &checkpoints, &finished).unwrap_err();
        assert!(err.is_authentication());
    }

    #[rstest]
    fn test_verify_server_finished_missing_fields(
        session: (Vec<u8>, Checkpoints, KeySchedule),
    ) {
        let (finished, checkpoints, _) = session;

        let err = verify_server_finished(&TlsParameters::default(), &checkpoints, &finished)
            .unwrap_err();
        assert!(err.is_authentication());
    }

    #[rstest]
    fn test_kdc_public_input(session: (Vec<u8>, Checkpoints, KeySchedule)) {
        let (_, checkpoints, schedule) = session;
        let params = TlsParameters::from_schedule(&schedule);

        let input = KdcPublicInput::compute(&params, &checkpoints).unwrap();

        assert_eq!(input.ms_in, schedule.inner_hashes.ms);
        assert_eq!(input.sats_in, schedule.inner_hashes.sats);
        assert_eq!(input.cats_in, schedule.inner_hashes.cats);
        assert_eq!(input.tk_sapp_in, schedule.inner_hashes.ksapp_key);
        assert_eq!(input.iv_capp_in, schedule.inner_hashes.kcapp_iv);
        assert_eq!(input.to_map().len(), 8);
    }

    #[test]
    fn test_kdc_public_input_missing_digest() {
        let checkpoints = Checkpoints {
            h0: [0; 32],
            h2: [0; 32],
            h3: [0; 32],
            h7: [0; 32],
        };

        assert!(KdcPublicInput::compute(&TlsParameters::default(), &checkpoints)
            .unwrap_err()
            .is_encoding());
    }
}

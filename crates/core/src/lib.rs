//! Replay of captured TLS 1.3 sessions and extraction of the evidence a
//! zero-knowledge proof about the session needs.
//!
//! A prover holding the handshake secret of a session replays the capture,
//! derives the key schedule, locates the value a [`Policy`](policy::Policy)
//! refers to inside the decrypted response and writes a private and a shared
//! [policy extract](extract). A verifier replays the same capture with only
//! the disclosed values, checks the server Finished message against them and
//! recomputes the GCM tags of the records it is asked to accept.
//!
//! All interchange happens through JSON files in a storage directory, see
//! [`storage`].

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod extract;
pub mod kdc;
pub mod key_schedule;
pub mod params;
pub mod policy;
pub mod records;
pub mod session;
pub mod statement;
pub mod storage;
pub mod transcript;

pub use config::ReplayConfig;
pub use error::{Error, ErrorKind};
pub use session::{ProverSession, VerifierSession};


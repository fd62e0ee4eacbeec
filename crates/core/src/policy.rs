//! Policies and the locator that finds the value a policy refers to.
//!
//! A policy names an API, a regular expression for a JSON key/value pair in
//! its response and a numeric constraint on the value, for example
//!
//! ```json
//! {
//!  "apis": [{
//!   "url": "https://api.example.com/v1/quote?symbol=ACME",
//!   "content-type": "application/json",
//!   "pattern": "\"stock_value\": \"[0-9]+.[0-9]+\",",
//!   "creds": false
//!  }],
//!  "constraints": [{ "value": "98.00", "constraint": "GT" }],
//!  "proxies": [{
//!   "host": "localhost", "port": "8082", "mode": "signature",
//!   "pubKey": "", "algorithm": ""
//!  }]
//! }
//! ```

use std::{ops::Range, path::Path, str::FromStr};

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::{storage, Error};

/// Pattern of the value inside a key/value match: a quoted decimal number.
pub const VALUE_PATTERN: &str = "\"[0-9]+.[0-9]+\"";
/// Bit length the circuit compares values with.
pub const COMPARE_MAX_BIT_LEN: usize = 126;
/// AES block size, the granularity of the disclosed ranges.
pub const BLOCK_LEN: usize = 16;

const CONTENT_TYPE: &str = "application/json";
const SIGNATURE_MODE: &str = "signature";

/// An API the policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Api {
    /// Request URL.
    pub url: String,
    /// Response content type.
    #[serde(rename = "content-type")]
    pub content_type: String,
    /// Regular expression for the key/value pair in the response.
    pub pattern: String,
    /// Whether the URL is completed with a private credential.
    #[serde(default)]
    pub creds: bool,
}

/// A constraint on the located value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Threshold, a decimal number.
    pub value: String,
    /// Operator, one of `GT`, `LT` and `EQ`.
    pub constraint: String,
}

/// The proxy that attests to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    /// Host.
    pub host: String,
    /// Port.
    pub port: String,
    /// Attestation mode.
    pub mode: String,
    /// Public key of the proxy.
    #[serde(rename = "pubKey")]
    pub pub_key: String,
    /// Signature algorithm of the proxy.
    pub algorithm: String,
}

/// A policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// APIs, only the first one is used.
    pub apis: Vec<Api>,
    /// Constraints, only the first one is used.
    pub constraints: Vec<Constraint>,
    /// Proxies, only the first one is used.
    pub proxies: Vec<Proxy>,
}

impl Policy {
    /// Parses a policy document.
    pub fn from_json(json: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(json).map_err(|e| {
            Error::encoding()
                .with_msg("malformed policy document")
                .with_source(e)
        })
    }

    /// Reads a policy document.
    pub fn load(path: &Path) -> Result<Self, Error> {
        storage::read_json(path)
    }

    /// Compiles the first api, constraint and proxy of the policy.
    pub fn compile(&self) -> Result<CompiledPolicy, Error> {
        let unsupported = |msg: &str| Error::policy().with_msg(format!("unsupported policy: {msg}"));

        let api = self.apis.first().ok_or_else(|| unsupported("no api"))?;
        let constraint = self
            .constraints
            .first()
            .ok_or_else(|| unsupported("no constraint"))?;
        let proxy = self.proxies.first().ok_or_else(|| unsupported("no proxy"))?;

        if proxy.mode != SIGNATURE_MODE {
            return Err(unsupported(&format!("proxy mode {}", proxy.mode)));
        }
        if api.content_type != CONTENT_TYPE {
            return Err(unsupported(&format!("content type {}", api.content_type)));
        }

        let key_prefix = api
            .pattern
            .strip_suffix(',')
            .unwrap_or(&api.pattern)
            .strip_suffix(VALUE_PATTERN)
            .ok_or_else(|| unsupported("pattern must end with a quoted decimal value"))?
            .to_string();

        let operator: Operator = constraint.constraint.parse()?;
        let threshold = operator.normalize_threshold(&constraint.value)?;

        let (host, endpoint) = split_url(&api.url)?;

        let regex = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                Error::policy()
                    .with_msg(format!("invalid regex pattern {pattern}"))
                    .with_source(e)
            })
        };

        Ok(CompiledPolicy {
            key_value: regex(&api.pattern)?,
            value_regex: regex(VALUE_PATTERN)?,
            key_prefix: regex(&format!("^{key_prefix}\"$"))?,
            host_header: regex(&format!(r"(?m)^Host: {}\r?$", regex::escape(&host)))?,
            request_line: regex(&format!(
                r"\A[A-Z]+ /{}(?:[?#][^ ]*)? HTTP/1\.[01]\r?\n",
                regex::escape(&endpoint)
            ))?,
            pattern: api.pattern.clone(),
            host,
            endpoint,
            operator,
            threshold,
            constraint_value: constraint.value.clone(),
        })
    }
}

/// Splits a URL into host and path, without the leading `/` and any port.
fn split_url(url: &str) -> Result<(String, String), Error> {
    let (_, rest) = url
        .split_once("://")
        .ok_or_else(|| Error::policy().with_msg(format!("url {url} has no scheme")))?;

    let (authority, path) = match rest.find(['/', '?']) {
        Some(idx) => {
            let (authority, path) = rest.split_at(idx);
            (authority, path.strip_prefix('/').unwrap_or(path))
        }
        None => (rest, ""),
    };
    let host = authority
        .split_once(':')
        .map(|(host, _)| host)
        .unwrap_or(authority);

    Ok((host.to_string(), path.to_string()))
}

/// Comparison operator of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// The value is greater than the threshold.
    GreaterThan,
    /// The value is less than the threshold.
    LessThan,
    /// The value equals the threshold as a string.
    Equal,
}

impl Operator {
    /// Returns the policy document name of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::GreaterThan => "GT",
            Operator::LessThan => "LT",
            Operator::Equal => "EQ",
        }
    }

    /// Brings `value` into the form the circuit compares against.
    ///
    /// Decimal thresholds of `GT` and `LT` are flattened to the digits of a
    /// fixed point integer, `"98.00"` becomes `"9800"`. `EQ` thresholds are
    /// compared as strings and kept as is.
    pub fn normalize_threshold(&self, value: &str) -> Result<String, Error> {
        match self {
            Operator::Equal => Ok(value.to_string()),
            Operator::GreaterThan | Operator::LessThan => {
                let (int, frac) = split_decimal(value)?;
                Ok(format!("{int}{frac}"))
            }
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GT" => Ok(Operator::GreaterThan),
            "LT" => Ok(Operator::LessThan),
            "EQ" => Ok(Operator::Equal),
            other => Err(Error::policy().with_msg(format!("unsupported operator {other}"))),
        }
    }
}

fn split_decimal(value: &str) -> Result<(&str, &str), Error> {
    let invalid = || Error::policy().with_msg(format!("{value} is not a decimal number"));

    let (int, frac) = value.split_once('.').ok_or_else(invalid)?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(int) || !digits(frac) {
        return Err(invalid());
    }

    Ok((int, frac))
}

/// Fixed point value of a decimal with `scale` fractional digits.
fn fixed_point(value: &str, scale: usize) -> Result<u128, Error> {
    let (int, frac) = split_decimal(value)?;
    let digits = format!("{int}{frac:0<scale$}");
    let fixed: u128 = digits.parse().map_err(|e| {
        Error::policy()
            .with_msg(format!("{value} is out of range"))
            .with_source(e)
    })?;
    if fixed >> COMPARE_MAX_BIT_LEN != 0 {
        return Err(Error::policy().with_msg(format!(
            "{value} exceeds {COMPARE_MAX_BIT_LEN} bits"
        )));
    }
    Ok(fixed)
}

/// A policy ready to be applied to a session.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    key_value: Regex,
    value_regex: Regex,
    key_prefix: Regex,
    host_header: Regex,
    request_line: Regex,
    pattern: String,
    host: String,
    endpoint: String,
    operator: Operator,
    threshold: String,
    constraint_value: String,
}

impl CompiledPolicy {
    /// Returns the key/value pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the host of the API.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the path of the API, without the leading `/`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Returns the normalized threshold.
    pub fn threshold(&self) -> &str {
        &self.threshold
    }

    /// Returns the bit length the circuit compares values with.
    pub fn compare_max_bit_len(&self) -> usize {
        COMPARE_MAX_BIT_LEN
    }

    /// Finds the first key/value match in `plaintext`.
    ///
    /// Returns `None` if the pattern does not match, or if its match holds no
    /// decimal value.
    pub fn locate(&self, plaintext: &[u8]) -> Option<Location> {
        let kv = self.key_value.find(plaintext)?;
        let value = self.value_regex.find(kv.as_bytes())?;
        let unquoted = &kv.as_bytes()[value.start() + 1..value.end() - 1];
        let dot_position = unquoted.iter().position(|&b| b == b'.')?;

        Some(Location {
            start: kv.start(),
            end: kv.end(),
            value_start: value.start(),
            value_end: value.end(),
            dot_position,
        })
    }

    /// Returns `true` if `prefix`, the bytes of a match up to and including
    /// the opening quote of its value, matches the key part of the pattern.
    pub fn matches_key_prefix(&self, prefix: &[u8]) -> bool {
        self.key_prefix.is_match(prefix)
    }

    /// Returns `true` if `request` is an HTTP request for the API's path
    /// with a Host header naming the API's host.
    pub fn request_targets_api(&self, request: &[u8]) -> bool {
        self.request_line.is_match(request) && self.host_header.is_match(request)
    }

    /// Evaluates the constraint for a located value.
    pub fn evaluate(&self, value: &str) -> Result<bool, Error> {
        let ordering = || -> Result<std::cmp::Ordering, Error> {
            let (_, value_frac) = split_decimal(value)?;
            let (_, threshold_frac) = split_decimal(&self.constraint_value)?;
            let scale = value_frac.len().max(threshold_frac.len());

            Ok(fixed_point(value, scale)?.cmp(&fixed_point(&self.constraint_value, scale)?))
        };

        Ok(match self.operator {
            Operator::GreaterThan => ordering()?.is_gt(),
            Operator::LessThan => ordering()?.is_lt(),
            Operator::Equal => value == self.constraint_value,
        })
    }
}

/// Position of a key/value match in a record's plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Start of the match.
    pub start: usize,
    /// End of the match, exclusive.
    pub end: usize,
    /// Start of the quoted value, relative to the match.
    pub value_start: usize,
    /// End of the quoted value, relative to the match and exclusive.
    pub value_end: usize,
    /// Index of the decimal point in the unquoted value.
    pub dot_position: usize,
}

impl Location {
    /// Index of the first block holding the match.
    pub fn start_block_idx(&self) -> usize {
        self.start / BLOCK_LEN
    }

    /// Index one past the last block holding the match.
    pub fn end_block_idx(&self) -> usize {
        self.end.div_ceil(BLOCK_LEN)
    }

    /// Byte range of the blocks holding the match.
    pub fn block_range(&self) -> Range<usize> {
        self.start_block_idx() * BLOCK_LEN..self.end_block_idx() * BLOCK_LEN
    }

    /// Offset of the match in its first block.
    pub fn offset_key_value_pattern_start(&self) -> usize {
        self.start - self.start_block_idx() * BLOCK_LEN
    }

    /// Offset of the unquoted value from the start of the first block.
    pub fn offset_value_start(&self) -> usize {
        self.offset_key_value_pattern_start() + self.value_start + 1
    }

    /// Length of the match.
    pub fn key_value_pattern_length(&self) -> usize {
        self.end - self.start
    }

    /// Length of the unquoted value.
    pub fn value_length(&self) -> usize {
        self.value_end - self.value_start - 2
    }

    /// Returns the matched bytes.
    pub fn key_value_pair<'a>(&self, plaintext: &'a [u8]) -> &'a [u8] {
        &plaintext[self.start..self.end]
    }

    /// Returns the match up to and including the opening quote of the value.
    pub fn key_value_start_pattern<'a>(&self, plaintext: &'a [u8]) -> &'a [u8] {
        &plaintext[self.start..self.start + self.value_start + 1]
    }

    /// Returns the unquoted value.
    pub fn value<'a>(&self, plaintext: &'a [u8]) -> &'a [u8] {
        &plaintext[self.start + self.value_start + 1..self.start + self.value_end - 1]
    }
}

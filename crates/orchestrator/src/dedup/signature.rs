//! Record fingerprints used by the three dedup layers.

use collect_core::{RawRecord, RecordSignatures};
use sha2::{Digest, Sha256};
use url::Url;

const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "igshid", "mc_cid", "mc_eid", "ref", "ref_src"];

pub fn compute(platform: &str, raw: &RawRecord, shingle_size: usize) -> RecordSignatures {
    let content_hash = content_hash(&raw.text);
    RecordSignatures {
        identity_hash: identity_hash(platform, raw, &content_hash),
        simhash: simhash(&raw.text, shingle_size),
        content_hash,
    }
}

/// Lowercased words with punctuation stripped, joined by single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(normalize_text(text).as_bytes()))
}

/// Identity of a record within its platform: the native id when present,
/// else the canonical URL, else the content itself.
pub fn identity_hash(platform: &str, raw: &RawRecord, content_hash: &str) -> String {
    let key = match (
        raw.platform_id.as_deref().map(str::trim).filter(|id| !id.is_empty()),
        raw.url.as_deref().and_then(canonical_url),
    ) {
        (Some(id), _) => format!("id:{id}"),
        (None, Some(url)) => format!("url:{url}"),
        (None, None) => format!("content:{content_hash}"),
    };

    let mut hasher = Sha256::new();
    hasher.update(platform.as_bytes());
    hasher.update(b"\n");
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonical form of a URL for identity comparison. `None` when unparseable.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);

    if let Some(host) = url.host_str().map(str::to_string) {
        if let Some(bare) = host.strip_prefix("www.") {
            url.set_host(Some(bare)).ok()?;
        }
    }

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// 64-bit FNV-1a followed by a murmur3 finalizer.
fn shingle_hash(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut h = OFFSET;
    for b in s.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(PRIME);
    }

    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^ (h >> 33)
}

/// Similarity fingerprint over word shingles of the normalized text.
/// Texts shorter than one shingle hash as a single shingle; empty text is 0.
pub fn simhash(text: &str, shingle_size: usize) -> u64 {
    let normalized = normalize_text(text);
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    if words.is_empty() {
        return 0;
    }

    let size = shingle_size.max(1).min(words.len());
    let mut weights = [0i64; 64];
    for shingle in words.windows(size) {
        let h = shingle_hash(&shingle.join(" "));
        for (bit, weight) in weights.iter_mut().enumerate() {
            if h >> bit & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }

    weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0)
        .fold(0u64, |acc, (bit, _)| acc | 1u64 << bit)
}

pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

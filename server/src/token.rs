//! Opaque public tokens for numeric game ids
//!
//! Tokens are hashids-style: a lottery character followed by the id written in
//! an alphabet shuffled by the lottery character and a server secret. Decoding
//! re-encodes the result and rejects anything that does not round-trip, so
//! hand-edited tokens resolve to "no such game" rather than to a neighbour.

const ALPHABET: &str = "abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone)]
pub struct TokenCodec {
    salt: Vec<u8>,
    alphabet: Vec<u8>,
}

impl TokenCodec {
    pub fn new(salt: &str) -> Self {
        let salt = salt.as_bytes().to_vec();
        let mut alphabet = ALPHABET.as_bytes().to_vec();
        consistent_shuffle(&mut alphabet, &salt);
        Self { salt, alphabet }
    }

    pub fn encode(&self, id: u64) -> String {
        let base = self.alphabet.len() as u64;
        let lottery = self.alphabet[(id % base) as usize];
        let alphabet = self.round_alphabet(lottery);

        let mut digits = Vec::new();
        let mut rest = id;
        loop {
            digits.push(alphabet[(rest % base) as usize]);
            rest /= base;
            if rest == 0 {
                break;
            }
        }

        let mut token = String::with_capacity(digits.len() + 1);
        token.push(lottery as char);
        token.extend(digits.iter().rev().map(|&digit| digit as char));
        token
    }

    /// Returns `None` for anything that is not a token this codec produced.
    pub fn decode(&self, token: &str) -> Option<u64> {
        let (&lottery, digits) = token.as_bytes().split_first()?;
        if digits.is_empty() || !self.alphabet.contains(&lottery) {
            return None;
        }

        let base = self.alphabet.len() as u64;
        let alphabet = self.round_alphabet(lottery);

        let mut id: u64 = 0;
        for digit in digits {
            let value = alphabet.iter().position(|c| c == digit)? as u64;
            id = id.checked_mul(base)?.checked_add(value)?;
        }

        (self.encode(id) == token).then_some(id)
    }

    fn round_alphabet(&self, lottery: u8) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.salt.len() + 1);
        key.push(lottery);
        key.extend_from_slice(&self.salt);

        let mut alphabet = self.alphabet.clone();
        consistent_shuffle(&mut alphabet, &key);
        alphabet
    }
}

/// Deterministic Fisher-Yates variant driven by the salt bytes.
fn consistent_shuffle(alphabet: &mut [u8], salt: &[u8]) {
    if salt.is_empty() {
        return;
    }

    let mut v = 0;
    let mut p = 0;
    for i in (1..alphabet.len()).rev() {
        v %= salt.len();
        let n = salt[v] as usize;
        p += n;
        let j = (n + v + p) % i;
        alphabet.swap(i, j);
        v += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_decode_to_their_id() {
        let codec = TokenCodec::new("kakadoo");
        for id in (0..2_000).chain([u32::MAX as u64, u64::MAX]) {
            let token = codec.encode(id);
            assert_eq!(codec.decode(&token), Some(id), "token {}", token);
        }
    }

    #[test]
    fn test_salt_changes_tokens() {
        let a = TokenCodec::new("one secret");
        let b = TokenCodec::new("another secret");

        let differing = (1..100).filter(|id| a.encode(*id) != b.encode(*id)).count();
        assert!(differing > 50);
        assert_eq!(a.encode(42), TokenCodec::new("one secret").encode(42));
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let mut alphabet = ALPHABET.as_bytes().to_vec();
        consistent_shuffle(&mut alphabet, b"salt");
        assert_ne!(alphabet, ALPHABET.as_bytes());

        let mut sorted = alphabet.clone();
        sorted.sort_unstable();
        let mut expected = ALPHABET.as_bytes().to_vec();
        expected.sort_unstable();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_garbage_is_absent() {
        let codec = TokenCodec::new("kakadoo");
        assert_eq!(codec.decode(""), None);
        assert_eq!(codec.decode("a"), None);
        assert_eq!(codec.decode("0000"), None);
        assert_eq!(codec.decode("ab/c"), None);
        assert_eq!(codec.decode("héllo"), None);
        assert_eq!(codec.decode(&"z".repeat(64)), None);
    }

    #[test]
    fn test_padded_token_is_rejected() {
        let codec = TokenCodec::new("kakadoo");
        let token = codec.encode(1234);
        let lottery = token.as_bytes()[0];
        let zero = codec.round_alphabet(lottery)[0] as char;

        let mut padded = String::new();
        padded.push(lottery as char);
        padded.push(zero);
        padded.push_str(&token[1..]);

        assert_eq!(codec.decode(&padded), None);
    }
}

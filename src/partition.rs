//! Partition key generation.

use rand::Rng;
use std::fmt;

/// Source of partition keys for written records.
///
/// Keys only steer records onto shards; they carry no meaning.
pub trait PartitionKeyGenerator: Send + Sync + fmt::Debug {
    fn next_key(&self) -> String;
}

/// UUID-v4 shaped keys from a non-cryptographic RNG.
///
/// Good enough to spread load across shards, not for anything
/// security-sensitive.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomPartitionKeys;

const TEMPLATE: &[u8; 36] = b"xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx";
const HEX: &[u8; 16] = b"0123456789abcdef";

impl PartitionKeyGenerator for RandomPartitionKeys {
    fn next_key(&self) -> String {
        let mut rng = rand::thread_rng();
        TEMPLATE
            .iter()
            .map(|&c| match c {
                b'x' => HEX[rng.gen_range(0..16)] as char,
                b'y' => HEX[rng.gen_range(8..12)] as char,
                other => other as char,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_uuid_v4_shaped(key: &str) -> bool {
        let bytes = key.as_bytes();
        bytes.len() == 36
            && bytes.iter().enumerate().all(|(i, &b)| match i {
                8 | 13 | 18 | 23 => b == b'-',
                14 => b == b'4',
                19 => matches!(b, b'8' | b'9' | b'a' | b'b'),
                _ => b.is_ascii_digit() || (b'a'..=b'f').contains(&b),
            })
    }

    #[test]
    fn test_keys_are_uuid_v4_shaped() {
        let keys = RandomPartitionKeys;
        for _ in 0..1000 {
            let key = keys.next_key();
            assert!(is_uuid_v4_shaped(&key), "bad key {key}");
        }
    }

    #[test]
    fn test_keys_do_not_repeat() {
        let keys = RandomPartitionKeys;
        let seen: HashSet<String> = (0..10_000).map(|_| keys.next_key()).collect();
        assert_eq!(seen.len(), 10_000);
    }
}

//! Readable league join codes.

use rand::Rng;

// Ambiguous characters (0/O, 1/I, etc.) are excluded so codes survive
// being read aloud.
const ALPHA: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const NUMS: &[u8] = b"23456789";

/// Generate a short join code of the form `NFL-XXX`, where each X is
/// drawn from the unambiguous alphanumeric set.
pub fn generate_league_code() -> String {
    let mut rng = rand::thread_rng();
    let pool: Vec<u8> = ALPHA.iter().chain(NUMS.iter()).copied().collect();
    let suffix: String = (0..3)
        .map(|_| pool[rng.gen_range(0..pool.len())] as char)
        .collect();
    format!("NFL-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_has_expected_shape() {
        for _ in 0..50 {
            let code = generate_league_code();
            assert_eq!(code.len(), 7);
            assert!(code.starts_with("NFL-"));
            for ch in code[4..].chars() {
                assert!(
                    ALPHA.contains(&(ch as u8)) || NUMS.contains(&(ch as u8)),
                    "unexpected character {ch:?} in {code}"
                );
            }
        }
    }

    #[test]
    fn code_excludes_ambiguous_characters() {
        for _ in 0..200 {
            let code = generate_league_code();
            for banned in ['0', 'O', '1', 'I'] {
                assert!(!code[4..].contains(banned), "{code} contains {banned}");
            }
        }
    }
}

use sha1::{Digest, Sha1};

pub fn sha1_1(bytes: impl AsRef<[u8]>) -> [u8; 20] {
    Sha1::digest(bytes).into()
}

pub fn sha1_2(bytes1: impl AsRef<[u8]>, bytes2: impl AsRef<[u8]>) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(bytes1.as_ref());
    hasher.update(bytes2.as_ref());
    hasher.finalize().into()
}

pub fn xor<T, U>(mut left: T, right: U) -> T
where
    T: AsMut<[u8]>,
    U: AsRef<[u8]>,
{
    left.as_mut()
        .iter_mut()
        .zip(right.as_ref().iter())
        .for_each(|(l, r)| *l ^= r);
    left
}

/// Stored form of a `mysql_native_password` secret:
/// `*` followed by `UPPER(HEX(SHA1(SHA1(password))))`. Empty stays empty.
pub fn hash_password(password: &str) -> String {
    if password.is_empty() {
        return String::new();
    }
    let h2 = sha1_1(sha1_1(password.as_bytes()));
    format!("*{}", hex::encode_upper(h2))
}

/// What a client sends for `password` against `salt`:
/// `SHA1(password) XOR SHA1(salt || SHA1(SHA1(password)))`.
pub fn scramble_response(salt: &[u8], password: &str) -> [u8; 20] {
    let h1 = sha1_1(password.as_bytes());
    let h2 = sha1_1(h1);
    xor(h1, sha1_2(salt, h2))
}

/// Verify a client response against the stored form. The server cannot
/// recover SHA1(password); instead it unmasks the response with
/// `SHA1(salt || H2)` and checks that the hash of the candidate matches H2.
/// The final digest comparison runs in constant time.
pub fn verify(salt: &[u8], stored: &str, response: &[u8]) -> bool {
    if stored.is_empty() {
        return response.is_empty();
    }
    let hex_digest = match stored.strip_prefix('*') {
        Some(hex_digest) if hex_digest.len() == 40 => hex_digest,
        _ => return false,
    };
    let h2: [u8; 20] = match hex::decode(hex_digest) {
        Ok(bytes) => match bytes.try_into() {
            Ok(arr) => arr,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    if response.len() != 20 {
        return false;
    }

    let x = sha1_2(salt, h2);
    let mut candidate_h1 = [0u8; 20];
    candidate_h1.copy_from_slice(response);
    let candidate_h1 = xor(candidate_h1, x);
    constant_time_eq(&sha1_1(candidate_h1), &h2)
}

fn constant_time_eq(a: &[u8; 20], b: &[u8; 20]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_form_matches_known_vector() {
        // SELECT PASSWORD('password') on a real server
        assert_eq!(
            hash_password("password"),
            "*2470C0C06DEE42FD1618BB99005ADCA2EC9D1E19"
        );
        assert_eq!(hash_password(""), "");
    }

    #[test]
    fn challenge_response_round_trip() {
        let salt = b"abcdefghijklmnopqrst";
        let stored = hash_password("sekret");
        let response = scramble_response(salt, "sekret");
        assert!(verify(salt, &stored, &response));
    }

    #[test]
    fn wrong_password_fails() {
        let salt = b"abcdefghijklmnopqrst";
        let stored = hash_password("sekret");
        let response = scramble_response(salt, "wrong");
        assert!(!verify(salt, &stored, &response));
    }

    #[test]
    fn empty_stored_form_means_no_password() {
        let salt = b"abcdefghijklmnopqrst";
        assert!(verify(salt, "", b""));
        assert!(!verify(salt, "", &scramble_response(salt, "x")));
    }

    #[test]
    fn malformed_stored_form_is_rejected() {
        let salt = b"abcdefghijklmnopqrst";
        let response = scramble_response(salt, "pw");
        assert!(!verify(salt, "not-a-hash", &response));
        assert!(!verify(salt, "*zz", &response));
    }
}

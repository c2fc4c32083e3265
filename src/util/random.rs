use rand::Rng;

const URL_SAFE_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Returns 128 random bits as 32 lowercase hex characters.
pub fn random_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Returns `length` characters drawn from the RFC 7636 unreserved set.
pub fn random_url_safe(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..URL_SAFE_CHARSET.len());
            URL_SAFE_CHARSET[idx] as char
        })
        .collect()
}

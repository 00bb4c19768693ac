use axum::body::Bytes;
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::de::DeserializeOwned;

use crate::error::AppError;

pub fn parse_json<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(bytes).map_err(|_| AppError::MalformedPayload)
}

pub fn random_secret(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize)]
    struct Payload {
        email: String,
    }

    #[test]
    fn test_parse_json() {
        let payload: Payload = parse_json(&Bytes::from_static(br#"{"email":"a@b.com"}"#)).unwrap();
        assert_eq!(payload.email, "a@b.com");
    }

    #[test]
    fn test_parse_json_malformed() {
        let result: Result<Payload, _> = parse_json(&Bytes::from_static(b"{not json"));
        assert!(matches!(result, Err(AppError::MalformedPayload)));
    }

    #[test]
    fn test_random_secret() {
        let first = random_secret(32);
        let second = random_secret(32);

        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first, second);
    }
}

//! Password-reset OTPs.
//!
//! Six-digit codes, stored as bcrypt hashes next to a 10-minute expiry.
//! Only the hash ever touches the database; the clear OTP goes out by mail.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Minutes an OTP stays valid.
pub const OTP_TTL_MINUTES: i64 = 10;

/// Generate a six-digit OTP, zero-padded.
pub fn generate_otp() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000))
}

/// Hash an OTP for storage.
pub fn hash_otp(otp: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(otp, bcrypt::DEFAULT_COST)
}

/// Check a submitted OTP against the stored hash.
pub fn verify_otp(otp: &str, otp_hash: &str) -> bool {
    bcrypt::verify(otp, otp_hash).unwrap_or(false)
}

/// Expiry timestamp for an OTP issued now.
pub fn expiry_from_now() -> DateTime<Utc> {
    Utc::now() + Duration::minutes(OTP_TTL_MINUTES)
}

/// Whether a stored expiry is still in the future.
pub fn is_expired(expires_at: DateTime<Utc>) -> bool {
    expires_at <= Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_is_six_digits() {
        for _ in 0..32 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_otp_hash_round_trip() {
        let otp = generate_otp();
        let hash = hash_otp(&otp).unwrap();
        assert!(verify_otp(&otp, &hash));
        assert!(!verify_otp("000001", &hash) || otp == "000001");
        assert!(!verify_otp(&otp, "not-a-hash"));
    }

    #[test]
    fn test_expiry() {
        let future = expiry_from_now();
        assert!(!is_expired(future));
        assert!(is_expired(Utc::now() - Duration::minutes(1)));
    }
}

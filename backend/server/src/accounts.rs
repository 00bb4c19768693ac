//! # Accounts
//!
//! Regular users and superusers are created from the same validated
//! [`Credentials`], so both account kinds share one set of input rules.
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString, rand_core::OsRng},
};
use thiserror::Error;

use crate::store::{Collection, Record};

pub const MIN_PASSWORD_LEN: usize = 10;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("email is required")]
    MissingEmail,

    #[error("password is required")]
    MissingPassword,

    #[error("passwordConfirm is required")]
    MissingPasswordConfirm,

    #[error("password and passwordConfirm do not match")]
    PasswordMismatch,

    #[error("password must be at least {} characters", MIN_PASSWORD_LEN)]
    PasswordTooShort,
}

impl ValidationError {
    /// Request field the error refers to.
    pub fn field(self) -> &'static str {
        match self {
            ValidationError::MissingEmail => "email",
            ValidationError::MissingPassword
            | ValidationError::PasswordMismatch
            | ValidationError::PasswordTooShort => "password",
            ValidationError::MissingPasswordConfirm => "passwordConfirm",
        }
    }
}

/// Email and password that passed every input check.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// Checks run in order and the first failure is returned.
    pub fn validate(
        email: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<Self, ValidationError> {
        if email.is_empty() {
            return Err(ValidationError::MissingEmail);
        }
        if password.is_empty() {
            return Err(ValidationError::MissingPassword);
        }
        if password_confirm.is_empty() {
            return Err(ValidationError::MissingPasswordConfirm);
        }
        if password != password_confirm {
            return Err(ValidationError::PasswordMismatch);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort);
        }

        Ok(Self {
            email: email.to_string(),
            password: password.to_string(),
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    Normal,
    Elevated,
}

impl AccountKind {
    pub fn collection(self) -> Collection {
        match self {
            AccountKind::Normal => Collection::Users,
            AccountKind::Elevated => Collection::Superusers,
        }
    }
}

pub struct ProvisionedIdentity {
    pub kind: AccountKind,
    pub email: String,
    pub password_hash: String,
}

impl ProvisionedIdentity {
    pub fn new(
        kind: AccountKind,
        credentials: &Credentials,
        hasher: &Argon2<'_>,
    ) -> Result<Self, password_hash::Error> {
        Ok(Self {
            kind,
            email: credentials.email.clone(),
            password_hash: hash_password(hasher, &credentials.password)?,
        })
    }

    pub fn into_record(self) -> Record {
        let mut record = Record::new(self.kind.collection(), &self.email, self.password_hash);

        if self.kind == AccountKind::Normal {
            record.email_visible = false;
            record.verified = true;
        }

        record
    }
}

pub fn hash_password(hasher: &Argon2<'_>, password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);

    Ok(hasher.hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Parameters are read from the stored hash, so any argon2 cost verifies.
pub fn verify_hash(password_hash: &str, candidate: &str) -> bool {
    PasswordHash::new(password_hash)
        .and_then(|hash| Argon2::default().verify_password(candidate.as_bytes(), &hash))
        .is_ok()
}

pub fn verify_password(record: &Record, candidate: &str) -> bool {
    verify_hash(&record.password_hash, candidate)
}

#[cfg(test)]
pub(crate) fn cheap_hasher() -> Argon2<'static> {
    use argon2::{Algorithm, Params, Version};

    Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(8, 1, 1, None).unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(email: &str, password: &str, confirm: &str) -> Result<Credentials, ValidationError> {
        Credentials::validate(email, password, confirm)
    }

    #[test]
    fn test_first_failing_check_wins() {
        assert_eq!(validate("", "", "").err(), Some(ValidationError::MissingEmail));
        assert_eq!(
            validate("a@b.com", "", "").err(),
            Some(ValidationError::MissingPassword)
        );
        assert_eq!(
            validate("a@b.com", "short", "").err(),
            Some(ValidationError::MissingPasswordConfirm)
        );
        assert_eq!(
            validate("a@b.com", "short", "other").err(),
            Some(ValidationError::PasswordMismatch)
        );
        assert_eq!(
            validate("a@b.com", "short", "short").err(),
            Some(ValidationError::PasswordTooShort)
        );
    }

    #[test]
    fn test_password_length_boundary() {
        assert_eq!(
            validate("a@b.com", "abcdefghi", "abcdefghi").err(),
            Some(ValidationError::PasswordTooShort)
        );
        assert!(validate("a@b.com", "abcdefghij", "abcdefghij").is_ok());
    }

    #[test]
    fn test_length_counts_characters() {
        let password = "ééééééééé";
        assert_eq!(password.chars().count(), 9);
        assert_eq!(
            validate("a@b.com", password, password).err(),
            Some(ValidationError::PasswordTooShort)
        );
    }

    #[test]
    fn test_error_fields() {
        assert_eq!(ValidationError::MissingEmail.field(), "email");
        assert_eq!(ValidationError::MissingPasswordConfirm.field(), "passwordConfirm");
        assert_eq!(ValidationError::PasswordTooShort.field(), "password");
    }

    #[test]
    fn test_identity_records() {
        let hasher = cheap_hasher();
        let credentials = validate("a@b.com", "abcdefghij", "abcdefghij").unwrap();

        let user = ProvisionedIdentity::new(AccountKind::Normal, &credentials, &hasher)
            .unwrap()
            .into_record();
        let superuser = ProvisionedIdentity::new(AccountKind::Elevated, &credentials, &hasher)
            .unwrap()
            .into_record();

        assert_eq!(user.collection, Collection::Users);
        assert!(user.verified);
        assert!(!user.email_visible);
        assert_eq!(superuser.collection, Collection::Superusers);
        assert_eq!(user.email, superuser.email);
        assert_ne!(user.id, superuser.id);
        assert_ne!(user.password_hash, superuser.password_hash);

        assert!(verify_password(&user, "abcdefghij"));
        assert!(verify_password(&superuser, "abcdefghij"));
        assert!(!verify_password(&user, "abcdefghik"));
    }
}

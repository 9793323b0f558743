use chrono::Duration;

use serde::{Deserialize, Serialize};

use uuid::Uuid;

use super::{SigningKey, Token, TokenResult};

/// Claim allowing the bearer to withdraw one registration entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub offering_id: Uuid,
    pub entry_id: Uuid,
}

impl Withdrawal {
    pub fn new(offering_id: Uuid, entry_id: Uuid) -> Self {
        Self {
            offering_id,
            entry_id,
        }
    }

    pub fn sign(&self, key: &SigningKey, valid_for: Duration) -> TokenResult<Token> {
        Token::builder(self).expires_in(valid_for).sign(key.as_ref())
    }

    pub fn verify(key: &SigningKey, token: &str) -> TokenResult<Self> {
        token.parse::<Token>()?.verify(key.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use claims::{assert_err, assert_ok_eq};
    use secrecy::Secret;

    use super::*;

    fn signing_key(secret: &str) -> SigningKey {
        SigningKey::new(&Secret::new(secret.into())).unwrap()
    }

    #[test]
    fn withdrawal_claims_survive_signing() {
        let key = signing_key("withdrawal_secret");
        let claim = Withdrawal::new(Uuid::new_v4(), Uuid::new_v4());

        let token = claim.sign(&key, Duration::days(30)).unwrap();

        assert_ok_eq!(Withdrawal::verify(&key, token.as_ref()), claim);
    }

    #[test]
    fn withdrawal_claims_need_the_same_key() {
        let claim = Withdrawal::new(Uuid::new_v4(), Uuid::new_v4());
        let token = claim.sign(&signing_key("one"), Duration::days(30)).unwrap();

        assert_err!(Withdrawal::verify(&signing_key("two"), token.as_ref()));
    }
}

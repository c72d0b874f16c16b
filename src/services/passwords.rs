use rand::Rng;

const TEMP_PASSWORD_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%";

/// Random one-time password handed to an administrator for a new or reset account.
#[must_use]
pub fn generate_temp_password(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..TEMP_PASSWORD_CHARSET.len());
            char::from(TEMP_PASSWORD_CHARSET[idx])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_password_shape() {
        let password = generate_temp_password(12);
        assert_eq!(password.chars().count(), 12);
        assert!(
            password
                .bytes()
                .all(|b| TEMP_PASSWORD_CHARSET.contains(&b))
        );
    }

    #[test]
    fn test_temp_passwords_differ() {
        assert_ne!(generate_temp_password(12), generate_temp_password(12));
    }
}

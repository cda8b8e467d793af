//! 密码处理

use bcrypt::{DEFAULT_COST, hash, verify};

use crate::error::AdminError;

const MIN_PASSWORD_LEN: usize = 8;

/// bcrypt 哈希
pub fn hash_password(password: &str) -> Result<String, AdminError> {
    hash(password, DEFAULT_COST).map_err(|e| AdminError::Internal(format!("密码哈希失败: {}", e)))
}

/// 比较明文密码与存储的哈希值
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AdminError> {
    verify(password, hash).map_err(|e| AdminError::Internal(format!("密码验证失败: {}", e)))
}

/// 新密码至少 8 位，且同时包含字母和数字
pub fn validate_password_strength(password: &str) -> Result<(), AdminError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AdminError::Validation(format!(
            "密码长度不能少于 {MIN_PASSWORD_LEN} 位"
        )));
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_letter && has_digit) {
        return Err(AdminError::Validation("密码必须同时包含字母和数字".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash_password("s3cret-pass").unwrap();
        assert!(verify_password("s3cret-pass", &hashed).unwrap());
        assert!(!verify_password("wrong_password", &hashed).unwrap());
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("abc12345").is_ok());
        assert!(validate_password_strength("short1").is_err());
        assert!(validate_password_strength("lettersonly").is_err());
        assert!(validate_password_strength("1234567890").is_err());
    }
}

//! JWT Token 处理
//!
//! Token 中携带用户 ID、角色与显示名，请求处理时直接还原为 [`Actor`]，不再回查数据库。

use chrono::{Duration, Utc};
use crm_core::models::{Actor, User, UserRole};
use crm_shared::config::AuthConfig;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::AdminError;

/// Token 载荷，`sub` 为用户 ID
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub name: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    /// 还原当前请求的操作者
    pub fn actor(&self) -> Result<Actor, AdminError> {
        let user_id = self
            .sub
            .parse()
            .map_err(|_| AdminError::Unauthorized("无效的 Token 主体".to_string()))?;
        Ok(Actor {
            user_id,
            role: self.role,
            name: self.name.clone(),
        })
    }
}

/// 签发与校验 HS256 Token
#[derive(Clone)]
pub struct JwtManager {
    issuer: String,
    ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            issuer: config.jwt_issuer.clone(),
            ttl: Duration::seconds(config.jwt_expires_secs),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// 为用户签发 Token，返回 (token, 过期时间戳)
    pub fn generate_token(&self, user: &User) -> Result<(String, i64), AdminError> {
        let issued_at = Utc::now();
        let expires_at = (issued_at + self.ttl).timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            name: user.display_name.clone(),
            role: user.role,
            iat: issued_at.timestamp(),
            exp: expires_at,
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AdminError::Internal(format!("签发 Token 失败: {e}")))?;
        Ok((token, expires_at))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AdminError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let message = match e.kind() {
                    ErrorKind::ExpiredSignature => "Token 已过期",
                    ErrorKind::InvalidIssuer => "Token 签发者不匹配",
                    _ => "无效的 Token",
                };
                AdminError::Unauthorized(message.to_string())
            })
    }

    pub fn expires_in_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }
}

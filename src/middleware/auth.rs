use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Candidate id.
    pub sub: String,
    pub exp: usize,
}

/// The authenticated candidate, inserted into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateId(pub Uuid);

#[derive(Clone)]
pub struct CandidateAuth {
    key: DecodingKey,
    validation: Validation,
}

impl CandidateAuth {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Resolves the candidate from an `Authorization: Bearer` header. The
    /// error is the machine-readable reason sent back with the 401.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<CandidateId, &'static str> {
        let auth_header = headers.get(AUTHORIZATION).ok_or("missing_authorization")?;
        let auth_str = auth_header.to_str().map_err(|_| "bad_authorization")?;
        let token = auth_str.strip_prefix("Bearer ").ok_or("unsupported_scheme")?;

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|_| "invalid_token")?;
        let candidate_id = Uuid::parse_str(&data.claims.sub).map_err(|_| "invalid_subject")?;
        Ok(CandidateId(candidate_id))
    }
}

pub async fn require_candidate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match state.auth.authenticate(req.headers()) {
        Ok(candidate) => {
            req.extensions_mut().insert(candidate);
            next.run(req).await
        }
        Err(reason) => {
            tracing::debug!(reason, "Rejected candidate request");
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": reason }))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "candidate-secret";

    fn token(sub: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accepts_a_valid_candidate_token() {
        let auth = CandidateAuth::new(SECRET);
        let id = Uuid::new_v4();
        let got = auth.authenticate(&headers(&format!("Bearer {}", token(&id.to_string(), 600))));
        assert_eq!(got, Ok(CandidateId(id)));
    }

    #[test]
    fn rejection_reasons() {
        let auth = CandidateAuth::new(SECRET);
        assert_eq!(auth.authenticate(&HeaderMap::new()), Err("missing_authorization"));
        assert_eq!(auth.authenticate(&headers("Basic abc")), Err("unsupported_scheme"));
        assert_eq!(
            auth.authenticate(&headers(&format!("Bearer {}", token(&Uuid::new_v4().to_string(), -600)))),
            Err("invalid_token")
        );
        assert_eq!(
            auth.authenticate(&headers(&format!("Bearer {}", token("not-a-uuid", 600)))),
            Err("invalid_subject")
        );
        let foreign = CandidateAuth::new("other-secret");
        assert_eq!(
            foreign.authenticate(&headers(&format!("Bearer {}", token(&Uuid::new_v4().to_string(), 600)))),
            Err("invalid_token")
        );
    }
}

//! ABOUTME: Session middleware: LoadUser attaches the JWT user, RequireAuth enforces it
//! ABOUTME: Reads the Bearer header first, then the auth_token cookie

use crate::{auth::JwtAuth, auth::AUTH_COOKIE, error::ApiError, models::Claims, AppState};
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web, Error, HttpMessage, HttpRequest, HttpResponse, ResponseError,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use sb_db::Role;
use std::rc::Rc;
use std::str::FromStr;
use tracing::{debug, warn};

/// Signed-in user, taken from verified JWT claims
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    fn from_claims(claims: Claims) -> Option<Self> {
        let role = Role::from_str(&claims.role).ok()?;
        Some(Self {
            id: claims.sub,
            email: claims.email,
            role,
        })
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

/// Token from `Authorization: Bearer` or the session cookie
fn extract_token(req: &ServiceRequest) -> Option<String> {
    if let Some(token) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }
    req.cookie(AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Attaches `AuthUser` when a valid token is present; never rejects
pub struct LoadUser;

impl<S, B> Transform<S, ServiceRequest> for LoadUser
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoadUserMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoadUserMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct LoadUserMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoadUserMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            if let Some(token) = extract_token(&req) {
                let secret = req
                    .app_data::<web::Data<AppState>>()
                    .map(|state| state.config.security.jwt_secret.clone());

                if let Some(secret) = secret {
                    match JwtAuth::verify_token(&token, &secret) {
                        Ok(claims) => match AuthUser::from_claims(claims) {
                            Some(user) => {
                                debug!(user_id = %user.id, "Session loaded");
                                req.extensions_mut().insert(user);
                            }
                            None => warn!("Token carries an unknown role"),
                        },
                        Err(e) => debug!("Ignoring invalid session token: {}", e),
                    }
                }
            }

            service.call(req).await
        })
    }
}

/// Rejects requests without an `AuthUser`: 401 problem+json, or a redirect for pages
pub struct RequireAuth {
    redirect_to: Option<&'static str>,
}

impl RequireAuth {
    /// JSON flavour answering 401
    pub fn new() -> Self {
        Self { redirect_to: None }
    }

    /// Page flavour sending visitors to `path`
    pub fn redirect_to(path: &'static str) -> Self {
        Self {
            redirect_to: Some(path),
        }
    }
}

impl Default for RequireAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAuthMiddleware {
            service: Rc::new(service),
            redirect_to: self.redirect_to,
        }))
    }
}

pub struct RequireAuthMiddleware<S> {
    service: Rc<S>,
    redirect_to: Option<&'static str>,
}

impl<S, B> Service<ServiceRequest> for RequireAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let redirect_to = self.redirect_to;

        Box::pin(async move {
            if req.extensions().get::<AuthUser>().is_some() {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            debug!(path = %req.path(), "Rejecting anonymous request");
            let response = rejection(redirect_to, ApiError::unauthorized("Authentication required"));
            let (req, _) = req.into_parts();
            Ok(ServiceResponse::new(req, response).map_into_right_body())
        })
    }
}

/// Redirect for page scopes, problem+json otherwise
pub(crate) fn rejection(redirect_to: Option<&str>, problem: ApiError) -> HttpResponse {
    match redirect_to {
        Some(path) => HttpResponse::Found()
            .insert_header((header::LOCATION, path))
            .finish(),
        None => problem.error_response(),
    }
}

/// Helper function to extract authenticated user from HTTP request
pub fn get_http_auth_user(req: &HttpRequest) -> Option<AuthUser> {
    req.extensions().get::<AuthUser>().cloned()
}

/// Extractor form of [`get_http_auth_user`]; fails with 401 when anonymous
impl actix_web::FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            get_http_auth_user(req)
                .ok_or_else(|| ApiError::unauthorized("Authentication required")),
        )
    }
}

/// Optional session for pages that render differently when signed in
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

impl actix_web::FromRequest for MaybeUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(Ok(MaybeUser(get_http_auth_user(req))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_with_unknown_role_are_dropped() {
        let claims = Claims {
            sub: "u1".to_string(),
            email: "a@b.c".to_string(),
            role: "viewer".to_string(),
            exp: 0,
            iat: 0,
        };
        assert!(AuthUser::from_claims(claims).is_none());
    }

    #[test]
    fn test_rejection_redirects_pages() {
        let res = rejection(Some("/login"), ApiError::unauthorized("x"));
        assert_eq!(res.status(), 302);
        assert_eq!(
            res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
            Some("/login")
        );

        let res = rejection(None, ApiError::unauthorized("x"));
        assert_eq!(res.status(), 401);
    }
}

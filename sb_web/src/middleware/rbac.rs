//! ABOUTME: Role-based access control middleware for the admin and cache scopes
//! ABOUTME: JSON scopes answer 401/403, page scopes redirect to the login page

use crate::{
    error::ApiError,
    middleware::auth::{rejection, AuthUser},
};
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use sb_db::Role;
use std::rc::Rc;
use tracing::{debug, warn};

/// RBAC middleware that requires one of a set of roles
pub struct RequireRole {
    required_roles: Vec<Role>,
    redirect_to: Option<&'static str>,
}

impl RequireRole {
    pub fn new(roles: Vec<Role>) -> Self {
        Self {
            required_roles: roles,
            redirect_to: None,
        }
    }

    pub fn admin() -> Self {
        Self::new(vec![Role::Admin])
    }

    /// Admins and moderators
    pub fn staff() -> Self {
        Self::new(vec![Role::Admin, Role::Moderator])
    }

    /// Send rejected page requests to `path` instead of answering with a problem body
    pub fn redirect_to(mut self, path: &'static str) -> Self {
        self.redirect_to = Some(path);
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireRoleMiddleware {
            service: Rc::new(service),
            required_roles: self.required_roles.clone(),
            redirect_to: self.redirect_to,
        }))
    }
}

pub struct RequireRoleMiddleware<S> {
    service: Rc<S>,
    required_roles: Vec<Role>,
    redirect_to: Option<&'static str>,
}

impl<S, B> Service<ServiceRequest> for RequireRoleMiddleware<S>
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
        let required_roles = self.required_roles.clone();
        let redirect_to = self.redirect_to;

        Box::pin(async move {
            let auth_user = req.extensions().get::<AuthUser>().cloned();

            let problem = match auth_user {
                Some(user) if required_roles.contains(&user.role) => {
                    debug!(user_id = %user.id, role = %user.role, "RBAC check passed");
                    let res = service.call(req).await?;
                    return Ok(res.map_into_left_body());
                }
                Some(user) => {
                    warn!(
                        user_id = %user.id,
                        role = %user.role,
                        "RBAC check failed, required one of {:?}",
                        required_roles
                    );
                    ApiError::forbidden("Insufficient permissions")
                }
                None => ApiError::unauthorized("Authentication required"),
            };

            let response = rejection(redirect_to, problem);
            let (req, _) = req.into_parts();
            Ok(ServiceResponse::new(req, response).map_into_right_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_requirements() {
        assert_eq!(RequireRole::admin().required_roles, vec![Role::Admin]);
        assert_eq!(
            RequireRole::staff().required_roles,
            vec![Role::Admin, Role::Moderator]
        );
        assert_eq!(
            RequireRole::staff().redirect_to("/login").redirect_to,
            Some("/login")
        );
    }
}

use actix_web::{
    body::EitherBody,
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    Error, FromRequest, HttpRequest, HttpResponse,
};
use actix_session::{Session, SessionExt, SessionInsertError};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use serde::Serialize;
use std::future::{ready, Ready as StdReady};

use crate::models::{ApiResponse, User};

pub const SESSION_USER_ID: &str = "user_id";
pub const SESSION_USERNAME: &str = "username";
pub const SESSION_EMAIL: &str = "email";
pub const SESSION_USER_LEVEL: &str = "user_level";

/// The logged-in user, read from the session cookie.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub user_level: i64,
}

impl AuthenticatedUser {
    pub fn from_session(session: &Session) -> Option<Self> {
        let user_id = session.get::<i64>(SESSION_USER_ID).ok().flatten()?;
        let username = session.get::<String>(SESSION_USERNAME).ok().flatten()?;
        let email = session.get::<String>(SESSION_EMAIL).ok().flatten().unwrap_or_default();
        let user_level = session.get::<i64>(SESSION_USER_LEVEL).ok().flatten().unwrap_or_default();
        Some(AuthenticatedUser { user_id, username, email, user_level })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        match AuthenticatedUser::from_session(&req.get_session()) {
            Some(user) => ready(Ok(user)),
            None => ready(Err(actix_web::error::ErrorUnauthorized("Not logged in."))),
        }
    }
}

/// Stores the user in the session, replacing any previous login.
pub fn start_session(session: &Session, user: &User) -> Result<(), SessionInsertError> {
    session.renew();
    session.insert(SESSION_USER_ID, user.id)?;
    session.insert(SESSION_USERNAME, &user.username)?;
    session.insert(SESSION_EMAIL, &user.email)?;
    session.insert(SESSION_USER_LEVEL, user.user_level)?;
    Ok(())
}

pub fn login_guard(session: &Session) -> bool {
    session.get::<i64>(SESSION_USER_ID).unwrap_or(None).is_some()
}

fn is_read_only(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Lets reads through and answers every other method with 401 unless a user is logged in.
pub struct LoginRequiredForWrites;

impl<S, B> Transform<S, ServiceRequest> for LoginRequiredForWrites
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = LoginRequiredForWritesMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(LoginRequiredForWritesMiddleware { service })
    }
}

pub struct LoginRequiredForWritesMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for LoginRequiredForWritesMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let allowed = is_read_only(req.method()) || login_guard(&req.get_session());

        if allowed {
            let fut = self.service.call(req);
            Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            })
        } else {
            Box::pin(async move {
                log::warn!("Rejected anonymous {} {}", req.method(), req.path());
                let (http_req, _payload) = req.into_parts();
                let res = HttpResponse::Unauthorized()
                    .json(ApiResponse::failed("Login required."))
                    .map_into_right_body();
                Ok(ServiceResponse::new(http_req, res))
            })
        }
    }
}

//! Auth Middleware
//!
//! `require_auth` runs the authorize pipeline and stores the resulting
//! [`AuthContext`] in request extensions; handlers read it via [`CurrentAuth`].

use axum::Json;
use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, OptionalFromRequest, State};
use axum::http::Request;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use platform::client::{
    ClientFingerprint, extract_authorization, extract_client_ip, fingerprint_or_default,
};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::application::{AuthContext, AuthProvider, AuthServices, AuthStore, AuthorizeOptions, AuthorizeUseCase};
use crate::error::AuthError;

/// Middleware state: the services plus the requirements of the guarded routes
pub struct AuthGuard<R, P> {
    pub services: Arc<AuthServices<R, P>>,
    pub options: Arc<AuthorizeOptions>,
}

impl<R, P> AuthGuard<R, P> {
    pub fn new(services: Arc<AuthServices<R, P>>, options: AuthorizeOptions) -> Self {
        Self {
            services,
            options: Arc::new(options),
        }
    }
}

impl<R, P> Clone for AuthGuard<R, P> {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
            options: self.options.clone(),
        }
    }
}

/// Middleware that requires an authorized bearer token
pub async fn require_auth<R, P>(
    State(guard): State<AuthGuard<R, P>>,
    mut req: Request<Body>,
    next: Next,
) -> Response
where
    R: AuthStore,
    P: AuthProvider,
{
    let client = client_from_request(&req);
    let authorization = extract_authorization(req.headers());

    let decision = AuthorizeUseCase::new(&guard.services)
        .execute(authorization.as_deref(), &client, &guard.options)
        .await;

    match decision {
        Ok(context) => {
            req.extensions_mut().insert(context);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

fn client_from_request(req: &Request<Body>) -> ClientFingerprint {
    let direct_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());

    let client_ip = extract_client_ip(req.headers(), direct_ip);
    fingerprint_or_default(req.headers(), client_ip)
}

/// Client fingerprint of the current request; never rejects
#[derive(Debug, Clone)]
pub struct ClientInfo(pub ClientFingerprint);

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let direct_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());

        let client_ip = extract_client_ip(&parts.headers, direct_ip);
        Ok(Self(fingerprint_or_default(&parts.headers, client_ip)))
    }
}

/// Context placed by [`require_auth`]; only valid behind that middleware
#[derive(Debug, Clone)]
pub struct CurrentAuth(pub AuthContext);

impl<S> FromRequestParts<S> for CurrentAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(Self)
            .ok_or(AuthError::InvalidToken)
    }
}

/// JSON request body whose rejections render as `AuthError::BadRequest`
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AuthError;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = <Json<T> as FromRequest<S>>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Absent when the request carries no `Content-Type`; a present but bad body still rejects
impl<S, T> OptionalFromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AuthError;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let body = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(body.map(|Json(value)| Self(value)))
    }
}

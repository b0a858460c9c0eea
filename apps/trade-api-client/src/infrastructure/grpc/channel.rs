//! Transport Channel
//!
//! One lazily connected channel per client. TLS with native roots is used
//! for `https://` endpoints; `http://` endpoints get plain HTTP/2.

use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Status};

use super::error::TradeApiError;
use crate::infrastructure::config::ClientConfig;

/// Metadata key carrying the access token.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Channel with the access token attached to every request.
pub type AuthedChannel = InterceptedService<Channel, AuthInterceptor>;

/// Attaches the access token to outgoing request metadata.
#[derive(Clone)]
pub struct AuthInterceptor {
    token: MetadataValue<Ascii>,
}

impl AuthInterceptor {
    /// Create an interceptor for `access_token`.
    ///
    /// # Errors
    ///
    /// Returns [`TradeApiError::InvalidToken`] if the token contains bytes
    /// not allowed in ASCII metadata.
    pub fn new(access_token: &str) -> Result<Self, TradeApiError> {
        let token = MetadataValue::try_from(access_token).map_err(|_| TradeApiError::InvalidToken)?;
        Ok(Self { token })
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert(API_KEY_HEADER, self.token.clone());
        Ok(request)
    }
}

/// Build the client channel without connecting.
///
/// The first call on the channel triggers the connection; failures surface
/// as `Unavailable` statuses on that call. Must run inside a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the endpoint is not a valid URI or TLS cannot be
/// configured.
pub fn build_channel(config: &ClientConfig) -> Result<Channel, TradeApiError> {
    let mut endpoint = Endpoint::from_shared(config.endpoint.clone())
        .map_err(|e| TradeApiError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            message: e.to_string(),
        })?
        .connect_timeout(config.connect_timeout)
        .tcp_nodelay(true);

    if config.uses_tls() {
        endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
    }

    tracing::debug!(
        endpoint = %config.endpoint,
        tls = config.uses_tls(),
        "Transport channel configured"
    );

    Ok(endpoint.connect_lazy())
}

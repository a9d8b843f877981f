//! Claims-based security (CBS) exchange.
//!
//! A claim is authorized by sending a `put-token` request on the `$cbs`
//! management node of an already-open connection. Each exchange uses a
//! short-lived session and link that are torn down once the broker answers,
//! so the connection carries no negotiation state between calls.
use crate::{AmqpConnection, TransportError};
use async_trait::async_trait;
use fe2o3_amqp::session::SessionHandle;
use fe2o3_amqp::types::primitives::Timestamp;
use fe2o3_amqp::Session;
use fe2o3_amqp_cbs::client::CbsClient;
use fe2o3_amqp_cbs::token::CbsToken;
use fe2o3_amqp_management::error::Error as ManagementError;
use sable_auth::Token;

/// Submits a token for an audience over an open connection.
#[async_trait]
pub trait ClaimExchange: Send {
    /// Resolves once the broker accepts the token.
    ///
    /// A broker refusal is reported as [`TransportError::Rejected`]; every
    /// other variant means the exchange did not complete.
    async fn put_token(&mut self, audience: &str, token: &Token) -> Result<(), TransportError>;
}

#[async_trait]
impl ClaimExchange for AmqpConnection {
    async fn put_token(&mut self, audience: &str, token: &Token) -> Result<(), TransportError> {
        let connection_id = self.info().id.0;
        let mut session = Session::begin(self.handle_mut())
            .await
            .map_err(|err| TransportError::Session(Box::new(err)))?;
        let result = put_token_on_session(&mut session, audience, token).await;
        if let Err(err) = session.end().await {
            tracing::debug!(connection_id, error = %err, "cbs session end failed");
        }
        result
    }
}

async fn put_token_on_session(
    session: &mut SessionHandle<()>,
    audience: &str,
    token: &Token,
) -> Result<(), TransportError> {
    let mut client = CbsClient::attach(session)
        .await
        .map_err(|err| TransportError::Link(Box::new(err)))?;
    let expires_at = Timestamp::from_milliseconds(token.expiry as i64 * 1000);
    let cbs_token = CbsToken::new(
        token.value.as_str(),
        token.token_type.as_cbs_str(),
        Some(expires_at),
    );
    let result = client
        .put_token(audience, cbs_token)
        .await
        .map_err(|err| classify_put_token_error(audience, err));
    if let Err(err) = client.close().await {
        tracing::debug!(error = %err, "cbs link close failed");
    }
    result
}

// Only a status response or a refused request is the broker's answer; the
// rest means the request or its reply never made it across.
fn classify_put_token_error(audience: &str, err: ManagementError) -> TransportError {
    match err {
        ManagementError::Status(_) | ManagementError::NotAccepted(_) => TransportError::Rejected {
            audience: audience.to_string(),
            source: Box::new(err),
        },
        other => TransportError::Exchange(Box::new(other)),
    }
}

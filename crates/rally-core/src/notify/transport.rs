use futures_util::future::BoxFuture;
use reqwest::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use thiserror::Error;
use tracing::debug;
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushError, WebPushMessage,
    WebPushMessageBuilder,
};

use rally_types::models::PushSubscription;

use crate::config::PushConfig;

/// A single push send that did not go through.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("could not build push message: {0}")]
    Build(#[from] WebPushError),

    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push service answered {status}")]
    Rejected { status: u16 },
}

/// Delivers one payload to one subscription.
pub trait PushTransport: Send + Sync {
    fn send<'a>(
        &'a self,
        subscription: &'a PushSubscription,
        payload: &'a [u8],
        ttl: u32,
    ) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

/// RFC 8291 encrypted, VAPID-signed delivery over HTTPS.
pub struct WebPushTransport {
    client: reqwest::Client,
    private_key: String,
    contact: String,
}

impl WebPushTransport {
    pub fn new(config: &PushConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            private_key: config.private_key.clone(),
            contact: config.contact.clone(),
        })
    }

    fn build_message(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
        ttl: u32,
    ) -> Result<WebPushMessage, WebPushError> {
        let info = SubscriptionInfo::new(
            subscription.endpoint.as_str(),
            subscription.keys.p256dh.as_str(),
            subscription.keys.auth.as_str(),
        );

        let mut signature = VapidSignatureBuilder::from_base64(
            &self.private_key,
            web_push::URL_SAFE_NO_PAD,
            &info,
        )?;
        signature.add_claim("sub", self.contact.as_str());

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature.build()?);
        builder.set_ttl(ttl);
        builder.build()
    }
}

impl PushTransport for WebPushTransport {
    fn send<'a>(
        &'a self,
        subscription: &'a PushSubscription,
        payload: &'a [u8],
        ttl: u32,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            let message = self.build_message(subscription, payload, ttl)?;

            let mut request = self
                .client
                .post(message.endpoint.to_string())
                .header("TTL", message.ttl.to_string());

            request = match message.payload {
                Some(body) => {
                    for (name, value) in body.crypto_headers {
                        request = request.header(name, value);
                    }
                    request
                        .header(CONTENT_ENCODING, body.content_encoding.to_str())
                        .header(CONTENT_TYPE, "application/octet-stream")
                        .body(body.content)
                }
                None => request.header(CONTENT_LENGTH, "0"),
            };

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DeliveryError::Rejected {
                    status: status.as_u16(),
                });
            }

            debug!("Push delivered to subscription {}", subscription.id);
            Ok(())
        })
    }
}

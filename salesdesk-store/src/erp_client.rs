use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use salesdesk_catalog::PriceQuote;
use salesdesk_core::{
    ErpConfirmRequest, ErpOrderAck, ErpOrderRequest, ErpOrderService, GatewayError, GatewayResult,
};
use serde::{Deserialize, Serialize};

use crate::app_config::ErpConfig;
use crate::envelope::{decode_external, lenient_string};
use crate::http::{Credential, HttpService};

pub const SERVICE: &str = "erp";

const ORDERS_PATH: &str = "/api/sales/orders";
const CONFIRM_PATH: &str = "/api/sales/orders/confirm";
const PRICE_PATH: &str = "/api/sales/price";
const REFERENCE_CHECK_PATH: &str = "/api/sales/reference-policies/check";

/// Client for the external order service. Every endpoint answers with the
/// nested `{data: {message: ...}}` envelope.
#[derive(Debug, Clone)]
pub struct ErpClient {
    http: HttpService,
}

/// Order identity as the service spells it: `id` or `order_id`, `name` or
/// `order_sequence`, numbers or strings, `false` for unset.
#[derive(Debug, Deserialize)]
struct OrderPayload {
    #[serde(default, alias = "id", deserialize_with = "lenient_string")]
    order_id: Option<String>,
    #[serde(default, alias = "name", deserialize_with = "lenient_string")]
    order_sequence: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    state: Option<String>,
}

impl From<OrderPayload> for ErpOrderAck {
    fn from(payload: OrderPayload) -> Self {
        ErpOrderAck {
            order_id: payload.order_id,
            order_sequence: payload.order_sequence,
            state: payload.state,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PricePayload {
    #[serde(alias = "price_unit")]
    unit_price: Decimal,
    #[serde(default, alias = "discount")]
    discount_pct: Decimal,
    #[serde(default = "one", alias = "uom_qty")]
    unit_qty: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Serialize)]
struct ReferenceCheck<'a> {
    policy_id: &'a str,
    codes: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AllowedCodes {
    Wrapped { allowed: Vec<String> },
    Bare(Vec<String>),
}

impl ErpClient {
    pub fn new(config: &ErpConfig) -> Result<Self, GatewayError> {
        let credential = Credential::Header("X-Api-Key", config.api_key.clone());
        let http = HttpService::new(SERVICE, &config.base_url, config.timeout(), credential)?;
        Ok(Self { http })
    }

    pub async fn price_quote(
        &self,
        customer_id: &str,
        policy_id: &str,
        product_id: &str,
    ) -> GatewayResult<PriceQuote> {
        let body = self
            .http
            .get(
                PRICE_PATH,
                &[
                    ("customer_id", customer_id),
                    ("policy_id", policy_id),
                    ("product_id", product_id),
                ],
            )
            .await?;
        let payload: PricePayload =
            decode_external(&body).map_err(|e| e.into_gateway(SERVICE))?;
        Ok(PriceQuote {
            unit_price: payload.unit_price,
            discount_pct: payload.discount_pct,
            unit_qty: payload.unit_qty,
        })
    }

    pub async fn allowed_reference_codes(
        &self,
        policy_id: &str,
        candidate_codes: &[String],
    ) -> GatewayResult<Vec<String>> {
        let check = ReferenceCheck {
            policy_id,
            codes: candidate_codes,
        };
        let body = self
            .http
            .send_json(Method::POST, REFERENCE_CHECK_PATH, &check)
            .await?;
        let allowed: AllowedCodes = decode_external(&body).map_err(|e| e.into_gateway(SERVICE))?;
        Ok(match allowed {
            AllowedCodes::Wrapped { allowed } | AllowedCodes::Bare(allowed) => allowed,
        })
    }

    async fn post_order<B: Serialize>(&self, path: &str, request: &B) -> GatewayResult<ErpOrderAck> {
        let body = self.http.send_json(Method::POST, path, request).await?;
        let payload: OrderPayload = decode_external(&body).map_err(|e| e.into_gateway(SERVICE))?;
        Ok(payload.into())
    }
}

#[async_trait]
impl ErpOrderService for ErpClient {
    async fn submit_order(&self, request: &ErpOrderRequest) -> GatewayResult<ErpOrderAck> {
        self.post_order(ORDERS_PATH, request).await
    }

    async fn confirm_order(&self, request: &ErpConfirmRequest) -> GatewayResult<ErpOrderAck> {
        self.post_order(CONFIRM_PATH, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_payload_aliases() {
        let payload: OrderPayload =
            decode_external(r#"{"data": {"message": {"id": 31, "name": "SO031", "state": "sale"}}}"#)
                .unwrap();
        let ack = ErpOrderAck::from(payload);
        assert_eq!(ack.order_id.as_deref(), Some("31"));
        assert_eq!(ack.order_sequence.as_deref(), Some("SO031"));

        let payload: OrderPayload =
            decode_external(r#"{"data": {"message": {"order_id": null, "order_sequence": "SO-1"}}}"#)
                .unwrap();
        assert!(ErpOrderAck::from(payload).into_reference().is_none());
    }

    #[test]
    fn test_price_payload_defaults() {
        let payload: PricePayload =
            decode_external(r#"{"data": {"message": {"price_unit": 2.5}}}"#).unwrap();
        assert_eq!(payload.unit_price, dec!(2.5));
        assert_eq!(payload.discount_pct, Decimal::ZERO);
        assert_eq!(payload.unit_qty, 1);
    }

    #[test]
    fn test_allowed_codes_either_shape() {
        let wrapped: AllowedCodes =
            decode_external(r#"{"data": {"message": {"allowed": ["REF-1"]}}}"#).unwrap();
        let bare: AllowedCodes = decode_external(r#"{"data": {"message": ["REF-1"]}}"#).unwrap();
        for codes in [wrapped, bare] {
            match codes {
                AllowedCodes::Wrapped { allowed } | AllowedCodes::Bare(allowed) => {
                    assert_eq!(allowed, vec!["REF-1".to_string()])
                }
            }
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

/// Contract address the backend uses for a blockchain's native coin.
pub const NATIVE_COIN_CONTRACT_ADDRESS: &str = "0";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ExpressAsset {
    pub contract_address: String,
    pub network: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssetsRequest {
    pub tokens_list: Vec<ExpressAsset>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    pub contract_address: String,
    pub network: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    pub decimals: u32,
    pub is_active: bool,
    #[serde(default)]
    pub exchange_available: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct PairsRequest {
    pub from: Vec<ExpressAsset>,
    pub to: Vec<ExpressAsset>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PairInfo {
    pub from: ExpressAsset,
    pub to: ExpressAsset,
    pub providers: Vec<PairProvider>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PairProvider {
    pub provider_id: String,
    #[serde(default)]
    pub rate_types: Vec<RateType>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
    #[default]
    Float,
    Fixed,
}

impl std::fmt::Display for RateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateType::Float => write!(f, "float"),
            RateType::Fixed => write!(f, "fixed"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProviderType {
    Dex,
    Cex,
    DexBridge,
    Aggregator,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub image_large: Option<String>,
    #[serde(default)]
    pub image_small: Option<String>,
    #[serde(default)]
    pub terms_of_use: Option<String>,
    #[serde(default)]
    pub privacy_policy: Option<String>,
}

#[serde_as]
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeQuoteRequest {
    pub from_contract_address: String,
    pub from_network: String,
    pub to_contract_address: String,
    pub to_network: String,
    #[serde_as(as = "DisplayFromStr")]
    pub from_amount: u128,
    pub from_decimals: u32,
    pub to_decimals: u32,
    pub provider_id: String,
    pub rate_type: RateType,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde_as(as = "DisplayFromStr")]
    pub from_amount: u128,
    pub from_decimals: u32,
    #[serde_as(as = "DisplayFromStr")]
    pub to_amount: u128,
    pub to_decimals: u32,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub fee_amount: Option<u128>,
    #[serde(default)]
    pub allowance_contract: Option<String>,
}

#[serde_as]
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeDataRequest {
    pub from_contract_address: String,
    pub from_network: String,
    pub to_contract_address: String,
    pub to_network: String,
    #[serde_as(as = "DisplayFromStr")]
    pub from_amount: u128,
    pub from_decimals: u32,
    pub to_decimals: u32,
    pub provider_id: String,
    pub rate_type: RateType,
    pub to_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_address: Option<String>,
    pub request_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Send,
    Swap,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeDataResponse {
    pub tx_id: String,
    pub tx_type: TransactionType,
    #[serde_as(as = "DisplayFromStr")]
    pub from_amount: u128,
    pub from_decimals: u32,
    #[serde_as(as = "DisplayFromStr")]
    pub to_amount: u128,
    pub to_decimals: u32,
    #[serde(default)]
    pub tx_from: Option<String>,
    pub tx_to: String,
    #[serde(default)]
    pub tx_data: Option<String>,
    #[serde(default)]
    pub tx_extra_id: Option<String>,
    #[serde_as(as = "DisplayFromStr")]
    pub tx_value: u128,
    #[serde(default)]
    pub external_tx_id: Option<String>,
    #[serde(default)]
    pub external_tx_url: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeStatusRequest {
    pub tx_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExchangeStatus {
    New,
    Waiting,
    Confirming,
    Exchanging,
    Sending,
    Finished,
    Failed,
    Refunded,
    Verifying,
    Expired,
    #[serde(other)]
    Unknown,
}

impl ExchangeStatus {
    /// Whether the exchange reached a state the provider will not move out of.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExchangeStatus::Finished
                | ExchangeStatus::Failed
                | ExchangeStatus::Refunded
                | ExchangeStatus::Expired
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub provider_id: String,
    #[serde(default)]
    pub external_tx_id: Option<String>,
    pub external_tx_status: ExchangeStatus,
    #[serde(default)]
    pub external_tx_url: Option<String>,
    #[serde(default)]
    pub refund_network: Option<String>,
    #[serde(default)]
    pub refund_contract_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_request_query_serialization() {
        let request = ExchangeQuoteRequest {
            from_contract_address: "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359".to_string(),
            from_network: "polygon-pos".to_string(),
            to_contract_address: NATIVE_COIN_CONTRACT_ADDRESS.to_string(),
            to_network: "polygon-pos".to_string(),
            from_amount: 1_000_000_000,
            from_decimals: 6,
            to_decimals: 18,
            provider_id: "1inch".to_string(),
            rate_type: RateType::Float,
        };
        let qs = serde_qs::Config::new().serialize_string(&request).unwrap();
        assert!(qs.contains("fromAmount=1000000000"));
        assert!(qs.contains("toContractAddress=0"));
        assert!(qs.contains("rateType=float"));
    }

    #[test]
    fn test_provider_info_unknown_type() {
        let json = r#"{"id":"p1","name":"Provider","type":"otc"}"#;
        let provider: ProviderInfo = serde_json::from_str(json).unwrap();
        assert_eq!(provider.provider_type, ProviderType::Unknown);
        assert!(provider.terms_of_use.is_none());
    }

    #[test]
    fn test_exchange_status_terminal() {
        let response: StatusResponse = serde_json::from_str(
            r#"{"providerId":"changelly","externalTxStatus":"refunded"}"#,
        )
        .unwrap();
        assert_eq!(response.external_tx_status, ExchangeStatus::Refunded);
        assert!(response.external_tx_status.is_terminal());
        assert!(!ExchangeStatus::Exchanging.is_terminal());
    }
}

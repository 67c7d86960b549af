use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressApiError {
    #[error("Request error: {reason} (code: {code:?})")]
    Request { reason: String, code: Option<u16> },

    #[error("Api error: {0}")]
    Api(ExpressApiErrorBody),

    #[error("Decoding error: {0}")]
    Decoding(String),
}

impl ExpressApiError {
    /// Returns the backend error payload when the failure was declared by the backend.
    pub fn api_error(&self) -> Option<&ExpressApiErrorBody> {
        match self {
            ExpressApiError::Api(body) => Some(body),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExpressApiError {
    fn from(err: reqwest::Error) -> Self {
        let mut err_str = err.to_string();
        let mut walk: &dyn std::error::Error = &err;
        while let Some(src) = walk.source() {
            err_str.push_str(format!(" : {src}").as_str());
            walk = src;
        }
        Self::Request {
            reason: err_str,
            code: err.status().map(|s| s.as_u16()),
        }
    }
}

/// Error payload returned by the backend with a non-success status.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExpressApiErrorBody {
    pub code: ExpressApiErrorCode,
    #[serde(default)]
    pub description: Option<String>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub min_amount: Option<u128>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub max_amount: Option<u128>,
    #[serde(default)]
    pub decimals: Option<u32>,
}

impl std::fmt::Display for ExpressApiErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({})",
            self.description.as_deref().unwrap_or("no description"),
            u32::from(self.code)
        )
    }
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ExpressApiErrorResponse {
    pub(crate) error: ExpressApiErrorBody,
}

/// Machine readable error codes declared by the backend.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(from = "u32", into = "u32")]
pub enum ExpressApiErrorCode {
    ExchangeProviderNotFound,
    ExchangeProviderNotActive,
    ExchangeTooSmallAmount,
    ExchangeTooBigAmount,
    ExchangeNotEnoughAllowance,
    ExchangeNotPossible,
    Unknown(u32),
}

impl From<u32> for ExpressApiErrorCode {
    fn from(code: u32) -> Self {
        match code {
            2100 => Self::ExchangeProviderNotFound,
            2110 => Self::ExchangeProviderNotActive,
            2210 => Self::ExchangeTooSmallAmount,
            2220 => Self::ExchangeTooBigAmount,
            2230 => Self::ExchangeNotEnoughAllowance,
            2250 => Self::ExchangeNotPossible,
            other => Self::Unknown(other),
        }
    }
}

impl From<ExpressApiErrorCode> for u32 {
    fn from(code: ExpressApiErrorCode) -> Self {
        match code {
            ExpressApiErrorCode::ExchangeProviderNotFound => 2100,
            ExpressApiErrorCode::ExchangeProviderNotActive => 2110,
            ExpressApiErrorCode::ExchangeTooSmallAmount => 2210,
            ExpressApiErrorCode::ExchangeTooBigAmount => 2220,
            ExpressApiErrorCode::ExchangeNotEnoughAllowance => 2230,
            ExpressApiErrorCode::ExchangeNotPossible => 2250,
            ExpressApiErrorCode::Unknown(code) => code,
        }
    }
}

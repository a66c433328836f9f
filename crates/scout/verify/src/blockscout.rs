//! Blockscout etherscan-compatible API client

use crate::error::{Result, VerifyError};
use crate::traits::{ExplorerHandle, VerificationClient};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scout_types::{normalize_address, ContractMeta, PollStatus, VerificationToken};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// ABI placeholder the explorer returns for unverified contracts
pub const UNVERIFIED_ABI: &str = "Contract source code not verified";

/// Envelope of every API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    #[serde(default)]
    message: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ListedContract {
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "ABI", default)]
    abi: String,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    contractaddress: &'a str,
    contractname: &'a str,
    compilerversion: String,
    #[serde(rename = "sourceCode")]
    source_code: String,
}

/// Client for the explorer's `/api?module=contract` endpoints
#[derive(Debug, Clone)]
pub struct BlockscoutClient {
    client: Client,
}

impl BlockscoutClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<ApiResponse<T>> {
        let response = self.client.get(url).send().await?;
        handle_response(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<ApiResponse<T>> {
        let response = self.client.post(url).json(body).send().await?;
        handle_response(response).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        Ok(response.json().await?)
    } else if status == StatusCode::NOT_FOUND {
        Err(VerifyError::Api {
            status: status.as_u16(),
            message: "API not found".into(),
        })
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(VerifyError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn verified_addresses(contracts: Vec<ListedContract>) -> HashSet<String> {
    contracts
        .into_iter()
        .filter(|c| c.abi != UNVERIFIED_ABI)
        .map(|c| normalize_address(&c.address))
        .collect()
}

#[async_trait]
impl VerificationClient for BlockscoutClient {
    async fn list_verified_addresses(&self, target: &ExplorerHandle) -> Result<HashSet<String>> {
        let url = format!(
            "{}/api?module=contract&action=listcontracts",
            target.base_url
        );
        let response: ApiResponse<Vec<ListedContract>> = self.get(&url).await?;
        Ok(verified_addresses(response.result.unwrap_or_default()))
    }

    async fn submit(
        &self,
        target: &ExplorerHandle,
        address: &str,
        meta: &ContractMeta,
    ) -> Result<VerificationToken> {
        let url = format!(
            "{}/api?module=contract&action=verifysourcecode&codeformat=solidity-standard-json-input",
            target.base_url
        );
        let body = VerifyRequest {
            contractaddress: address,
            contractname: &meta.name,
            compilerversion: meta.compiler_version(),
            source_code: meta.input.to_string(),
        };

        let response: ApiResponse<String> = self.post(&url, &body).await?;
        match (response.status.as_str(), response.result) {
            ("1", Some(token)) => Ok(VerificationToken::new(token)),
            (_, result) => Err(VerifyError::Rejected(
                result.unwrap_or(response.message),
            )),
        }
    }

    async fn poll_status(
        &self,
        target: &ExplorerHandle,
        token: &VerificationToken,
    ) -> Result<PollStatus> {
        let url = format!(
            "{}/api?module=contract&action=checkverifystatus&guid={}",
            target.base_url, token
        );
        let response: ApiResponse<String> = self.get(&url).await?;
        Ok(response
            .result
            .map(|r| PollStatus::from_explorer(&r))
            .unwrap_or(PollStatus::Pending))
    }
}

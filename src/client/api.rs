use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;

use super::TallyBackend;
use crate::error::ClientError;
use crate::models::{ErrorBody, Tallies, VoteRequest, VoteResponse};

pub struct HttpTallyBackend {
    client: Client,
    api_url: String,
}

impl HttpTallyBackend {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl TallyBackend for HttpTallyBackend {
    async fn fetch_tallies(&self, poll_name: &str) -> Result<Tallies, ClientError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("poll", poll_name)])
            .send()
            .await
            .map_err(classify)?;

        let response = ensure_success(response).await?;
        response.json::<Tallies>().await.map_err(classify)
    }

    async fn submit_vote(&self, poll_name: &str, option: &str) -> Result<VoteResponse, ClientError> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&VoteRequest::new(poll_name, option))
            .send()
            .await
            .map_err(classify)?;

        let response = ensure_success(response).await?;
        response.json::<VoteResponse>().await.map_err(classify)
    }
}

fn classify(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::NetworkFailure(e)
    }
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);

    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
    })
}

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::hub::{GroupMember, Member, MsgKind, Payload, TransportError};

/// `{code, msg, data}` wrapper around every backend response
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    /// Code 0 is success; anything else turns `msg` into the error.
    pub(crate) fn into_result(self) -> Result<Option<T>, TransportError> {
        if self.code != 0 {
            return Err(TransportError::Rejected {
                code: self.code,
                msg: self.msg,
            });
        }
        Ok(self.data)
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    gid: &'a str,
    #[serde(rename = "type")]
    kind: u8,
    body: &'a str,
    filename: &'a str,
}

/// Authenticated request/response calls against the assistant backend
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    timeout: Duration,
}

impl Transport {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<(String, String)>,
        timeout: Duration,
    ) -> Result<Self> {
        // No client-wide timeout: the event stream stays open indefinitely.
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client for the assistant")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let request = self.client.request(method, url);
        match &self.credentials {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        }
    }

    /// The long-lived event stream request.
    pub(crate) fn stream_request(&self) -> RequestBuilder {
        self.request(Method::GET, "sse")
            .header(ACCEPT, "text/event-stream")
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, TransportError> {
        let response = request.timeout(self.timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let envelope: Envelope<T> = response.json().await.map_err(TransportError::Decode)?;
        envelope.into_result()
    }

    pub async fn send(
        &self,
        kind: MsgKind,
        gid: &str,
        payload: Payload<'_>,
        filename: &str,
    ) -> Result<i64, TransportError> {
        let body = payload.encode();
        let request = SendRequest {
            gid,
            kind: kind.code(),
            body: &body,
            filename,
        };

        debug!("Sending {:?} to group {} ({} byte body)", kind, gid, body.len());

        let id: Option<serde_json::Number> = self
            .call(
                self.request(Method::POST, "msg/send")
                    .header(CONTENT_TYPE, "application/json")
                    .json(&request),
            )
            .await?;

        Ok(id.and_then(|n| n.as_i64()).unwrap_or_default())
    }

    /// Fetch the bot's own identity.
    pub async fn fetch_self(&self) -> Result<Member, TransportError> {
        self.call(self.request(Method::GET, "self"))
            .await?
            .ok_or(TransportError::MissingData)
    }

    pub async fn group_members(&self, gid: &str) -> Option<Vec<GroupMember>> {
        let request = self.request(Method::GET, "group").query(&[("gid", gid)]);
        match self.call(request).await {
            Ok(members) => members,
            Err(e) => {
                error!("Failed to fetch members of group {}: {}", gid, e);
                None
            }
        }
    }

    pub async fn group_member(&self, gid: &str, uid: &str) -> Option<GroupMember> {
        let request = self
            .request(Method::GET, "group/member")
            .query(&[("gid", gid), ("uid", uid)]);
        match self.call(request).await {
            Ok(member) => member,
            Err(e) => {
                error!("Failed to fetch member {} of group {}: {}", uid, gid, e);
                None
            }
        }
    }
}

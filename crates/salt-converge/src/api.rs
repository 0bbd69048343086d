//! [`SaltClient`] over the salt-api REST interface (rest_cherrypy).

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::client::SaltClient;
use crate::config::ProvisionConfig;
use crate::types::{
    ClientMode, JobHandle, LoginRequest, LoginToken, MinionInfo, MinionJob, SaltResponse,
    Submission,
};
use crate::{ConvergeError, Result};

const AUTH_HEADER: &str = "X-Auth-Token";

// ─── SaltApi ──────────────────────────────────────────────────────────────

/// HTTP client for one salt-api endpoint and one set of credentials.
///
/// The session token obtained by [`SaltClient::login`] is shared by every
/// call made through this value, so one `SaltApi` can serve several
/// concurrent provisioning runs.
pub struct SaltApi {
    http: reqwest::Client,
    base: Url,
    username: String,
    password: String,
    eauth: String,
    mode: ClientMode,
    token: RwLock<Option<String>>,
}

impl SaltApi {
    pub fn new(
        address: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        eauth: impl Into<String>,
        mode: ClientMode,
    ) -> Result<Self> {
        let base = Url::parse(address)
            .map_err(|e| ConvergeError::Config(format!("invalid address '{address}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ConvergeError::Config(format!(
                "invalid address '{address}': not a base URL"
            )));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base,
            username: username.into(),
            password: password.into(),
            eauth: eauth.into(),
            mode,
            token: RwLock::new(None),
        })
    }

    pub fn from_config(cfg: &ProvisionConfig) -> Result<Self> {
        Self::new(
            &cfg.address,
            cfg.username.clone(),
            cfg.password.clone(),
            cfg.backend.clone(),
            cfg.mode,
        )
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send an authenticated request and decode the `return` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<SaltResponse<T>> {
        let token = self
            .token
            .read()
            .await
            .clone()
            .ok_or_else(|| ConvergeError::Auth("not logged in".into()))?;

        let url = self.endpoint(segments);
        debug!(%method, %url, "salt-api request");

        let mut req = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(AUTH_HEADER, token);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ConvergeError::Auth("session rejected by salt-api".into()));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default().trim().to_string();
            return Err(ConvergeError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<SaltResponse<T>>().await?)
    }
}

#[async_trait]
impl SaltClient for SaltApi {
    async fn login(&self) -> Result<()> {
        let resp = self
            .http
            .post(self.endpoint(&["login"]))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
                eauth: &self.eauth,
            })
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ConvergeError::Auth("invalid credentials".into()));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default().trim().to_string();
            return Err(ConvergeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let login = resp
            .json::<SaltResponse<LoginToken>>()
            .await?
            .into_first()
            .ok_or_else(|| ConvergeError::Auth("login returned no token".into()))?;
        debug!(user = %login.user, eauth = %login.eauth, expire = login.expire, "logged in");

        *self.token.write().await = Some(login.token);
        Ok(())
    }

    async fn minion(&self, id: &str) -> Result<Option<MinionInfo>> {
        let resp: SaltResponse<Value> = self.call(Method::GET, &["minions", id], None).await?;
        let entry = resp
            .into_first()
            .and_then(|mut ret| ret.get_mut(id).map(Value::take));

        match entry {
            None => Err(ConvergeError::MinionNotFound(id.to_string())),
            Some(Value::Object(grains)) => Ok(Some(MinionInfo::with_grains(id, grains))),
            Some(other) => {
                debug!(minion = id, entry = %other, "minion has no grains");
                Ok(Some(MinionInfo::offline(id)))
            }
        }
    }

    async fn submit_job(&self, job: &MinionJob) -> Result<Submission> {
        match self.mode {
            ClientMode::Async => {
                let body = serde_json::to_value(job)?;
                let resp: SaltResponse<JobHandle> =
                    self.call(Method::POST, &["minions"], Some(body)).await?;
                let handle = resp.into_first().ok_or_else(|| {
                    ConvergeError::JobSubmission("salt-api returned an empty response".into())
                })?;
                Ok(Submission::Async(handle))
            }
            ClientMode::Sync => {
                let body = json!([{
                    "client": "local",
                    "tgt": job.target,
                    "tgt_type": job.target_type,
                    "fun": job.function,
                }]);
                let resp: SaltResponse<Value> = self.call(Method::POST, &[], Some(body)).await?;
                Ok(Submission::Sync(Value::Array(resp.ret)))
            }
        }
    }

    async fn lookup_job(&self, jid: &str) -> Result<Option<Value>> {
        let body = json!([{
            "client": "runner",
            "fun": "jobs.lookup_jid",
            "jid": jid,
        }]);
        let resp: SaltResponse<Value> = self.call(Method::POST, &[], Some(body)).await?;

        // Newer masters wrap runner output as {"outputter": .., "data": {..}}.
        let payload = match resp.into_first() {
            Some(Value::Object(mut ret)) => match ret.remove("data") {
                Some(data) => data,
                None => Value::Object(ret),
            },
            Some(other) => other,
            None => Value::Null,
        };

        match &payload {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            _ => Ok(Some(payload)),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
